//! Issue statistics.

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use issuetrack_client::Client;
use issuetrack_client::api::DailyStats;
use issuetrack_core::error::AppError;

use crate::output::{self, OutputFormat};

/// Arguments for `dashboard`
#[derive(Debug, Args)]
pub struct DashboardArgs {
    /// Also show per-day counts for this many days
    #[arg(short, long)]
    pub days: Option<u32>,
}

#[derive(Debug, Serialize, Tabled)]
struct DayRow {
    date: String,
    open: u64,
    triaged: u64,
    in_progress: u64,
    done: u64,
}

impl From<&DailyStats> for DayRow {
    fn from(day: &DailyStats) -> Self {
        Self {
            date: day.date.to_string(),
            open: day.open_issues,
            triaged: day.triaged_issues,
            in_progress: day.in_progress_issues,
            done: day.done_issues,
        }
    }
}

/// Print dashboard totals and, optionally, daily stats
pub async fn execute(
    client: &Client,
    args: &DashboardArgs,
    format: OutputFormat,
) -> Result<(), AppError> {
    super::require_session(client).await?;
    let analytics = client.analytics();
    let stats = analytics.dashboard().await?;

    let mut fields = vec![("Total issues", stats.total_issues.to_string())];
    fields.extend(
        stats
            .status_counts
            .iter()
            .map(|c| ("Status", format!("{:<12} {}", c.value, c.count))),
    );
    fields.extend(
        stats
            .severity_counts
            .iter()
            .map(|c| ("Severity", format!("{:<12} {}", c.value, c.count))),
    );
    output::print_item(&stats, &fields, format);

    if let Some(days) = args.days {
        let daily = analytics.daily_stats(days).await?;
        let rows: Vec<DayRow> = daily.iter().map(DayRow::from).collect();
        println!();
        output::print_list(&rows, format);
    }
    Ok(())
}
