//! Dashboard aggregates.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use issuetrack_cache::{QueryCache, keys};
use issuetrack_core::result::AppResult;

use super::list_items;

/// Number of issues sharing one value of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCount {
    /// The field value (a status or a severity).
    pub value: String,
    /// Issues with that value.
    pub count: u64,
}

/// Current issue counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    /// All issues visible to the caller.
    pub total_issues: u64,
    /// Counts per workflow status.
    pub status_counts: Vec<FieldCount>,
    /// Counts per severity.
    pub severity_counts: Vec<FieldCount>,
}

/// Issue counts recorded for one day.
///
/// Counters missing from the response read as zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStats {
    /// The day the counts were taken.
    pub date: NaiveDate,
    #[serde(default)]
    pub open_issues: u64,
    #[serde(default)]
    pub triaged_issues: u64,
    #[serde(default)]
    pub in_progress_issues: u64,
    #[serde(default)]
    pub done_issues: u64,
    #[serde(default)]
    pub low_severity: u64,
    #[serde(default)]
    pub medium_severity: u64,
    #[serde(default)]
    pub high_severity: u64,
    #[serde(default)]
    pub critical_severity: u64,
}

/// Analytics endpoints (maintainers and admins only).
#[derive(Debug, Clone)]
pub struct AnalyticsApi {
    cache: QueryCache,
}

impl AnalyticsApi {
    /// Analytics endpoints reading through `cache`.
    pub fn new(cache: QueryCache) -> Self {
        Self { cache }
    }

    /// Current totals per status and severity.
    pub async fn dashboard(&self) -> AppResult<DashboardStats> {
        let raw = self.cache.read(&keys::dashboard()).await?;
        Ok(DashboardStats {
            total_issues: raw.get("total_issues").and_then(Value::as_u64).unwrap_or(0),
            status_counts: field_counts(&raw, "status_counts", "status"),
            severity_counts: field_counts(&raw, "severity_counts", "severity"),
        })
    }

    /// Stats for the most recent `days` days, newest first.
    pub async fn daily_stats(&self, days: u32) -> AppResult<Vec<DailyStats>> {
        let raw = self.cache.read(&keys::daily_stats(days)).await?;
        let mut stats: Vec<DailyStats> = list_items(raw)?;
        stats.sort_by(|a, b| b.date.cmp(&a.date));
        stats.truncate(days as usize);
        Ok(stats)
    }
}

/// `[{"status": "open", "count": 3}, ...]` → `[FieldCount{value: "open", count: 3}, ...]`.
fn field_counts(raw: &Value, list: &str, field: &str) -> Vec<FieldCount> {
    raw.get(list)
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    Some(FieldCount {
                        value: row.get(field)?.as_str()?.to_string(),
                        count: row.get("count").and_then(Value::as_u64).unwrap_or(0),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;
    use issuetrack_auth::testing::Reply;
    use serde_json::json;

    async fn backend() -> Fixture {
        Fixture::new(|req| {
            if req.url.ends_with("/api/analytics/dashboard/") {
                Reply::json(
                    200,
                    json!({
                        "total_issues": 5,
                        "status_counts": [
                            {"status": "open", "count": 3},
                            {"status": "done", "count": 2}
                        ],
                        "severity_counts": [{"severity": "high", "count": 5}]
                    }),
                )
            } else if req.url.ends_with("/api/analytics/daily-stats/") {
                Reply::json(
                    200,
                    json!([
                        {"date": "2024-05-01", "open_issues": 1},
                        {"date": "2024-05-03", "open_issues": 3},
                        {"date": "2024-05-02", "open_issues": 2}
                    ]),
                )
            } else {
                Reply::empty(404)
            }
        })
        .await
    }

    #[tokio::test]
    async fn test_dashboard_flattens_counts() {
        let fixture = backend().await;
        let stats = fixture.client.analytics().dashboard().await.unwrap();
        assert_eq!(stats.total_issues, 5);
        assert_eq!(
            stats.status_counts,
            vec![
                FieldCount { value: "open".to_string(), count: 3 },
                FieldCount { value: "done".to_string(), count: 2 },
            ]
        );
        assert_eq!(stats.severity_counts[0].value, "high");
    }

    #[tokio::test]
    async fn test_daily_stats_newest_first_and_truncated() {
        let fixture = backend().await;
        let stats = fixture.client.analytics().daily_stats(2).await.unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].open_issues, 3);
        assert_eq!(stats[1].open_issues, 2);
    }
}
