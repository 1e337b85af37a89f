//! Issue CLI commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use issuetrack_client::Client;
use issuetrack_client::api::{
    Comment, Issue, IssueFilter, IssueStatus, IssueUpdate, NewIssue, Severity,
};
use issuetrack_core::error::AppError;

use crate::output::{self, OutputFormat};

/// Arguments for issue commands
#[derive(Debug, Args)]
pub struct IssuesArgs {
    /// Issue subcommand
    #[command(subcommand)]
    pub command: IssueCommand,
}

/// Issue subcommands
#[derive(Debug, Subcommand)]
pub enum IssueCommand {
    /// List issues
    List {
        /// Filter by status (open, triaged, in_progress, done)
        #[arg(short, long)]
        status: Option<IssueStatus>,
        /// Filter by severity (low, medium, high, critical)
        #[arg(long)]
        severity: Option<Severity>,
        /// Search title and description
        #[arg(short = 'q', long)]
        search: Option<String>,
    },
    /// Show one issue
    Show {
        /// Issue ID
        id: u64,
    },
    /// Report a new issue
    Create {
        /// Title
        #[arg(short, long)]
        title: String,
        /// Description
        #[arg(short, long, default_value = "")]
        description: String,
        /// Severity
        #[arg(long, default_value = "medium")]
        severity: Severity,
    },
    /// Change an issue
    Update {
        /// Issue ID
        id: u64,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long)]
        severity: Option<Severity>,
        #[arg(short, long)]
        status: Option<IssueStatus>,
    },
    /// Delete an issue
    Delete {
        /// Issue ID
        id: u64,
    },
    /// List comments on an issue
    Comments {
        /// Issue ID
        id: u64,
    },
    /// Comment on an issue
    Comment {
        /// Issue ID
        id: u64,
        /// Comment text
        content: String,
    },
}

/// Issue display row for table output
#[derive(Debug, Serialize, Tabled)]
struct IssueRow {
    id: u64,
    title: String,
    severity: String,
    status: String,
    reporter: String,
    assignee: String,
    updated: String,
}

impl From<&Issue> for IssueRow {
    fn from(issue: &Issue) -> Self {
        Self {
            id: issue.id,
            title: issue.title.clone(),
            severity: issue.severity.to_string(),
            status: issue.status.to_string(),
            reporter: user_name(issue.reporter.as_ref().map(|u| u.username.as_str())),
            assignee: user_name(issue.assignee.as_ref().map(|u| u.username.as_str())),
            updated: issue
                .updated_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Comment display row for table output
#[derive(Debug, Serialize, Tabled)]
struct CommentRow {
    id: u64,
    author: String,
    created: String,
    content: String,
}

impl From<&Comment> for CommentRow {
    fn from(comment: &Comment) -> Self {
        Self {
            id: comment.id,
            author: user_name(comment.author.as_ref().map(|u| u.username.as_str())),
            created: comment
                .created_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string()),
            content: comment.content.clone(),
        }
    }
}

fn user_name(name: Option<&str>) -> String {
    name.filter(|n| !n.is_empty()).unwrap_or("-").to_string()
}

/// Execute issue commands
pub async fn execute(
    client: &Client,
    args: &IssuesArgs,
    format: OutputFormat,
) -> Result<(), AppError> {
    super::require_session(client).await?;
    let issues = client.issues();

    match &args.command {
        IssueCommand::List {
            status,
            severity,
            search,
        } => {
            let filter = IssueFilter {
                status: *status,
                severity: *severity,
                search: search.clone(),
            };
            let found = issues.list(&filter).await?;
            let rows: Vec<IssueRow> = found.iter().map(IssueRow::from).collect();
            output::print_list(&rows, format);
        }
        IssueCommand::Show { id } => {
            let issue = issues.get(*id).await?;
            print_issue(&issue, format);
        }
        IssueCommand::Create {
            title,
            description,
            severity,
        } => {
            let issue = issues
                .create(&NewIssue {
                    title: title.clone(),
                    description: description.clone(),
                    severity: *severity,
                })
                .await?;
            output::print_success(&format!("Issue #{} created", issue.id));
        }
        IssueCommand::Update {
            id,
            title,
            description,
            severity,
            status,
        } => {
            let update = IssueUpdate {
                title: title.clone(),
                description: description.clone(),
                severity: *severity,
                status: *status,
            };
            let issue = issues.update(*id, &update).await?;
            print_issue(&issue, format);
        }
        IssueCommand::Delete { id } => {
            issues.delete(*id).await?;
            output::print_success(&format!("Issue #{} deleted", id));
        }
        IssueCommand::Comments { id } => {
            let comments = issues.comments(*id).await?;
            let rows: Vec<CommentRow> = comments.iter().map(CommentRow::from).collect();
            output::print_list(&rows, format);
        }
        IssueCommand::Comment { id, content } => {
            let comment = issues.add_comment(*id, content).await?;
            output::print_success(&format!("Comment #{} added to issue #{}", comment.id, id));
        }
    }

    Ok(())
}

fn print_issue(issue: &Issue, format: OutputFormat) {
    let row = IssueRow::from(issue);
    output::print_item(
        issue,
        &[
            ("ID", issue.id.to_string()),
            ("Title", issue.title.clone()),
            ("Severity", row.severity),
            ("Status", row.status),
            ("Reporter", row.reporter),
            ("Assignee", row.assignee),
            ("Updated", row.updated),
            ("Comments", issue.comments.len().to_string()),
            ("Description", issue.description.clone()),
        ],
        format,
    );
}
