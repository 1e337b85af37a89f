//! Issues and their comments.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use issuetrack_auth::{AuthGateway, UserProfile};
use issuetrack_cache::{CacheInvalidator, QueryCache, keys};
use issuetrack_core::error::AppError;
use issuetrack_core::events::{ChangeAction, ResourceChanged};
use issuetrack_core::result::AppResult;
use issuetrack_core::types::http::ApiRequest;

use super::{list_items, paths};

/// How bad an issue is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// Where an issue is in its workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    #[default]
    Open,
    Triaged,
    InProgress,
    Done,
}

impl Severity {
    /// Wire name, as used in query strings and payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl IssueStatus {
    /// Wire name, as used in query strings and payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Triaged => "triaged",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(AppError::validation(format!(
                "Unknown severity '{other}' (expected low, medium, high, critical)"
            ))),
        }
    }
}

impl FromStr for IssueStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "triaged" => Ok(Self::Triaged),
            "in_progress" | "in-progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            other => Err(AppError::validation(format!(
                "Unknown status '{other}' (expected open, triaged, in_progress, done)"
            ))),
        }
    }
}

/// A comment on an issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    /// Server-assigned ID.
    pub id: u64,
    /// Comment text.
    pub content: String,
    /// Who wrote it; absent for deleted accounts.
    #[serde(default)]
    pub author: Option<UserProfile>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// An issue as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Server-assigned ID.
    pub id: u64,
    /// One-line summary.
    pub title: String,
    /// Free-form details.
    #[serde(default)]
    pub description: String,
    /// How bad it is.
    #[serde(default)]
    pub severity: Severity,
    /// Workflow position.
    #[serde(default)]
    pub status: IssueStatus,
    /// Who reported it.
    #[serde(default)]
    pub reporter: Option<UserProfile>,
    /// Who is working on it, if anyone.
    #[serde(default)]
    pub assignee: Option<UserProfile>,
    /// Download URL of the attachment, if any.
    #[serde(default)]
    pub file_url: Option<String>,
    /// Comments embedded in the detail view. Empty in list responses.
    #[serde(default)]
    pub comments: Vec<Comment>,
    /// When it was reported.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last change.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Fields for a new issue.
#[derive(Debug, Clone, Serialize)]
pub struct NewIssue {
    /// One-line summary.
    pub title: String,
    /// Free-form details; may be empty.
    pub description: String,
    /// Initial severity.
    pub severity: Severity,
}

/// A partial update. Unset fields are left alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IssueUpdate {
    /// New title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New severity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    /// New workflow position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<IssueStatus>,
}

impl IssueUpdate {
    /// Whether no field is set.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.severity.is_none()
            && self.status.is_none()
    }
}

/// Issue list filters. The server applies them; reporters only ever see
/// their own issues.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueFilter {
    /// Only issues in this workflow position.
    pub status: Option<IssueStatus>,
    /// Only issues of this severity.
    pub severity: Option<Severity>,
    /// Matches title or description.
    pub search: Option<String>,
}

impl IssueFilter {
    /// Filters as query parameters.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(status) = self.status {
            pairs.push(("status", status.to_string()));
        }
        if let Some(severity) = self.severity {
            pairs.push(("severity", severity.to_string()));
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("search", search.to_string()));
        }
        pairs
    }
}

/// Issue endpoints.
#[derive(Debug, Clone)]
pub struct IssuesApi {
    gateway: AuthGateway,
    cache: QueryCache,
    invalidator: CacheInvalidator,
}

impl IssuesApi {
    /// Issue endpoints reading through `cache` and invalidating through
    /// `invalidator` after writes.
    pub fn new(gateway: AuthGateway, cache: QueryCache, invalidator: CacheInvalidator) -> Self {
        Self {
            gateway,
            cache,
            invalidator,
        }
    }

    /// Issues matching `filter`, newest first.
    pub async fn list(&self, filter: &IssueFilter) -> AppResult<Vec<Issue>> {
        let pairs = filter.pairs();
        let key = keys::issue_list(pairs.iter().map(|(k, v)| (*k, v.as_str())));
        list_items(self.cache.read(&key).await?)
    }

    /// One issue with its embedded comments.
    pub async fn get(&self, id: u64) -> AppResult<Issue> {
        let value = self.cache.read(&keys::issue(id)).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Report an issue. Cached issue lists go stale.
    pub async fn create(&self, issue: &NewIssue) -> AppResult<Issue> {
        let created: Issue = self
            .gateway
            .request(ApiRequest::post(paths::ISSUES, serde_json::to_value(issue)?))
            .await?
            .json()?;
        self.changed(ChangeAction::Created, created.id);
        Ok(created)
    }

    /// Apply a partial update. An empty update is rejected locally.
    pub async fn update(&self, id: u64, update: &IssueUpdate) -> AppResult<Issue> {
        if update.is_empty() {
            return Err(AppError::validation("Nothing to update"));
        }
        let updated: Issue = self
            .gateway
            .request(ApiRequest::patch(paths::issue(id), serde_json::to_value(update)?))
            .await?
            .json()?;
        self.changed(ChangeAction::Updated, id);
        Ok(updated)
    }

    /// Delete issue `id`.
    pub async fn delete(&self, id: u64) -> AppResult<()> {
        self.gateway.request(ApiRequest::delete(paths::issue(id))).await?;
        self.changed(ChangeAction::Deleted, id);
        Ok(())
    }

    /// Comments on issue `id`, oldest first.
    pub async fn comments(&self, id: u64) -> AppResult<Vec<Comment>> {
        list_items(self.cache.read(&keys::issue_comments(id)).await?)
    }

    /// Comment on issue `id`. Blank comments are rejected locally.
    pub async fn add_comment(&self, id: u64, content: &str) -> AppResult<Comment> {
        if content.trim().is_empty() {
            return Err(AppError::validation("Comment must not be empty"));
        }
        let comment: Comment = self
            .gateway
            .request(ApiRequest::post(
                paths::issue_comments(id),
                serde_json::json!({ "content": content }),
            ))
            .await?
            .json()?;
        self.changed(ChangeAction::Updated, id);
        Ok(comment)
    }

    /// Apply our own write to the cache without waiting for the push echo.
    fn changed(&self, action: ChangeAction, id: u64) {
        self.invalidator
            .on_resource_changed(&ResourceChanged::new(action, keys::ISSUE, Some(id.into())));
    }
}
