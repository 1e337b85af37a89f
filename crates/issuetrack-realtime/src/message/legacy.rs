//! Frames from servers that predate `resource-changed`.
//!
//! They look like `{"type": "issue_update", "data": {"action": ..., "issue": {...}}}`
//! for saves and `{"action": "deleted", "issue_id": N}` for deletions.

use serde::Deserialize;
use serde_json::{Map, Value};

use issuetrack_core::error::{AppError, ErrorKind};
use issuetrack_core::events::{ChangeAction, ResourceChanged, ResourceId};
use issuetrack_core::result::AppResult;

/// Legacy frame type.
pub const ISSUE_UPDATE: &str = "issue_update";

#[derive(Debug, Deserialize)]
struct IssueUpdate {
    action: ChangeAction,
    #[serde(default)]
    issue: Option<Map<String, Value>>,
    #[serde(default)]
    issue_id: Option<ResourceId>,
}

/// Rewrite an `issue_update` payload as a [`ResourceChanged`] for kind
/// `issue`. The serialized issue, when present, is kept under `issue`.
pub fn normalise_issue_update(data: &Value) -> AppResult<ResourceChanged> {
    let update = IssueUpdate::deserialize(data).map_err(|e| {
        AppError::with_source(
            ErrorKind::MalformedFrame,
            "issue_update frame has an unexpected shape",
            e,
        )
    })?;

    let id = match (&update.issue_id, &update.issue) {
        (Some(id), _) => Some(id.clone()),
        (None, Some(issue)) => issue
            .get("id")
            .map(|id| ResourceId::deserialize(id))
            .transpose()
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::MalformedFrame,
                    "issue_update carries an invalid issue id",
                    e,
                )
            })?,
        (None, None) => None,
    };

    let mut event = ResourceChanged::new(update.action, "issue", id);
    if let Some(issue) = update.issue {
        event = event.with_field("issue", Value::Object(issue));
    }
    Ok(event)
}
