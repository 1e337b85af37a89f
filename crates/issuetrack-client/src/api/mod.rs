//! Typed REST API.

pub mod analytics;
pub mod issues;
pub mod paths;
pub mod users;

use serde::de::DeserializeOwned;
use serde_json::Value;

use issuetrack_core::result::AppResult;

pub use analytics::{AnalyticsApi, DailyStats, DashboardStats, FieldCount};
pub use issues::{
    Comment, Issue, IssueFilter, IssueStatus, IssueUpdate, IssuesApi, NewIssue, Severity,
};
pub use users::{NewUser, UserUpdate, UsersApi};

/// Items of a list response, paginated (`{"results": [...]}`) or not.
pub(crate) fn list_items<T: DeserializeOwned>(value: Value) -> AppResult<Vec<T>> {
    let items = match value {
        Value::Object(mut page) if page.contains_key("results") => {
            page.remove("results").unwrap_or(Value::Array(Vec::new()))
        }
        other => other,
    };
    Ok(serde_json::from_value(items)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_items_accepts_plain_and_paginated() {
        let plain: Vec<u32> = list_items(json!([1, 2])).unwrap();
        let paged: Vec<u32> =
            list_items(json!({"count": 2, "next": null, "results": [1, 2]})).unwrap();
        assert_eq!(plain, paged);
        assert!(list_items::<u32>(json!({"detail": "nope"})).is_err());
    }
}
