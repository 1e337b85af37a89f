//! REST endpoint paths.

use std::fmt::Display;

/// Issue collection.
pub const ISSUES: &str = "/api/issues/";
/// User collection.
pub const USERS: &str = "/api/users/";
pub const DASHBOARD: &str = "/api/analytics/dashboard/";
pub const DAILY_STATS: &str = "/api/analytics/daily-stats/";

/// One issue.
pub fn issue(id: impl Display) -> String {
    format!("{ISSUES}{id}/")
}

/// Comments on one issue.
pub fn issue_comments(id: impl Display) -> String {
    format!("{ISSUES}{id}/comments/")
}

/// One user.
pub fn user(id: impl Display) -> String {
    format!("{USERS}{id}/")
}
