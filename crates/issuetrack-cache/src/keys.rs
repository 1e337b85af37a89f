//! Query key builders for every cached read the client makes.
//!
//! Centralising key construction keeps invalidation by kind reliable: an
//! `issue` event reaches every key built here with [`ISSUE`].

use issuetrack_core::events::ResourceId;
use issuetrack_core::types::QueryKey;

/// Issue resource kind.
pub const ISSUE: &str = "issue";
/// User resource kind.
pub const USER: &str = "user";
/// Analytics kind (dashboard aggregates).
pub const ANALYTICS: &str = "analytics";

// ── Issue keys ─────────────────────────────────────────────

/// A page of the issue list with optional filters.
pub fn issue_list<'a>(filters: impl IntoIterator<Item = (&'a str, &'a str)>) -> QueryKey {
    filters
        .into_iter()
        .fold(QueryKey::list(ISSUE), |key, (name, value)| key.with_param(name, value))
}

/// One issue.
pub fn issue(id: impl Into<ResourceId>) -> QueryKey {
    QueryKey::detail(ISSUE, id)
}

/// Comments on one issue. Scoped to the issue kind so issue events
/// refresh them too.
pub fn issue_comments(id: impl Into<ResourceId>) -> QueryKey {
    QueryKey::view(ISSUE, "comments", Some(id.into()))
}

// ── User keys ──────────────────────────────────────────────

/// The user list.
pub fn user_list() -> QueryKey {
    QueryKey::list(USER)
}

/// One user.
pub fn user(id: impl Into<ResourceId>) -> QueryKey {
    QueryKey::detail(USER, id)
}

/// The authenticated user's own profile.
pub fn current_user() -> QueryKey {
    QueryKey::view(USER, "me", None)
}

// ── Analytics keys ─────────────────────────────────────────

/// Dashboard aggregates.
pub fn dashboard() -> QueryKey {
    QueryKey::view(ANALYTICS, "dashboard", None)
}

/// Daily issue statistics over the last `days` days.
pub fn daily_stats(days: u32) -> QueryKey {
    QueryKey::view(ANALYTICS, "daily", None).with_param("days", days.to_string())
}
