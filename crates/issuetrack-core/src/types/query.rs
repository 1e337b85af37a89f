//! Structural fingerprints of logical read queries.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::events::ResourceId;

/// Identifies one cacheable read: resource kind, optional id, and the
/// remaining parameters (filters, page, ...).
///
/// Parameters are kept in a sorted map so two keys built from the same
/// parameters in a different order are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryKey {
    /// Resource kind, e.g. `"issue"`.
    pub kind: String,
    /// Specific resource for detail reads.
    pub id: Option<ResourceId>,
    /// View name within the kind (`"list"`, `"detail"`, `"comments"`, ...).
    pub view: String,
    /// Filters, paging and other parameters.
    pub params: BTreeMap<String, String>,
}

impl QueryKey {
    /// Key for a list view of `kind`.
    pub fn list(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: None,
            view: "list".to_string(),
            params: BTreeMap::new(),
        }
    }

    /// Key for the detail view of one resource.
    pub fn detail(kind: impl Into<String>, id: impl Into<ResourceId>) -> Self {
        Self {
            kind: kind.into(),
            id: Some(id.into()),
            view: "detail".to_string(),
            params: BTreeMap::new(),
        }
    }

    /// Key for a named view, optionally scoped to one resource.
    pub fn view(kind: impl Into<String>, view: impl Into<String>, id: Option<ResourceId>) -> Self {
        Self {
            kind: kind.into(),
            id,
            view: view.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Whether an event for `kind` concerns this key.
    pub fn matches_kind(&self, kind: &str) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.view)?;
        if let Some(id) = &self.id {
            write!(f, ":{id}")?;
        }
        for (i, (k, v)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{k}={v}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_order_does_not_change_identity() {
        let a = QueryKey::list("issue")
            .with_param("status", "open")
            .with_param("page", "2");
        let b = QueryKey::list("issue")
            .with_param("page", "2")
            .with_param("status", "open");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "issue:list?page=2&status=open");
    }

    #[test]
    fn test_detail_display() {
        let key = QueryKey::detail("issue", 7u64);
        assert_eq!(key.to_string(), "issue:detail:7");
        assert!(key.matches_kind("issue"));
        assert!(!key.matches_kind("user"));
    }
}
