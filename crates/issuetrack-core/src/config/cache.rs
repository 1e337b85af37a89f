//! Query cache configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// When a stale entry is fetched again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefetchPolicy {
    /// Refetch when the entry is next read.
    #[default]
    OnNextAccess,
    /// Refetch in the background right away if the entry is being watched.
    Immediate,
}

/// Query cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached query results.
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
    /// How long a fetched result counts as fresh, in seconds.
    #[serde(default = "default_fresh_ttl")]
    pub fresh_ttl_seconds: u64,
    /// Refetch policy for invalidated entries.
    #[serde(default)]
    pub refetch_policy: RefetchPolicy,
    /// Resource kinds that must also be invalidated when a kind changes.
    #[serde(default = "default_related_kinds")]
    pub related_kinds: HashMap<String, Vec<String>>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: default_max_capacity(),
            fresh_ttl_seconds: default_fresh_ttl(),
            refetch_policy: RefetchPolicy::default(),
            related_kinds: default_related_kinds(),
        }
    }
}

fn default_max_capacity() -> u64 {
    1000
}

fn default_fresh_ttl() -> u64 {
    60
}

fn default_related_kinds() -> HashMap<String, Vec<String>> {
    HashMap::from([("issue".to_string(), vec!["analytics".to_string()])])
}
