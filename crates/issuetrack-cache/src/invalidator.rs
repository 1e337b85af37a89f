//! Push-driven cache invalidation.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, info, warn};

use issuetrack_core::config::{CacheConfig, RefetchPolicy};
use issuetrack_core::error::{AppError, ErrorKind};
use issuetrack_core::events::ResourceChanged;
use issuetrack_core::result::AppResult;

use crate::store::QueryCache;

/// Marks cached queries stale when the server reports a change.
///
/// Every refetch it triggers is a normal [`QueryCache`] read, which goes
/// through the auth gateway like any other call.
#[derive(Debug, Clone)]
pub struct CacheInvalidator {
    cache: QueryCache,
    policy: RefetchPolicy,
    /// Kinds that must also be invalidated when a kind changes.
    related: HashMap<String, Vec<String>>,
}

impl CacheInvalidator {
    /// Create an invalidator for `cache`.
    pub fn new(cache: QueryCache, config: &CacheConfig) -> Self {
        Self {
            cache,
            policy: config.refetch_policy,
            related: config.related_kinds.clone(),
        }
    }

    /// The refetch policy in effect.
    pub fn policy(&self) -> RefetchPolicy {
        self.policy
    }

    /// Apply a `resource-changed` payload as dispatched by the realtime
    /// client. Returns the number of cached entries marked stale.
    pub fn handle_payload(&self, payload: &Value) -> AppResult<usize> {
        let event = ResourceChanged::from_payload(payload).map_err(|e| {
            AppError::with_source(
                ErrorKind::MalformedFrame,
                "resource-changed payload does not match the event shape",
                e,
            )
        })?;
        Ok(self.on_resource_changed(&event))
    }

    /// Mark every entry of the event's kind (and related kinds) stale.
    ///
    /// Created, updated and deleted are treated alike: list views change
    /// for all three. Under [`RefetchPolicy::Immediate`] the affected keys
    /// that are on screen are refetched in the background.
    pub fn on_resource_changed(&self, event: &ResourceChanged) -> usize {
        let kinds = self.kinds_for(&event.resource_kind);
        let affected: usize = kinds.iter().map(|kind| self.cache.invalidate_kind(kind)).sum();

        info!(
            action = %event.action,
            kind = %event.resource_kind,
            id = ?event.resource_id.as_ref().map(|id| id.as_str()),
            affected,
            "Resource changed"
        );

        if self.policy == RefetchPolicy::Immediate {
            for kind in &kinds {
                self.refetch_watched(kind);
            }
        }
        affected
    }

    fn kinds_for(&self, kind: &str) -> Vec<String> {
        let mut kinds = vec![kind.to_string()];
        if let Some(related) = self.related.get(kind) {
            for other in related {
                if !kinds.contains(other) {
                    kinds.push(other.clone());
                }
            }
        }
        kinds
    }

    fn refetch_watched(&self, kind: &str) {
        let watched = self.cache.watched(kind);
        if watched.is_empty() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(kind, "No runtime for eager refetch, leaving entries for next read");
            return;
        };
        for key in watched {
            let cache = self.cache.clone();
            runtime.spawn(async move {
                if let Err(e) = cache.refetch(&key).await {
                    warn!(key = %key, error = %e, "Background refetch failed");
                }
            });
        }
    }
}
