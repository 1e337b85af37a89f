//! Query fetch seam used by the cache.

use async_trait::async_trait;
use serde_json::Value;

use crate::result::AppResult;
use crate::types::query::QueryKey;

/// Loads the current server value of a query.
///
/// The production implementation issues the read through the auth
/// gateway, so every cache refetch shares the gateway's single-flight
/// refresh behaviour.
#[async_trait]
pub trait QueryFetcher: Send + Sync + std::fmt::Debug + 'static {
    /// Fetch the value behind `key`.
    async fn fetch(&self, key: &QueryKey) -> AppResult<Value>;
}
