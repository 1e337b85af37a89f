//! # issuetrack-cache
//!
//! Client-side read cache for IssueTrack, kept coherent with the server
//! by push events.
//!
//! - [`QueryCache`]: results of logical reads keyed by [`QueryKey`],
//!   backed by [moka](https://crates.io/crates/moka), with freshness,
//!   staleness, and one fetch at a time per key
//! - [`CacheInvalidator`]: marks entries stale when a `resource-changed`
//!   event arrives and optionally refetches the ones on screen
//!
//! [`QueryKey`]: issuetrack_core::types::QueryKey

pub mod invalidator;
pub mod keys;
pub mod store;

pub use invalidator::CacheInvalidator;
pub use store::{ActiveQuery, CacheStats, CachedQuery, Freshness, QueryCache};
