//! # issuetrack-client
//!
//! The client-facing surface of IssueTrack.
//!
//! - `api`: typed issue, user, and analytics calls. Reads are served
//!   from the query cache, writes go through the auth gateway and then
//!   invalidate what they touched.
//! - `fetcher`: maps cache keys to REST reads
//! - `client`: [`Client`], the composition root owning every component

pub mod api;
pub mod client;
pub mod fetcher;

pub use api::{AnalyticsApi, IssuesApi, UsersApi};
pub use client::{Client, ClientParts};
pub use fetcher::ApiFetcher;

#[cfg(test)]
mod test_support;
