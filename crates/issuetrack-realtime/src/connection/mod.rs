//! Push connection lifecycle.

pub mod backoff;
pub mod client;
pub mod connector;
pub mod state;
