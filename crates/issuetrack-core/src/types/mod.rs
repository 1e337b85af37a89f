//! Shared value types.

pub mod http;
pub mod query;

pub use http::{ApiRequest, HttpRequest, HttpResponse, Method};
pub use query::QueryKey;
