//! OAuth2 token endpoint client.

pub mod client;
pub mod types;

pub use client::TokenClient;
pub use types::{GrantRequest, TokenResponse};
