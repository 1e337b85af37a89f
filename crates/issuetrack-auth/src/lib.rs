//! # issuetrack-auth
//!
//! Credential handling for the IssueTrack client.
//!
//! ## Modules
//!
//! - `session`: the Session Store, its persistence backends, and the
//!   login/logout/restore flows
//! - `token`: password and refresh grants against the token endpoint
//! - `gateway`: the Auth Gateway: attaches credentials to every call and
//!   refreshes them exactly once under concurrent expiry
//! - `transport`: the reqwest-backed HTTP transport

pub mod error;
pub mod gateway;
pub mod session;
pub mod token;
pub mod transport;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use gateway::{AuthEvent, AuthGateway, LogoutReason};
pub use session::{
    FileSessionPersistence, MemorySessionPersistence, Session, SessionManager,
    SessionPersistence, SessionStore, UserProfile,
};
pub use token::{TokenClient, TokenResponse};
pub use transport::ReqwestTransport;
