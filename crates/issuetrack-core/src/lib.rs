//! # issuetrack-core
//!
//! Core crate for the IssueTrack client. Contains the unified error
//! system, configuration schemas, push-channel domain events, the
//! request/response types shared by the gateway and its callers, and
//! the traits that sit at every network seam.
//!
//! This crate has **no** internal dependencies on other IssueTrack crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod traits;
pub mod types;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
