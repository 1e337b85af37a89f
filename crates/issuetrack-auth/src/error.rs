//! Token exchange failures and their mapping onto [`AppError`].

use thiserror::Error;

use issuetrack_core::error::{AppError, ErrorKind};

/// Why a token exchange did not produce credentials.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The endpoint answered with a 4xx: the grant itself is invalid.
    #[error("token endpoint rejected the grant ({status}): {detail}")]
    Rejected {
        /// HTTP status.
        status: u16,
        /// Server-provided reason.
        detail: String,
    },
    /// The endpoint answered with a 5xx.
    #[error("token endpoint unavailable ({status})")]
    Unavailable {
        /// HTTP status.
        status: u16,
    },
    /// The endpoint could not be reached.
    #[error("token endpoint unreachable: {0}")]
    Unreachable(#[source] AppError),
    /// The response did not contain usable credentials.
    #[error("malformed token response: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl TokenError {
    /// Mapping used for the password grant: bad credentials are
    /// `Unauthenticated`, everything else keeps its transport-level kind.
    pub fn into_login_error(self) -> AppError {
        let kind = match &self {
            Self::Rejected { .. } => ErrorKind::Unauthenticated,
            Self::Unavailable { .. } => ErrorKind::ServerError,
            Self::Unreachable(_) => ErrorKind::Transport,
            Self::Malformed(_) => ErrorKind::Serialization,
        };
        let message = format!("Login failed: {self}");
        AppError::with_source(kind, message, self)
    }

    /// Mapping used for the refresh grant: every failure is `RefreshFailed`.
    pub fn into_refresh_error(self) -> AppError {
        let message = format!("Credential refresh failed: {self}");
        AppError::with_source(ErrorKind::RefreshFailed, message, self)
    }
}
