//! Process-wide authentication events.

use std::fmt;

use uuid::Uuid;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// The user logged out.
    UserRequested,
    /// The refresh credential was rejected or unreachable.
    RefreshFailed,
}

impl fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserRequested => write!(f, "user_requested"),
            Self::RefreshFailed => write!(f, "refresh_failed"),
        }
    }
}

/// Emitted by the gateway and session manager on session lifecycle changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A new session lineage started.
    LoggedIn {
        /// Lineage ID.
        session_id: Uuid,
    },
    /// The access credential was replaced.
    Refreshed {
        /// Lineage ID.
        session_id: Uuid,
    },
    /// The session ended.
    LoggedOut {
        /// Lineage ID of the ended session.
        session_id: Uuid,
        /// Why it ended.
        reason: LogoutReason,
    },
}
