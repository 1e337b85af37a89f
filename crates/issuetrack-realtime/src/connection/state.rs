//! Connection state machine.

use std::fmt;

/// Where the push connection of the current session stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No session, or the session's connection was torn down.
    #[default]
    Disconnected,
    /// Opening a connection.
    Connecting,
    /// Connection open; frames are flowing.
    Connected,
    /// Connection lost; waiting out the backoff delay.
    Reconnecting,
}

/// Inputs to [`ConnectionState::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A session became live.
    SessionAvailable,
    /// The connection opened.
    Opened,
    /// The connection closed, failed, or could not be opened.
    Lost,
    /// The backoff delay elapsed.
    BackoffElapsed,
    /// The session was cleared or replaced.
    SessionCleared,
}

impl ConnectionState {
    /// The state after `event`. Events that do not apply in the current
    /// state leave it unchanged.
    pub fn on(self, event: ConnectionEvent) -> Self {
        use ConnectionEvent as E;
        use ConnectionState as S;

        match (self, event) {
            (_, E::SessionCleared) => S::Disconnected,
            (S::Disconnected, E::SessionAvailable) => S::Connecting,
            (S::Connecting, E::Opened) => S::Connected,
            (S::Connecting | S::Connected, E::Lost) => S::Reconnecting,
            (S::Reconnecting, E::BackoffElapsed) => S::Connecting,
            (state, _) => state,
        }
    }

    /// Whether frames can currently arrive.
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
        }
    }
}
