//! Push channel configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Realtime (WebSocket) client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Whether the push channel is opened at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// WebSocket endpoint.
    #[serde(default = "default_url")]
    pub url: String,
    /// Query parameter carrying the access token on the handshake. Empty
    /// disables it; the `Authorization` header is always sent.
    #[serde(default = "default_token_param")]
    pub token_query_param: String,
    /// First reconnect delay in milliseconds.
    #[serde(default = "default_backoff_initial")]
    pub backoff_initial_ms: u64,
    /// Upper bound for the reconnect delay in milliseconds.
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,
    /// Growth factor applied per consecutive failure.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,
    /// Handshake timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_url(),
            token_query_param: default_token_param(),
            backoff_initial_ms: default_backoff_initial(),
            backoff_max_ms: default_backoff_max(),
            backoff_multiplier: default_backoff_multiplier(),
            connect_timeout_seconds: default_connect_timeout(),
        }
    }
}

impl RealtimeConfig {
    /// Handshake timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

fn default_true() -> bool {
    true
}

fn default_url() -> String {
    "ws://localhost:8000/ws/issues/".to_string()
}

fn default_token_param() -> String {
    "token".to_string()
}

fn default_backoff_initial() -> u64 {
    500
}

fn default_backoff_max() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> u32 {
    2
}

fn default_connect_timeout() -> u64 {
    10
}
