//! Local session persistence configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where the session credentials survive between runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStorageKind {
    /// A JSON file on disk.
    #[default]
    File,
    /// Process memory only; nothing survives a restart.
    Memory,
}

/// Session persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Storage backend.
    #[serde(default)]
    pub storage: SessionStorageKind,
    /// Path of the credentials file when `storage = "file"`.
    #[serde(default = "default_path")]
    pub path: String,
    /// How often a client without a session re-reads storage for one
    /// saved by another process.
    #[serde(default = "default_restore_poll_seconds")]
    pub restore_poll_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            storage: SessionStorageKind::default(),
            path: default_path(),
            restore_poll_seconds: default_restore_poll_seconds(),
        }
    }
}

impl SessionConfig {
    /// Storage polling interval as a [`Duration`].
    pub fn restore_poll(&self) -> Duration {
        Duration::from_secs(self.restore_poll_seconds)
    }
}

fn default_path() -> String {
    "data/session.json".to_string()
}

fn default_restore_poll_seconds() -> u64 {
    5
}
