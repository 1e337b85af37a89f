//! Durable storage for the session credentials.
//!
//! Only the two credential strings are persisted. Everything else about a
//! session (lineage ID, expiry, user) is rebuilt after a restart.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use issuetrack_core::config::{SessionConfig, SessionStorageKind};
use issuetrack_core::error::AppError;
use issuetrack_core::result::AppResult;

/// The persisted form of a session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedCredentials {
    /// Access credential.
    pub access_token: String,
    /// Refresh credential.
    pub refresh_token: String,
}

impl std::fmt::Debug for PersistedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedCredentials")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Backend that keeps credentials across restarts.
#[async_trait]
pub trait SessionPersistence: Send + Sync + std::fmt::Debug + 'static {
    /// Read the stored credentials, if any.
    async fn load(&self) -> AppResult<Option<PersistedCredentials>>;

    /// Replace the stored credentials.
    async fn save(&self, credentials: &PersistedCredentials) -> AppResult<()>;

    /// Remove every trace of stored credentials.
    async fn clear(&self) -> AppResult<()>;
}

/// Build the backend selected in configuration.
pub fn from_config(config: &SessionConfig) -> Box<dyn SessionPersistence> {
    match config.storage {
        SessionStorageKind::File => Box::new(FileSessionPersistence::new(&config.path)),
        SessionStorageKind::Memory => Box::new(MemorySessionPersistence::default()),
    }
}

/// Stores credentials as a JSON file.
///
/// Writes go to a sibling temporary file that is then renamed over the
/// target, so a crash never leaves a half-written file behind.
#[derive(Debug, Clone)]
pub struct FileSessionPersistence {
    path: PathBuf,
}

impl FileSessionPersistence {
    /// Create a backend writing to `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Location of the credentials file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "session.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SessionPersistence for FileSessionPersistence {
    async fn load(&self) -> AppResult<Option<PersistedCredentials>> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AppError::with_source(
                    issuetrack_core::error::ErrorKind::Storage,
                    format!("Failed to read session file {}", self.path.display()),
                    e,
                ));
            }
        };

        match serde_json::from_str(&raw) {
            Ok(credentials) => Ok(Some(credentials)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring unreadable session file");
                Ok(None)
            }
        }
    }

    async fn save(&self, credentials: &PersistedCredentials) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.temp_path();
        fs::write(&tmp, serde_json::to_vec(credentials)?).await?;
        fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), "Session credentials persisted");
        Ok(())
    }

    async fn clear(&self) -> AppResult<()> {
        for path in [self.path.clone(), self.temp_path()] {
            match fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "Removed session file"),
                Err(e) if e.kind() == IoErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Keeps credentials in memory only.
#[derive(Debug, Default)]
pub struct MemorySessionPersistence {
    slot: Mutex<Option<PersistedCredentials>>,
}

impl MemorySessionPersistence {
    /// Create a backend pre-populated with credentials.
    pub fn with_credentials(credentials: PersistedCredentials) -> Self {
        Self {
            slot: Mutex::new(Some(credentials)),
        }
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, Option<PersistedCredentials>>> {
        self.slot
            .lock()
            .map_err(|_| AppError::internal("session persistence lock poisoned"))
    }
}

#[async_trait]
impl SessionPersistence for MemorySessionPersistence {
    async fn load(&self) -> AppResult<Option<PersistedCredentials>> {
        Ok(self.lock()?.clone())
    }

    async fn save(&self, credentials: &PersistedCredentials) -> AppResult<()> {
        *self.lock()? = Some(credentials.clone());
        Ok(())
    }

    async fn clear(&self) -> AppResult<()> {
        *self.lock()? = None;
        Ok(())
    }
}
