//! Client configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section, and every field carries a default so that an empty file is
//! a valid configuration.

pub mod api;
pub mod auth;
pub mod cache;
pub mod logging;
pub mod realtime;
pub mod session;

use serde::{Deserialize, Serialize};

pub use self::api::ApiConfig;
pub use self::auth::{AuthConfig, RefreshRotation};
pub use self::cache::{CacheConfig, RefetchPolicy};
pub use self::logging::LoggingConfig;
pub use self::realtime::RealtimeConfig;
pub use self::session::{SessionConfig, SessionStorageKind};

use crate::error::AppError;

/// Largest accepted `auth.refresh_skew_seconds` (one day).
pub const MAX_REFRESH_SKEW_SECONDS: u64 = 86_400;

/// Root client configuration.
///
/// Top-level deserialization target for the merged configuration
/// (default.toml + environment overlay + `ISSUETRACK__*` variables).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// REST API settings.
    #[serde(default)]
    pub api: ApiConfig,
    /// Token endpoint and refresh settings.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Local session persistence settings.
    #[serde(default)]
    pub session: SessionConfig,
    /// Push channel settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Query cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration for the given environment.
    ///
    /// Merges `config/default`, the optional `config/{env}` overlay, and
    /// environment variables prefixed with `ISSUETRACK`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        Self::load_from("config/default", env)
    }

    /// Load configuration starting from an explicit base file path
    /// (extension optional).
    pub fn load_from(base: &str, env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(base).required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("ISSUETRACK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let parsed: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Reject values that would make the client misbehave at runtime.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.realtime.backoff_initial_ms == 0 {
            return Err(AppError::configuration(
                "realtime.backoff_initial_ms must be greater than zero",
            ));
        }
        if self.realtime.backoff_max_ms < self.realtime.backoff_initial_ms {
            return Err(AppError::configuration(
                "realtime.backoff_max_ms must not be below realtime.backoff_initial_ms",
            ));
        }
        if self.realtime.backoff_multiplier < 1 {
            return Err(AppError::configuration(
                "realtime.backoff_multiplier must be at least 1",
            ));
        }
        if self.auth.refresh_skew_seconds > MAX_REFRESH_SKEW_SECONDS {
            return Err(AppError::configuration(format!(
                "auth.refresh_skew_seconds must be at most {MAX_REFRESH_SKEW_SECONDS}"
            )));
        }
        if self.session.restore_poll_seconds == 0 {
            return Err(AppError::configuration(
                "session.restore_poll_seconds must be greater than zero",
            ));
        }
        if self.api.base_url.trim().is_empty() {
            return Err(AppError::configuration("api.base_url must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.api.base_url, "http://localhost:8000");
        assert_eq!(config.auth.token_path, "/api/auth/token/");
        assert_eq!(config.realtime.backoff_initial_ms, 500);
        assert_eq!(config.cache.refetch_policy, RefetchPolicy::OnNextAccess);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{"auth": {"client_id": "web", "refresh_rotation": "keep"}}"#,
        )
        .unwrap();
        assert_eq!(config.auth.client_id, "web");
        assert_eq!(config.auth.refresh_rotation, RefreshRotation::Keep);
        assert_eq!(config.auth.refresh_skew_seconds, 30);
    }

    #[test]
    fn test_validate_rejects_inverted_backoff_bounds() {
        let mut config = AppConfig::default();
        config.realtime.backoff_initial_ms = 5_000;
        config.realtime.backoff_max_ms = 1_000;
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_validate_rejects_oversized_refresh_skew() {
        let mut config = AppConfig::default();
        config.auth.refresh_skew_seconds = MAX_REFRESH_SKEW_SECONDS;
        assert!(config.validate().is_ok());

        config.auth.refresh_skew_seconds = u64::MAX;
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Configuration);
        assert!(err.message.contains("refresh_skew_seconds"));
    }

    #[test]
    fn test_validate_rejects_zero_restore_poll() {
        let mut config = AppConfig::default();
        config.session.restore_poll_seconds = 0;
        assert!(config.validate().is_err());
    }
}
