//! Token endpoint and credential refresh configuration.

use serde::{Deserialize, Serialize};

/// How a refresh-grant response's `refresh_token` is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshRotation {
    /// Use a rotated refresh token when the server returns one, keep the
    /// current one otherwise.
    #[default]
    Accept,
    /// Always keep the refresh token obtained at login.
    Keep,
}

/// OAuth2 client credentials and token-exchange settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Path of the token endpoint (password and refresh grants).
    #[serde(default = "default_token_path")]
    pub token_path: String,
    /// Path returning the authenticated user's profile.
    #[serde(default = "default_current_user_path")]
    pub current_user_path: String,
    /// OAuth2 client identifier.
    #[serde(default)]
    pub client_id: String,
    /// OAuth2 client secret.
    #[serde(default)]
    pub client_secret: String,
    /// Refresh-token rotation handling.
    #[serde(default)]
    pub refresh_rotation: RefreshRotation,
    /// Refresh proactively when the access token expires within this many seconds.
    #[serde(default = "default_refresh_skew")]
    pub refresh_skew_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_path: default_token_path(),
            current_user_path: default_current_user_path(),
            client_id: String::new(),
            client_secret: String::new(),
            refresh_rotation: RefreshRotation::default(),
            refresh_skew_seconds: default_refresh_skew(),
        }
    }
}

fn default_token_path() -> String {
    "/api/auth/token/".to_string()
}

fn default_current_user_path() -> String {
    "/api/users/me/".to_string()
}

fn default_refresh_skew() -> u64 {
    30
}
