//! Password and refresh grants against the token endpoint.

use std::sync::Arc;

use tracing::{debug, info};

use issuetrack_core::config::{ApiConfig, AuthConfig};
use issuetrack_core::result::AppResult;
use issuetrack_core::traits::transport::HttpTransport;
use issuetrack_core::types::http::{HttpRequest, Method};

use crate::error::TokenError;

use super::types::{GrantRequest, TokenResponse};

/// Exchanges credentials for tokens.
///
/// Token calls never go through the gateway: they carry no bearer
/// credential and a 401 from them must not trigger another refresh.
#[derive(Debug, Clone)]
pub struct TokenClient {
    /// Absolute token endpoint URL.
    token_url: String,
    /// OAuth2 client ID.
    client_id: String,
    /// OAuth2 client secret.
    client_secret: String,
    /// HTTP transport.
    transport: Arc<dyn HttpTransport>,
}

impl TokenClient {
    /// Creates a token client.
    pub fn new(api: &ApiConfig, auth: &AuthConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            token_url: api.url_for(&auth.token_path),
            client_id: auth.client_id.clone(),
            client_secret: auth.client_secret.clone(),
            transport,
        }
    }

    /// Log in with a username (email) and password.
    pub async fn password_grant(&self, username: &str, password: &str) -> AppResult<TokenResponse> {
        let grant = GrantRequest::Password {
            username: username.to_string(),
            password: password.to_string(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        };
        let response = self
            .exchange(grant)
            .await
            .map_err(TokenError::into_login_error)?;

        if response.refresh_token.is_none() {
            return Err(TokenError::Rejected {
                status: 200,
                detail: "password grant returned no refresh token".to_string(),
            }
            .into_login_error());
        }
        info!(username = %username, "Password grant succeeded");
        Ok(response)
    }

    /// Trade a refresh credential for a new access credential.
    pub async fn refresh_grant(&self, refresh_token: &str) -> AppResult<TokenResponse> {
        let grant = GrantRequest::RefreshToken {
            refresh_token: refresh_token.to_string(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        };
        let response = self
            .exchange(grant)
            .await
            .map_err(TokenError::into_refresh_error)?;
        debug!(rotated = response.refresh_token.is_some(), "Refresh grant succeeded");
        Ok(response)
    }

    async fn exchange(&self, grant: GrantRequest) -> Result<TokenResponse, TokenError> {
        let body = serde_json::to_value(&grant)?;
        let request = HttpRequest::new(Method::Post, &self.token_url)
            .with_header("Content-Type", "application/json")
            .with_body(body);

        let response = self
            .transport
            .send(request)
            .await
            .map_err(TokenError::Unreachable)?;

        if response.status >= 500 {
            return Err(TokenError::Unavailable {
                status: response.status,
            });
        }
        if !response.is_success() {
            return Err(TokenError::Rejected {
                status: response.status,
                detail: response.detail(),
            });
        }

        let tokens: TokenResponse = serde_json::from_value(response.body)?;
        if tokens.access_token.is_empty() {
            return Err(TokenError::Rejected {
                status: response.status,
                detail: "empty access token".to_string(),
            });
        }
        Ok(tokens)
    }
}
