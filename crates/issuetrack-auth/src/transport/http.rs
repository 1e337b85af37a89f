//! [`HttpTransport`] backed by a pooled `reqwest` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use tracing::debug;

use issuetrack_core::config::ApiConfig;
use issuetrack_core::error::{AppError, ErrorKind};
use issuetrack_core::result::AppResult;
use issuetrack_core::traits::transport::HttpTransport;
use issuetrack_core::types::http::{HttpRequest, HttpResponse, Method};

/// Sends requests over a shared connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a transport with the configured request timeout.
    pub fn new(config: &ApiConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent(concat!("issuetrack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> AppResult<HttpResponse> {
        let mut url = Url::parse(&request.url)
            .map_err(|e| AppError::configuration(format!("Invalid URL {}: {e}", request.url)))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }

        let mut builder = self.client.request(Self::method(request.method), url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Transport,
                format!("{} {} failed", request.method, request.url),
                e,
            )
        })?;

        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Transport,
                "Failed to read response body",
                e,
            )
        })?;
        // Empty bodies (204) and non-JSON error pages decode as null.
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        debug!(method = %request.method, url = %request.url, status, "HTTP exchange");
        Ok(HttpResponse::new(status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_from_default_config() {
        assert!(ReqwestTransport::new(&ApiConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_rejects_unparseable_url() {
        let transport = ReqwestTransport::new(&ApiConfig::default()).unwrap();
        let err = transport
            .send(HttpRequest::new(Method::Get, "not a url"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let transport = ReqwestTransport::new(&ApiConfig::default()).unwrap();
        let err = transport
            .send(HttpRequest::new(Method::Get, "http://127.0.0.1:9/api/issues/"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Transport);
    }
}
