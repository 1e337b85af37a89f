//! Opening push connections.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use issuetrack_core::config::RealtimeConfig;
use issuetrack_core::error::{AppError, ErrorKind};
use issuetrack_core::result::AppResult;

/// Bytes escaped in a query value: everything outside the RFC 3986
/// unreserved set.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Opens a push connection authorised by an access token.
#[async_trait]
pub trait PushConnector: Send + Sync + std::fmt::Debug + 'static {
    /// Open a connection for the session owning `access_token`.
    async fn connect(&self, access_token: &str) -> AppResult<Box<dyn PushStream>>;
}

/// An open push connection.
#[async_trait]
pub trait PushStream: Send {
    /// The next text frame.
    ///
    /// `None` when the server closed the connection. An error of kind
    /// [`ErrorKind::MalformedFrame`] concerns one frame only; any other
    /// error means the connection is gone.
    async fn next_frame(&mut self) -> Option<AppResult<String>>;

    /// Close the connection. Safe to call more than once.
    async fn close(&mut self);
}

/// [`PushConnector`] over `tokio-tungstenite`.
///
/// The access token goes out as an `Authorization: Bearer` header and,
/// unless the parameter name is empty, as a query parameter for servers
/// that cannot read headers on the upgrade request.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    url: String,
    token_query_param: String,
    connect_timeout: Duration,
}

impl TungsteniteConnector {
    /// Create a connector from the realtime settings.
    pub fn new(config: &RealtimeConfig) -> Self {
        Self {
            url: config.url.clone(),
            token_query_param: config.token_query_param.clone(),
            connect_timeout: config.connect_timeout(),
        }
    }

    /// The URL to connect to for `access_token`.
    pub fn url_for(&self, access_token: &str) -> String {
        if self.token_query_param.is_empty() {
            return self.url.clone();
        }
        let sep = if self.url.contains('?') { '&' } else { '?' };
        format!(
            "{}{sep}{}={}",
            self.url,
            self.token_query_param,
            utf8_percent_encode(access_token, QUERY_VALUE)
        )
    }
}

#[async_trait]
impl PushConnector for TungsteniteConnector {
    async fn connect(&self, access_token: &str) -> AppResult<Box<dyn PushStream>> {
        let mut request = self.url_for(access_token).into_client_request().map_err(|e| {
            AppError::with_source(ErrorKind::Configuration, "Invalid realtime URL", e)
        })?;
        let bearer = HeaderValue::from_str(&format!("Bearer {access_token}")).map_err(|e| {
            AppError::with_source(
                ErrorKind::Unauthenticated,
                "Access token is not a valid header value",
                e,
            )
        })?;
        request.headers_mut().insert("Authorization", bearer);

        let timeout = self.connect_timeout;
        let (socket, response) = tokio::time::timeout(timeout, connect_async(request))
            .await
            .map_err(|_| {
                AppError::transport(format!("Push connection timed out after {timeout:?}"))
            })?
            .map_err(|e| {
                AppError::with_source(ErrorKind::Transport, "Push connection failed", e)
            })?;

        debug!(status = %response.status(), "Push connection upgraded");
        Ok(Box::new(TungsteniteStream {
            socket,
            closed: false,
        }))
    }
}

struct TungsteniteStream {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

#[async_trait]
impl PushStream for TungsteniteStream {
    async fn next_frame(&mut self) -> Option<AppResult<String>> {
        if self.closed {
            return None;
        }
        loop {
            let message = match self.socket.next().await? {
                Ok(message) => message,
                Err(e) => {
                    return Some(Err(AppError::with_source(
                        ErrorKind::Transport,
                        "Push connection error",
                        e,
                    )));
                }
            };
            match message {
                Message::Text(text) => return Some(Ok(text.as_str().to_owned())),
                Message::Binary(bytes) => {
                    return Some(String::from_utf8(bytes.to_vec()).map_err(|e| {
                        AppError::with_source(
                            ErrorKind::MalformedFrame,
                            "Binary frame is not UTF-8",
                            e,
                        )
                    }));
                }
                Message::Close(frame) => {
                    debug!(?frame, "Server closed push connection");
                    self.closed = true;
                    return None;
                }
                // Pings are answered by tungstenite itself.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.socket.close(None).await {
            debug!(error = %e, "Error while closing push connection");
        }
        // Flush the close handshake; the server's reply is not awaited.
        let _ = self.socket.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_goes_into_query() {
        let connector = TungsteniteConnector::new(&RealtimeConfig::default());
        assert_eq!(
            connector.url_for("A1"),
            "ws://localhost:8000/ws/issues/?token=A1"
        );
    }

    #[test]
    fn test_token_is_encoded_and_appended() {
        let config = RealtimeConfig {
            url: "wss://example.com/ws/?v=2".to_string(),
            ..RealtimeConfig::default()
        };
        let connector = TungsteniteConnector::new(&config);
        assert_eq!(
            connector.url_for("a+b/c="),
            "wss://example.com/ws/?v=2&token=a%2Bb%2Fc%3D"
        );
    }

    #[test]
    fn test_unreserved_token_bytes_stay_literal() {
        let connector = TungsteniteConnector::new(&RealtimeConfig::default());
        assert_eq!(
            connector.url_for("eyJ.a-b_c~ d&é"),
            "ws://localhost:8000/ws/issues/?token=eyJ.a-b_c~%20d%26%C3%A9"
        );
    }

    #[test]
    fn test_empty_param_name_disables_query_token() {
        let config = RealtimeConfig {
            token_query_param: String::new(),
            ..RealtimeConfig::default()
        };
        let connector = TungsteniteConnector::new(&config);
        assert_eq!(connector.url_for("A1"), "ws://localhost:8000/ws/issues/");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let config = RealtimeConfig {
            url: "ws://127.0.0.1:9/ws/".to_string(),
            connect_timeout_seconds: 2,
            ..RealtimeConfig::default()
        };
        let err = TungsteniteConnector::new(&config)
            .connect("A1")
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::Transport);
    }
}
