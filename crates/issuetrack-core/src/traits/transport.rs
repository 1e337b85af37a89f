//! HTTP transport seam.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::http::{HttpRequest, HttpResponse};

/// Sends one HTTP request and returns whatever the server answered.
///
/// Implementations must not interpret status codes: a 401 or a 500 is a
/// successful exchange as far as the transport is concerned. Only
/// connection-level failures are errors, and they use
/// [`ErrorKind::Transport`](crate::error::ErrorKind::Transport).
#[async_trait]
pub trait HttpTransport: Send + Sync + std::fmt::Debug + 'static {
    /// Perform the exchange.
    async fn send(&self, request: HttpRequest) -> AppResult<HttpResponse>;
}
