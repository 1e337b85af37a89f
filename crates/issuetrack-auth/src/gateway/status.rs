//! Mapping of non-2xx responses onto error kinds.

use issuetrack_core::error::AppError;
use issuetrack_core::types::http::{HttpResponse, Method};

/// Translate an unsuccessful response into the error returned to the
/// caller. 401 is handled by the gateway before this is reached.
pub fn error_for_status(method: Method, path: &str, response: &HttpResponse) -> AppError {
    let detail = response.detail();
    let context = format!("{method} {path} returned {}", response.status);
    let message = if detail.is_empty() {
        context
    } else {
        format!("{context}: {detail}")
    };

    match response.status {
        401 => AppError::unauthenticated(message),
        403 => AppError::unauthorized(message),
        404 => AppError::not_found(message),
        400 | 422 => AppError::validation(message),
        409 => AppError::conflict(message),
        s if s >= 500 => AppError::server(message),
        _ => AppError::client(message),
    }
}
