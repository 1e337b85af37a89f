//! Result alias used by every IssueTrack crate.

use crate::error::AppError;

/// `Result` specialised to [`AppError`].
pub type AppResult<T> = Result<T, AppError>;
