//! User-visible notification seam.

use std::fmt;

use tracing::{error, info, warn};

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    /// Something succeeded.
    Success,
    /// Informational.
    Info,
    /// Something failed.
    Error,
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Info => write!(f, "info"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A message meant for the person using the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Severity.
    pub level: NotificationLevel,
    /// Text shown to the user.
    pub message: String,
}

impl Notification {
    /// Success notification.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    /// Informational notification.
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    /// Error notification.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

/// Surfaces notifications to the user. Rendering is up to the front end.
pub trait Notifier: Send + Sync + std::fmt::Debug + 'static {
    /// Show a notification. Must not block.
    fn notify(&self, notification: Notification);
}

/// Notifier that writes to the log. Used when no front end is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Success | NotificationLevel::Info => {
                info!(level = %notification.level, "{}", notification.message)
            }
            NotificationLevel::Error => {
                if notification.message.is_empty() {
                    warn!("empty error notification");
                } else {
                    error!(level = %notification.level, "{}", notification.message)
                }
            }
        }
    }
}
