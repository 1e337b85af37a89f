//! Traits defined in `issuetrack-core` and implemented by other crates.

pub mod fetcher;
pub mod notifier;
pub mod transport;

pub use fetcher::QueryFetcher;
pub use notifier::{Notification, NotificationLevel, Notifier, TracingNotifier};
pub use transport::HttpTransport;
