//! # issuetrack-realtime
//!
//! Push channel for the IssueTrack client. Provides:
//!
//! - One WebSocket connection per live session, torn down when the
//!   session is cleared or replaced by a new login
//! - Bounded exponential reconnect backoff
//! - Frame parsing, including the legacy `issue_update` frames
//! - Topic-based event dispatch with weakly held subscribers
//! - User notifications for resource changes
//! - Connection and frame counters

pub mod connection;
pub mod dispatcher;
pub mod message;
pub mod metrics;
pub mod notification;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use connection::backoff::ExponentialBackoff;
pub use connection::client::RealtimeClient;
pub use connection::connector::{PushConnector, PushStream, TungsteniteConnector};
pub use connection::state::{ConnectionEvent, ConnectionState};
pub use dispatcher::{EventDispatcher, EventHandler, Subscription};
pub use metrics::{MetricsSnapshot, RealtimeMetrics};
pub use notification::ChangeNotifications;
