//! Push channel counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Connection and frame counters for one realtime client.
#[derive(Debug, Default)]
pub struct RealtimeMetrics {
    /// Text frames received
    pub frames_received: AtomicU64,
    /// Frames dropped because they could not be parsed
    pub frames_malformed: AtomicU64,
    /// Frames handed to at least one subscriber
    pub frames_dispatched: AtomicU64,
    /// Connections opened
    pub connections_opened: AtomicU64,
    /// Connections closed, by either side
    pub connections_closed: AtomicU64,
    /// Connection attempts that failed
    pub connect_failures: AtomicU64,
    /// Reconnect attempts after a lost or failed connection
    pub reconnect_attempts: AtomicU64,
}

impl RealtimeMetrics {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.frames_malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatched(&self) {
        self.frames_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        let opened = self.connections_opened.load(Ordering::Relaxed);
        let closed = self.connections_closed.load(Ordering::Relaxed);
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_malformed: self.frames_malformed.load(Ordering::Relaxed),
            frames_dispatched: self.frames_dispatched.load(Ordering::Relaxed),
            connections_opened: opened,
            connections_closed: closed,
            connections_active: opened.saturating_sub(closed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
        }
    }
}

/// Serializable counters snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Text frames received
    pub frames_received: u64,
    /// Frames dropped as malformed
    pub frames_malformed: u64,
    /// Frames handed to at least one subscriber
    pub frames_dispatched: u64,
    /// Connections opened
    pub connections_opened: u64,
    /// Connections closed
    pub connections_closed: u64,
    /// Connections currently open
    pub connections_active: u64,
    /// Failed connection attempts
    pub connect_failures: u64,
    /// Reconnect attempts
    pub reconnect_attempts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_connections_derived_from_open_and_close() {
        let metrics = RealtimeMetrics::new();
        metrics.record_opened();
        metrics.record_opened();
        metrics.record_closed();
        metrics.record_frame();
        metrics.record_malformed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connections_active, 1);
        assert_eq!(snapshot.frames_received, 1);
        assert_eq!(snapshot.frames_malformed, 1);
        assert_eq!(snapshot.frames_dispatched, 0);
    }
}
