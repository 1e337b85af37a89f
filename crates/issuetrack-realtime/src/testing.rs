//! In-memory push connector for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use issuetrack_core::error::AppError;
use issuetrack_core::result::AppResult;

use crate::connection::connector::{PushConnector, PushStream};

enum Feed {
    Frame(String),
    Error(AppError),
    Close,
}

#[derive(Default)]
struct Counters {
    attempts: AtomicUsize,
    connects: AtomicUsize,
    live: AtomicUsize,
    failures_left: AtomicUsize,
}

/// A [`PushConnector`] whose connections are fed by the test.
///
/// Frames pushed with [`MockConnector::push`] go to the most recently
/// opened connection.
#[derive(Default)]
pub struct MockConnector {
    counters: Arc<Counters>,
    tokens: Mutex<Vec<String>>,
    current: Mutex<Option<mpsc::UnboundedSender<Feed>>>,
}

impl std::fmt::Debug for MockConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnector")
            .field("connects", &self.connects())
            .field("live", &self.live_connections())
            .finish()
    }
}

impl MockConnector {
    /// Create a connector that accepts every attempt.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` connection attempts with a transport error.
    pub fn fail_next(&self, n: usize) {
        self.counters.failures_left.store(n, Ordering::SeqCst);
    }

    /// Connection attempts, failed ones included.
    pub fn attempts(&self) -> usize {
        self.counters.attempts.load(Ordering::SeqCst)
    }

    /// Connections successfully opened.
    pub fn connects(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    /// Connections opened and not yet closed or dropped.
    pub fn live_connections(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    /// Access tokens of the successful connections, in order.
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().map(|t| t.clone()).unwrap_or_default()
    }

    /// Deliver a text frame. Returns whether a connection received it.
    pub fn push(&self, text: &str) -> bool {
        self.feed(Feed::Frame(text.to_string()))
    }

    /// Deliver a read error.
    pub fn push_error(&self, error: AppError) -> bool {
        self.feed(Feed::Error(error))
    }

    /// Close the current connection from the server side.
    pub fn drop_connection(&self) -> bool {
        self.feed(Feed::Close)
    }

    fn feed(&self, item: Feed) -> bool {
        self.current
            .lock()
            .ok()
            .and_then(|current| current.as_ref().map(|tx| tx.send(item).is_ok()))
            .unwrap_or(false)
    }
}

#[async_trait]
impl PushConnector for MockConnector {
    async fn connect(&self, access_token: &str) -> AppResult<Box<dyn PushStream>> {
        self.counters.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .counters
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AppError::transport("connection refused"));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut current) = self.current.lock() {
            *current = Some(tx);
        }
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.push(access_token.to_string());
        }
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        self.counters.live.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MockStream {
            rx,
            counters: self.counters.clone(),
            closed: false,
        }))
    }
}

struct MockStream {
    rx: mpsc::UnboundedReceiver<Feed>,
    counters: Arc<Counters>,
    closed: bool,
}

impl MockStream {
    fn mark_closed(&mut self) {
        if !self.closed {
            self.closed = true;
            self.counters.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl PushStream for MockStream {
    async fn next_frame(&mut self) -> Option<AppResult<String>> {
        if self.closed {
            return None;
        }
        match self.rx.recv().await {
            Some(Feed::Frame(text)) => Some(Ok(text)),
            Some(Feed::Error(e)) => Some(Err(e)),
            Some(Feed::Close) | None => {
                self.mark_closed();
                None
            }
        }
    }

    async fn close(&mut self) {
        self.mark_closed();
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.mark_closed();
    }
}
