//! The realtime client: one push connection per live session.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use issuetrack_auth::session::{Session, SessionStore};
use issuetrack_core::config::RealtimeConfig;
use issuetrack_core::error::ErrorKind;

use crate::dispatcher::EventDispatcher;
use crate::message::Frame;
use crate::metrics::{MetricsSnapshot, RealtimeMetrics};

use super::backoff::ExponentialBackoff;
use super::connector::{PushConnector, PushStream};
use super::state::{ConnectionEvent, ConnectionState};

type SessionWatch = watch::Receiver<Option<Arc<Session>>>;

struct ClientInner {
    connector: Arc<dyn PushConnector>,
    dispatcher: EventDispatcher,
    config: RealtimeConfig,
    state: watch::Sender<ConnectionState>,
    metrics: RealtimeMetrics,
}

struct Running {
    shutdown: CancellationToken,
    supervisor: JoinHandle<()>,
}

/// Keeps a push connection open for the current session.
///
/// The client follows the [`SessionStore`]. A new session lineage opens a
/// connection, a refresh within the lineage keeps it, and a cleared or
/// replaced session closes it before anything else is opened. Lost
/// connections are retried with bounded exponential backoff for as long
/// as the lineage is live.
pub struct RealtimeClient {
    inner: Arc<ClientInner>,
    running: Mutex<Option<Running>>,
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("url", &self.inner.config.url)
            .field("state", &self.state())
            .finish()
    }
}

impl RealtimeClient {
    /// Create a stopped client publishing frames on `dispatcher`.
    pub fn new(
        config: RealtimeConfig,
        connector: Arc<dyn PushConnector>,
        dispatcher: EventDispatcher,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(ClientInner {
                connector,
                dispatcher,
                config,
                state,
                metrics: RealtimeMetrics::new(),
            }),
            running: Mutex::new(None),
        }
    }

    /// Start following `store`. Does nothing if already started or if the
    /// push channel is disabled.
    pub fn start(&self, store: &SessionStore) {
        if !self.inner.config.enabled {
            info!("Realtime channel disabled by configuration");
            return;
        }
        let Ok(mut running) = self.running.lock() else {
            warn!("Realtime client lock poisoned, not starting");
            return;
        };
        if running.is_some() {
            debug!("Realtime client already started");
            return;
        }

        let shutdown = CancellationToken::new();
        let supervisor = tokio::spawn(supervise(
            self.inner.clone(),
            store.subscribe(),
            shutdown.clone(),
        ));
        *running = Some(Running {
            shutdown,
            supervisor,
        });
        info!(url = %self.inner.config.url, "Realtime client started");
    }

    /// Close any connection and stop following the session. Safe to call
    /// more than once; the client can be started again afterwards.
    pub async fn stop(&self) {
        let running = self.running.lock().ok().and_then(|mut r| r.take());
        let Some(running) = running else {
            return;
        };
        running.shutdown.cancel();
        if let Err(e) = running.supervisor.await {
            warn!(error = %e, "Realtime supervisor ended abnormally");
        }
        info!("Realtime client stopped");
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Follow connection state changes.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Connection and frame counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// The dispatcher frames are published on.
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.inner.dispatcher
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        if let Ok(mut running) = self.running.lock() {
            if let Some(running) = running.take() {
                running.shutdown.cancel();
            }
        }
    }
}

/// The connection task of one session lineage.
struct LineageConnection {
    lineage: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl LineageConnection {
    async fn close(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(session_id = %self.lineage, error = %e, "Connection task ended abnormally");
        }
    }
}

/// Reconcile the connection with the session until shut down.
async fn supervise(
    inner: Arc<ClientInner>,
    mut sessions: SessionWatch,
    shutdown: CancellationToken,
) {
    let mut active: Option<LineageConnection> = None;

    loop {
        let lineage = sessions.borrow_and_update().as_ref().map(|s| s.id);
        if lineage != active.as_ref().map(|c| c.lineage) {
            // The old connection is fully closed before a new one opens.
            if let Some(connection) = active.take() {
                debug!(session_id = %connection.lineage, "Session ended, closing push connection");
                connection.close().await;
            }
            if let Some(lineage) = lineage {
                let cancel = shutdown.child_token();
                let task = tokio::spawn(run_connection(
                    inner.clone(),
                    sessions.clone(),
                    lineage,
                    cancel.clone(),
                ));
                active = Some(LineageConnection {
                    lineage,
                    cancel,
                    task,
                });
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = sessions.changed() => {
                if changed.is_err() {
                    debug!("Session store dropped");
                    break;
                }
            }
        }
    }

    if let Some(connection) = active.take() {
        connection.close().await;
    }
}

/// The access token of `lineage`, if that lineage is still current.
fn access_token(sessions: &SessionWatch, lineage: Uuid) -> Option<String> {
    sessions
        .borrow()
        .as_ref()
        .filter(|s| s.id == lineage)
        .map(|s| s.access_token.clone())
}

enum PumpEnd {
    Lost,
    Cancelled,
}

/// Connect, pump frames, and reconnect for one lineage until cancelled.
async fn run_connection(
    inner: Arc<ClientInner>,
    sessions: SessionWatch,
    lineage: Uuid,
    cancel: CancellationToken,
) {
    let mut backoff = ExponentialBackoff::from_config(&inner.config);
    inner.transition(ConnectionEvent::SessionAvailable);

    loop {
        // Read on every attempt so a refreshed token is used.
        let Some(token) = access_token(&sessions, lineage) else {
            break;
        };

        let connected = tokio::select! {
            _ = cancel.cancelled() => break,
            result = inner.connector.connect(&token) => result,
        };

        match connected {
            Ok(mut stream) => {
                inner.metrics.record_opened();
                inner.transition(ConnectionEvent::Opened);
                backoff.reset();
                info!(session_id = %lineage, "Push channel connected");

                let end = inner.pump(stream.as_mut(), &cancel).await;
                stream.close().await;
                inner.metrics.record_closed();
                if matches!(end, PumpEnd::Cancelled) {
                    break;
                }
            }
            Err(e) => {
                inner.metrics.record_connect_failure();
                warn!(session_id = %lineage, error = %e, "Push connection attempt failed");
            }
        }

        inner.transition(ConnectionEvent::Lost);
        let delay = backoff.next_delay();
        inner.metrics.record_reconnect();
        debug!(
            session_id = %lineage,
            attempt = backoff.attempts(),
            delay_ms = delay.as_millis() as u64,
            "Reconnecting after delay"
        );
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        inner.transition(ConnectionEvent::BackoffElapsed);
    }

    inner.transition(ConnectionEvent::SessionCleared);
    debug!(session_id = %lineage, "Push connection task finished");
}

impl ClientInner {
    fn transition(&self, event: ConnectionEvent) {
        self.state.send_if_modified(|state| {
            let next = state.on(event);
            if next == *state {
                return false;
            }
            debug!(from = %state, to = %next, "Connection state changed");
            *state = next;
            true
        });
    }

    async fn pump(&self, stream: &mut dyn PushStream, cancel: &CancellationToken) -> PumpEnd {
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => return PumpEnd::Cancelled,
                frame = stream.next_frame() => frame,
            };
            match frame {
                None => {
                    info!("Push connection closed by server");
                    return PumpEnd::Lost;
                }
                Some(Ok(text)) => self.handle_frame(&text),
                Some(Err(e)) if e.kind == ErrorKind::MalformedFrame => {
                    self.metrics.record_frame();
                    self.metrics.record_malformed();
                    warn!(error = %e, "Dropping malformed push frame");
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Push connection lost");
                    return PumpEnd::Lost;
                }
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        self.metrics.record_frame();
        let dispatch = match Frame::parse(text).and_then(Frame::into_dispatch) {
            Ok(dispatch) => dispatch,
            Err(e) => {
                self.metrics.record_malformed();
                warn!(error = %e, "Dropping malformed push frame");
                return;
            }
        };

        if self.dispatcher.publish(&dispatch.topic, &dispatch.payload) > 0 {
            self.metrics.record_dispatched();
        } else {
            debug!(topic = %dispatch.topic, "No subscriber handled push frame");
        }
    }
}
