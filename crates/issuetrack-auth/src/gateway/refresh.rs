//! Single-flight credential refresh.
//!
//! A [`RefreshOperation`] is the one outstanding refresh for a session
//! lineage. Callers that hit an expired credential while it is running
//! clone its shared outcome instead of starting their own exchange. The
//! exchange runs on its own task, so it finishes even if every waiter is
//! dropped, and nothing queued behind it is left unresolved.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::debug;
use uuid::Uuid;

use issuetrack_core::error::AppError;

use crate::session::Session;

/// Result shared by every caller that joined one refresh.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// New credentials are in the store; retry now.
    Refreshed(Arc<Session>),
    /// The session is gone; the caller must surface this error.
    Failed(AppError),
}

/// Handle to the shared outcome of a refresh.
pub type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// The in-flight refresh for one session lineage.
#[derive(Debug)]
pub struct RefreshOperation {
    /// Lineage being refreshed.
    pub session_id: Uuid,
    /// Monotonic operation number.
    pub generation: u64,
    outcome: SharedRefresh,
}

/// Owns the at-most-one [`RefreshOperation`] slot.
#[derive(Debug, Default)]
pub struct RefreshCoordinator {
    inflight: Mutex<Option<RefreshOperation>>,
    started: AtomicU64,
}

impl RefreshCoordinator {
    /// Creates an idle coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the refresh running for `session`, or start one.
    ///
    /// `latest` reads the store's current session. It is consulted under
    /// the slot lock when nothing is in flight: if the credential in
    /// `session` has already been replaced, the current session is
    /// returned as-is and no exchange starts. A refresh releases the slot
    /// only after writing its result to the store, so this check cannot
    /// miss one that just finished.
    ///
    /// `start` receives the new operation's generation and must return the
    /// exchange future. The future is spawned immediately. Returns the
    /// shared outcome and whether this call started the operation.
    pub fn join_or_start<L, F>(
        &self,
        session: &Session,
        latest: L,
        start: F,
    ) -> (SharedRefresh, bool)
    where
        L: FnOnce() -> Option<Arc<Session>>,
        F: FnOnce(u64) -> BoxFuture<'static, RefreshOutcome>,
    {
        let mut slot = match self.inflight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(op) = slot.as_ref() {
            if op.session_id == session.id {
                debug!(
                    session_id = %session.id,
                    generation = op.generation,
                    "Joining in-flight refresh"
                );
                return (op.outcome.clone(), false);
            }
        }

        match latest() {
            Some(current) if current.access_token == session.access_token => {}
            Some(current) => {
                debug!(session_id = %current.id, "Credential already replaced, not refreshing");
                return (settled(RefreshOutcome::Refreshed(current)), false);
            }
            None => {
                let err = AppError::unauthenticated("Session ended before it could be refreshed");
                return (settled(RefreshOutcome::Failed(err)), false);
            }
        }

        let generation = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        let task = tokio::spawn(start(generation));
        let outcome = async move {
            task.await.unwrap_or_else(|e| {
                RefreshOutcome::Failed(AppError::internal(format!("refresh task aborted: {e}")))
            })
        }
        .boxed()
        .shared();

        *slot = Some(RefreshOperation {
            session_id: session.id,
            generation,
            outcome: outcome.clone(),
        });
        (outcome, true)
    }

    /// Release the slot held by `generation`. Called by the refresh task
    /// itself before its outcome becomes visible.
    pub fn finish(&self, generation: u64) {
        let mut slot = match self.inflight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.as_ref().is_some_and(|op| op.generation == generation) {
            *slot = None;
        }
    }

    /// Whether a refresh is in flight.
    pub fn is_refreshing(&self) -> bool {
        self.inflight.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Total refresh exchanges started.
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }
}

fn settled(outcome: RefreshOutcome) -> SharedRefresh {
    futures::future::ready(outcome).boxed().shared()
}
