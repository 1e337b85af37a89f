//! The Session Store: sole owner of the current session.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use issuetrack_core::result::AppResult;

use super::model::Session;
use super::persistence::{PersistedCredentials, SessionPersistence};

/// Holds at most one live [`Session`] and mirrors it to durable storage.
///
/// Every mutation replaces the whole value. Readers get an
/// `Arc<Session>` snapshot, and observers (the realtime client) follow
/// changes through [`SessionStore::subscribe`].
///
/// Mutations are serialized: the in-memory swap and the matching write to
/// storage happen under one lock, so storage always ends up mirroring the
/// last mutation to take effect.
#[derive(Debug)]
pub struct SessionStore {
    /// Current session, broadcast to observers on every change.
    current: watch::Sender<Option<Arc<Session>>>,
    /// Durable mirror of the credentials.
    persistence: Box<dyn SessionPersistence>,
    /// Held across a swap and its persistence write.
    writes: Mutex<()>,
}

impl SessionStore {
    /// Creates an empty store backed by `persistence`.
    pub fn new(persistence: Box<dyn SessionPersistence>) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            current,
            persistence,
            writes: Mutex::new(()),
        }
    }

    /// Rebuild the session from persisted credentials.
    ///
    /// Called by the composition root before the first request. The
    /// restored session gets a new lineage ID and no known expiry.
    pub async fn rehydrate(&self) -> AppResult<Option<Arc<Session>>> {
        let _writes = self.writes.lock().await;
        let Some(credentials) = self.persistence.load().await? else {
            debug!("No persisted session to restore");
            return Ok(None);
        };
        let session = Arc::new(Session::new(
            credentials.access_token,
            credentials.refresh_token,
            None,
        ));
        self.current.send_replace(Some(session.clone()));
        info!(session_id = %session.id, "Session restored from storage");
        Ok(Some(session))
    }

    /// The current session snapshot.
    pub fn get(&self) -> Option<Arc<Session>> {
        self.current.borrow().clone()
    }

    /// Whether a session is live.
    pub fn is_authenticated(&self) -> bool {
        self.current.borrow().is_some()
    }

    /// Replace the session unconditionally.
    pub async fn set(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        let _writes = self.writes.lock().await;
        self.current.send_replace(Some(session.clone()));
        self.persist(&session).await;
        debug!(session_id = %session.id, "Session set");
        session
    }

    /// Replace the session only if the current one belongs to the same
    /// lineage as `next`.
    ///
    /// Used by the refresh path so that a refresh finishing after a logout
    /// (or after a different login) cannot resurrect a dead session.
    pub async fn replace_current(&self, next: Session) -> Option<Arc<Session>> {
        let next = Arc::new(next);
        let _writes = self.writes.lock().await;
        let swapped = self.current.send_if_modified(|current| {
            let same_lineage = current.as_ref().is_some_and(|s| s.id == next.id);
            if same_lineage {
                *current = Some(next.clone());
            }
            same_lineage
        });

        if swapped {
            self.persist(&next).await;
            Some(next)
        } else {
            debug!(
                session_id = %next.id,
                "Discarding replacement for a session that is no longer live"
            );
            None
        }
    }

    /// Destroy the session and its persisted credentials. Returns whether a
    /// session was live.
    pub async fn clear(&self) -> bool {
        let _writes = self.writes.lock().await;
        let previous = self.current.send_replace(None);
        if let Err(e) = self.persistence.clear().await {
            warn!(error = %e, "Failed to remove persisted session");
        }
        if let Some(session) = &previous {
            info!(session_id = %session.id, "Session cleared");
        }
        previous.is_some()
    }

    /// Destroy the session only if it still belongs to lineage `id`.
    ///
    /// Used when a refresh fails, so the failure cannot log out a session
    /// created by a login that happened in the meantime.
    pub async fn clear_lineage(&self, id: uuid::Uuid) -> bool {
        let _writes = self.writes.lock().await;
        let cleared = self
            .current
            .send_if_modified(|current| match current {
                Some(session) if session.id == id => {
                    *current = None;
                    true
                }
                _ => false,
            });
        if cleared {
            if let Err(e) = self.persistence.clear().await {
                warn!(error = %e, "Failed to remove persisted session");
            }
            info!(session_id = %id, "Session cleared");
        }
        cleared
    }

    /// Follow session changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Session>>> {
        self.current.subscribe()
    }

    async fn persist(&self, session: &Session) {
        let credentials = PersistedCredentials {
            access_token: session.access_token.clone(),
            refresh_token: session.refresh_token.clone(),
        };
        if let Err(e) = self.persistence.save(&credentials).await {
            warn!(session_id = %session.id, error = %e, "Failed to persist session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::session::persistence::{FileSessionPersistence, MemorySessionPersistence};

    /// Memory backend whose writes take a while to land.
    #[derive(Debug)]
    struct SlowSave {
        inner: Arc<MemorySessionPersistence>,
        delay: Duration,
    }

    #[async_trait]
    impl SessionPersistence for SlowSave {
        async fn load(&self) -> AppResult<Option<PersistedCredentials>> {
            self.inner.load().await
        }

        async fn save(&self, credentials: &PersistedCredentials) -> AppResult<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.save(credentials).await
        }

        async fn clear(&self) -> AppResult<()> {
            self.inner.clear().await
        }
    }

    fn memory_store() -> SessionStore {
        SessionStore::new(Box::new(MemorySessionPersistence::default()))
    }

    #[tokio::test]
    async fn test_set_get_clear() {
        let store = memory_store();
        assert!(store.get().is_none());

        let session = store.set(Session::new("A1", "R1", None)).await;
        assert_eq!(store.get().unwrap().access_token, "A1");
        assert_eq!(store.get().unwrap().id, session.id);

        assert!(store.clear().await);
        assert!(store.get().is_none());
        assert!(!store.clear().await);
    }

    #[tokio::test]
    async fn test_replace_current_requires_same_lineage() {
        let store = memory_store();
        let first = store.set(Session::new("A1", "R1", None)).await;

        let refreshed = first.refreshed("A2", "R1", None);
        assert!(store.replace_current(refreshed).await.is_some());
        assert_eq!(store.get().unwrap().access_token, "A2");

        // A refresh of the old lineage after a new login is ignored.
        store.set(Session::new("B1", "S1", None)).await;
        let late = first.refreshed("A3", "R1", None);
        assert!(store.replace_current(late).await.is_none());
        assert_eq!(store.get().unwrap().access_token, "B1");

        // So is one that finishes after a logout.
        store.clear().await;
        let late = first.refreshed("A4", "R1", None);
        assert!(store.replace_current(late).await.is_none());
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn test_logout_during_refresh_write_leaves_nothing_on_disk() {
        let backend = Arc::new(MemorySessionPersistence::default());
        let store = Arc::new(SessionStore::new(Box::new(SlowSave {
            inner: backend.clone(),
            delay: Duration::from_millis(100),
        })));
        let first = store.set(Session::new("A1", "R1", None)).await;

        let refreshing = tokio::spawn({
            let store = store.clone();
            let next = first.refreshed("A2", "R2", None);
            async move { store.replace_current(next).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.clear().await;
        refreshing.await.unwrap();

        assert!(store.get().is_none());
        assert_eq!(backend.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_survives_reload_and_clear_removes_traces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = SessionStore::new(Box::new(FileSessionPersistence::new(&path)));
        store.set(Session::new("A1", "R1", None)).await;
        drop(store);

        let reloaded = SessionStore::new(Box::new(FileSessionPersistence::new(&path)));
        let restored = reloaded.rehydrate().await.unwrap().unwrap();
        assert_eq!(restored.access_token, "A1");
        assert_eq!(restored.refresh_token, "R1");

        reloaded.clear().await;
        assert!(!path.exists());
        let again = SessionStore::new(Box::new(FileSessionPersistence::new(&path)));
        assert!(again.rehydrate().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_lineage_leaves_newer_login_alone() {
        let store = memory_store();
        let old = store.set(Session::new("A1", "R1", None)).await;
        let new = store.set(Session::new("B1", "S1", None)).await;

        assert!(!store.clear_lineage(old.id).await);
        assert_eq!(store.get().unwrap().id, new.id);
        assert!(store.clear_lineage(new.id).await);
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn test_subscribers_see_whole_replacements() {
        let store = memory_store();
        let mut rx = store.subscribe();

        let session = store.set(Session::new("A1", "R1", None)).await;
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_ref().unwrap().id, session.id);

        store.clear().await;
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_none());
    }
}
