//! Login, restore, and logout flows.

use std::sync::Arc;

use tracing::{info, warn};

use issuetrack_core::result::AppResult;
use issuetrack_core::traits::notifier::Notification;
use issuetrack_core::types::http::ApiRequest;

use crate::gateway::{AuthEvent, AuthGateway, LogoutReason};

use super::model::{Session, UserProfile};

/// Creates and destroys sessions on behalf of the user.
///
/// The gateway keeps a session alive; the manager is the only thing that
/// starts a new lineage or ends one on request.
#[derive(Debug, Clone)]
pub struct SessionManager {
    gateway: AuthGateway,
    current_user_path: String,
}

impl SessionManager {
    /// Creates a manager that fetches the user profile from `current_user_path`.
    pub fn new(gateway: AuthGateway, current_user_path: impl Into<String>) -> Self {
        Self {
            gateway,
            current_user_path: current_user_path.into(),
        }
    }

    /// Log in with an email and password.
    ///
    /// Starts a new session lineage, replacing any existing one, then
    /// loads the user's profile through the gateway.
    pub async fn login(&self, username: &str, password: &str) -> AppResult<Arc<Session>> {
        let tokens = match self.gateway.tokens().password_grant(username, password).await {
            Ok(tokens) => tokens,
            Err(e) => {
                self.gateway
                    .notifier()
                    .notify(Notification::error("Login failed. Check your email and password."));
                return Err(e);
            }
        };

        let refresh_token = tokens.refresh_token.clone().unwrap_or_default();
        let session = self
            .gateway
            .store()
            .set(Session::new(tokens.access_token, refresh_token, tokens.expires_in))
            .await;

        let session = match self.fetch_user().await {
            Ok(user) => self.attach_user(&session, user).await,
            Err(e) => {
                // Tokens are valid but the profile is not reachable. Undo
                // the login so the caller never sees a half-built session.
                warn!(
                    session_id = %session.id,
                    error = %e,
                    "Failed to load user profile after login"
                );
                self.gateway.store().clear_lineage(session.id).await;
                return Err(e);
            }
        };

        info!(session_id = %session.id, "Logged in");
        self.gateway.emit(AuthEvent::LoggedIn {
            session_id: session.id,
        });
        self.gateway
            .notifier()
            .notify(Notification::success("Logged in successfully."));
        Ok(session)
    }

    /// Restore the session persisted by a previous run.
    ///
    /// Returns `None` if nothing was persisted. The user profile is
    /// fetched on a best-effort basis; an expired access token is
    /// refreshed along the way, and a rejected refresh token ends the
    /// restored session.
    pub async fn restore(&self) -> AppResult<Option<Arc<Session>>> {
        let Some(session) = self.gateway.store().rehydrate().await? else {
            return Ok(None);
        };

        match self.fetch_user().await {
            Ok(user) => {
                let current = self
                    .gateway
                    .store()
                    .get()
                    .filter(|s| s.id == session.id)
                    .unwrap_or(session);
                let session = self.attach_user(&current, user).await;
                self.gateway.emit(AuthEvent::LoggedIn {
                    session_id: session.id,
                });
                Ok(Some(session))
            }
            Err(e) if e.is_auth_terminal() => {
                info!(session_id = %session.id, "Restored session is no longer valid");
                Ok(None)
            }
            Err(e) => {
                warn!(
                    session_id = %session.id,
                    error = %e,
                    "Could not load user profile for restored session"
                );
                self.gateway.emit(AuthEvent::LoggedIn {
                    session_id: session.id,
                });
                Ok(self.gateway.store().get())
            }
        }
    }

    /// End the session at the user's request. Returns whether one was live.
    pub async fn logout(&self) -> bool {
        let Some(session) = self.gateway.store().get() else {
            return false;
        };
        if !self.gateway.store().clear_lineage(session.id).await {
            return false;
        }
        info!(session_id = %session.id, "Logged out");
        self.gateway.emit(AuthEvent::LoggedOut {
            session_id: session.id,
            reason: LogoutReason::UserRequested,
        });
        self.gateway
            .notifier()
            .notify(Notification::info("Logged out."));
        true
    }

    /// The authenticated user, if known.
    pub fn current_user(&self) -> Option<UserProfile> {
        self.gateway.store().get().and_then(|s| s.user.clone())
    }

    /// The gateway this manager drives.
    pub fn gateway(&self) -> &AuthGateway {
        &self.gateway
    }

    async fn fetch_user(&self) -> AppResult<UserProfile> {
        self.gateway
            .request(ApiRequest::get(self.current_user_path.as_str()))
            .await?
            .json()
    }

    /// Attach `user` to `session`, unless the lineage was replaced meanwhile.
    async fn attach_user(&self, session: &Session, user: UserProfile) -> Arc<Session> {
        self.gateway
            .store()
            .replace_current(session.with_user(user.clone()))
            .await
            .unwrap_or_else(|| Arc::new(session.with_user(user)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MemorySessionPersistence, PersistedCredentials, SessionStore};
    use crate::testing::{FakeApi, RecordingNotifier, Reply};
    use issuetrack_core::config::{ApiConfig, AuthConfig};
    use issuetrack_core::error::ErrorKind;
    use serde_json::json;

    fn profile_api() -> Arc<FakeApi> {
        Arc::new(FakeApi::new(|req| {
            if req.url.ends_with("/api/users/me/") {
                Reply::json(
                    200,
                    json!({
                        "id": 7,
                        "email": "ada@example.com",
                        "username": "ada",
                        "role": "admin"
                    }),
                )
            } else {
                Reply::empty(404)
            }
        }))
    }

    fn manager_with(api: Arc<FakeApi>, persistence: MemorySessionPersistence) -> SessionManager {
        let store = Arc::new(SessionStore::new(Box::new(persistence)));
        let gateway = AuthGateway::new(
            ApiConfig::default(),
            AuthConfig::default(),
            store,
            api,
            Arc::new(RecordingNotifier::default()),
        );
        SessionManager::new(gateway, "/api/users/me/")
    }

    #[tokio::test]
    async fn test_login_loads_profile_and_broadcasts() {
        let api = profile_api();
        let manager = manager_with(api.clone(), MemorySessionPersistence::default());
        let mut events = manager.gateway().subscribe();

        let session = manager.login("ada@example.com", "secret").await.unwrap();

        assert_eq!(session.access_token, "A1");
        let user = manager.current_user().unwrap();
        assert_eq!(user.id, 7);
        assert!(user.is_admin());
        assert_eq!(
            events.recv().await.unwrap(),
            AuthEvent::LoggedIn {
                session_id: session.id
            }
        );
    }

    #[tokio::test]
    async fn test_bad_password_leaves_no_session() {
        let api = profile_api();
        let manager = manager_with(api.clone(), MemorySessionPersistence::default());

        let err = manager.login("ada@example.com", "wrong").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthenticated);
        assert!(manager.gateway().current_session().is_none());
        assert_eq!(api.password_calls(), 1);
    }

    #[tokio::test]
    async fn test_relogin_starts_new_lineage() {
        let manager = manager_with(profile_api(), MemorySessionPersistence::default());
        let first = manager.login("ada@example.com", "secret").await.unwrap();
        let second = manager.login("ada@example.com", "secret").await.unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_logout_clears_and_broadcasts() {
        let manager = manager_with(profile_api(), MemorySessionPersistence::default());
        let session = manager.login("ada@example.com", "secret").await.unwrap();
        let mut events = manager.gateway().subscribe();

        assert!(manager.logout().await);
        assert!(manager.gateway().current_session().is_none());
        assert_eq!(
            events.recv().await.unwrap(),
            AuthEvent::LoggedOut {
                session_id: session.id,
                reason: LogoutReason::UserRequested,
            }
        );
        assert!(!manager.logout().await);
    }

    #[tokio::test]
    async fn test_restore_with_valid_credentials() {
        let api = profile_api();
        let (access, refresh) = api.issue();
        let persistence = MemorySessionPersistence::with_credentials(PersistedCredentials {
            access_token: access,
            refresh_token: refresh,
        });
        let manager = manager_with(api, persistence);

        let session = manager.restore().await.unwrap().unwrap();
        assert_eq!(session.user.as_ref().unwrap().username, "ada");
        assert_eq!(api_refreshes(&manager), 0);
    }

    #[tokio::test]
    async fn test_restore_refreshes_expired_access() {
        let api = profile_api();
        let (_, refresh) = api.issue();
        let persistence = MemorySessionPersistence::with_credentials(PersistedCredentials {
            access_token: "stale".to_string(),
            refresh_token: refresh,
        });
        let manager = manager_with(api.clone(), persistence);

        let session = manager.restore().await.unwrap().unwrap();
        assert_eq!(session.access_token, api.current_access());
        assert!(session.user.is_some());
        assert_eq!(api.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn test_restore_with_dead_refresh_is_logged_out() {
        let api = profile_api();
        api.issue();
        api.reject_refresh();
        let persistence = MemorySessionPersistence::with_credentials(PersistedCredentials {
            access_token: "stale".to_string(),
            refresh_token: "R1".to_string(),
        });
        let manager = manager_with(api, persistence);

        assert!(manager.restore().await.unwrap().is_none());
        assert!(manager.gateway().current_session().is_none());
    }

    #[tokio::test]
    async fn test_restore_without_persisted_session() {
        let manager = manager_with(profile_api(), MemorySessionPersistence::default());
        assert!(manager.restore().await.unwrap().is_none());
    }

    fn api_refreshes(manager: &SessionManager) -> u64 {
        manager.gateway().refresh_count()
    }
}
