//! The composition root.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use issuetrack_auth::session::persistence;
use issuetrack_auth::{
    AuthEvent, AuthGateway, ReqwestTransport, Session, SessionManager, SessionPersistence,
    SessionStore, UserProfile,
};
use issuetrack_cache::{CacheInvalidator, QueryCache};
use issuetrack_core::config::AppConfig;
use issuetrack_core::events::RESOURCE_CHANGED;
use issuetrack_core::result::AppResult;
use issuetrack_core::traits::notifier::{Notifier, TracingNotifier};
use issuetrack_core::traits::transport::HttpTransport;
use issuetrack_realtime::{
    ChangeNotifications, EventDispatcher, PushConnector, RealtimeClient, Subscription,
    TungsteniteConnector,
};

use crate::api::{AnalyticsApi, IssuesApi, UsersApi};
use crate::fetcher::ApiFetcher;

/// The network-facing pieces of a [`Client`].
pub struct ClientParts {
    /// Carries every REST call, token exchanges included.
    pub transport: Arc<dyn HttpTransport>,
    /// Keeps the session across restarts.
    pub persistence: Box<dyn SessionPersistence>,
    /// Opens the push channel.
    pub connector: Arc<dyn PushConnector>,
    /// Receives user-facing messages.
    pub notifier: Arc<dyn Notifier>,
}

impl ClientParts {
    /// Production parts: reqwest, the configured session storage, and
    /// tokio-tungstenite.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        Ok(Self {
            transport: Arc::new(ReqwestTransport::new(&config.api)?),
            persistence: persistence::from_config(&config.session),
            connector: Arc::new(TungsteniteConnector::new(&config.realtime)),
            notifier: Arc::new(TracingNotifier),
        })
    }
}

/// Owns every client component and wires them together.
///
/// One session store feeds the gateway and the realtime client. Push
/// events reach the cache invalidator and the change notifier through
/// one dispatcher. The cache is emptied whenever the signed-in identity
/// changes.
pub struct Client {
    config: AppConfig,
    store: Arc<SessionStore>,
    gateway: AuthGateway,
    sessions: SessionManager,
    cache: QueryCache,
    invalidator: CacheInvalidator,
    dispatcher: EventDispatcher,
    realtime: RealtimeClient,
    _invalidation: Subscription,
    _notifications: ChangeNotifications,
    auth_listener: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.config.api.base_url)
            .field("authenticated", &self.store.is_authenticated())
            .field("realtime", &self.realtime.state())
            .finish()
    }
}

impl Client {
    /// Build a client with production parts.
    pub fn from_config(config: AppConfig) -> AppResult<Self> {
        let parts = ClientParts::from_config(&config)?;
        Ok(Self::with_parts(config, parts))
    }

    /// Build a client around explicit parts.
    pub fn with_parts(config: AppConfig, parts: ClientParts) -> Self {
        let store = Arc::new(SessionStore::new(parts.persistence));
        let gateway = AuthGateway::new(
            config.api.clone(),
            config.auth.clone(),
            store.clone(),
            parts.transport,
            parts.notifier.clone(),
        );
        let sessions = SessionManager::new(gateway.clone(), config.auth.current_user_path.clone());

        let fetcher = Arc::new(ApiFetcher::new(
            gateway.clone(),
            config.auth.current_user_path.clone(),
        ));
        let cache = QueryCache::new(&config.cache, fetcher);
        let invalidator = CacheInvalidator::new(cache.clone(), &config.cache);

        let dispatcher = EventDispatcher::new();
        let handler = invalidator.clone();
        let invalidate = move |payload: &Value| -> AppResult<()> {
            handler.handle_payload(payload).map(|_| ())
        };
        let invalidation = dispatcher.subscribe(RESOURCE_CHANGED, invalidate);
        let notifications = ChangeNotifications::attach(&dispatcher, parts.notifier);

        let realtime =
            RealtimeClient::new(config.realtime.clone(), parts.connector, dispatcher.clone());

        Self {
            config,
            store,
            gateway,
            sessions,
            cache,
            invalidator,
            dispatcher,
            realtime,
            _invalidation: invalidation,
            _notifications: notifications,
            auth_listener: Mutex::new(None),
        }
    }

    /// Start background work: the push channel and the listener that
    /// drops cached data when the session ends on its own (a failed
    /// refresh). Idempotent.
    pub fn start(&self) {
        self.realtime.start(&self.store);

        let Ok(mut listener) = self.auth_listener.lock() else {
            return;
        };
        if listener.is_some() {
            return;
        }
        let mut events = self.gateway.subscribe();
        let cache = self.cache.clone();
        *listener = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(AuthEvent::LoggedOut { session_id, reason }) => {
                        info!(%session_id, %reason, "Logged out, clearing query cache");
                        cache.clear();
                    }
                    // Login clears the cache itself.
                    Ok(AuthEvent::LoggedIn { .. } | AuthEvent::Refreshed { .. }) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Auth events lagged, clearing query cache");
                        cache.clear();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }

    /// Stop background work. The session is kept.
    pub async fn shutdown(&self) {
        self.realtime.stop().await;
        let listener = self.auth_listener.lock().ok().and_then(|mut l| l.take());
        if let Some(listener) = listener {
            listener.abort();
        }
    }

    /// Restore the persisted session, if any.
    pub async fn restore(&self) -> AppResult<Option<Arc<Session>>> {
        self.sessions.restore().await
    }

    /// Log in, replacing any current session.
    pub async fn login(&self, username: &str, password: &str) -> AppResult<Arc<Session>> {
        let session = self.sessions.login(username, password).await?;
        self.cache.clear();
        Ok(session)
    }

    /// Log out. Returns whether a session was live.
    pub async fn logout(&self) -> bool {
        let was_live = self.sessions.logout().await;
        self.cache.clear();
        was_live
    }

    /// The signed-in user, if known.
    pub fn current_user(&self) -> Option<UserProfile> {
        self.sessions.current_user()
    }

    /// Wait until a session is live, re-reading storage every `poll` for
    /// one saved by another process (for example `issuetrack login`).
    pub async fn wait_for_session(&self, poll: Duration) -> Arc<Session> {
        let mut ticker = tokio::time::interval(poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Some(session) = self.store.get() {
                return session;
            }
            match self.restore().await {
                Ok(Some(session)) => return session,
                Ok(None) => debug!("No saved session yet"),
                Err(e) => warn!(error = %e, "Failed to read saved session"),
            }
        }
    }

    /// Resolves once no session is live.
    pub async fn session_ended(&self) {
        let mut changes = self.store.subscribe();
        let _ = changes.wait_for(Option::is_none).await;
    }

    /// Issue endpoints.
    pub fn issues(&self) -> IssuesApi {
        IssuesApi::new(self.gateway.clone(), self.cache.clone(), self.invalidator.clone())
    }

    /// User endpoints.
    pub fn users(&self) -> UsersApi {
        UsersApi::new(self.gateway.clone(), self.cache.clone(), self.invalidator.clone())
    }

    /// Dashboard endpoints.
    pub fn analytics(&self) -> AnalyticsApi {
        AnalyticsApi::new(self.cache.clone())
    }

    /// The configuration this client was built from.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The session store.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// The auth gateway every REST call goes through.
    pub fn gateway(&self) -> &AuthGateway {
        &self.gateway
    }

    /// Login, restore and logout flows.
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// The query cache.
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Turns change events into cache invalidations.
    pub fn invalidator(&self) -> &CacheInvalidator {
        &self.invalidator
    }

    /// The dispatcher push events are published on. Subscribe here to
    /// follow them.
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// The push channel client.
    pub fn realtime(&self) -> &RealtimeClient {
        &self.realtime
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Ok(mut listener) = self.auth_listener.lock() {
            if let Some(listener) = listener.take() {
                listener.abort();
            }
        }
    }
}
