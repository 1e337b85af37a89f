//! The Auth Gateway: every outbound API call passes through here.
//!
//! 1. Attach the current access credential.
//! 2. On 401, join or start the single-flight refresh, then re-issue the
//!    call exactly once with the new credential.
//! 3. A refresh failure clears the session, resolves every waiter with
//!    `Unauthenticated`, and broadcasts [`AuthEvent::LoggedOut`].
//! 4. 5xx responses trigger one user notification and are returned as
//!    `ServerError`; they are never retried.

pub mod events;
pub mod refresh;
pub mod status;

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use futures::FutureExt;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use issuetrack_core::config::{ApiConfig, AuthConfig, MAX_REFRESH_SKEW_SECONDS, RefreshRotation};
use issuetrack_core::error::AppError;
use issuetrack_core::result::AppResult;
use issuetrack_core::traits::notifier::{Notification, Notifier};
use issuetrack_core::traits::transport::HttpTransport;
use issuetrack_core::types::http::{ApiRequest, HttpRequest, HttpResponse};

use crate::session::{Session, SessionStore};
use crate::token::TokenClient;

pub use self::events::{AuthEvent, LogoutReason};
use self::refresh::{RefreshCoordinator, RefreshOutcome};

/// Capacity of the auth event channel. Slow subscribers lose old events.
const EVENT_BUFFER: usize = 32;

/// Shared gateway state.
#[derive(Debug)]
struct GatewayInner {
    api: ApiConfig,
    auth: AuthConfig,
    store: Arc<SessionStore>,
    tokens: TokenClient,
    transport: Arc<dyn HttpTransport>,
    notifier: Arc<dyn Notifier>,
    refresh: RefreshCoordinator,
    events: broadcast::Sender<AuthEvent>,
}

/// Credential-attaching, self-refreshing front door to the REST API.
///
/// Cheap to clone; all clones share one session store and one refresh slot.
#[derive(Debug, Clone)]
pub struct AuthGateway {
    inner: Arc<GatewayInner>,
}

impl AuthGateway {
    /// Creates a gateway.
    pub fn new(
        api: ApiConfig,
        auth: AuthConfig,
        store: Arc<SessionStore>,
        transport: Arc<dyn HttpTransport>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let tokens = TokenClient::new(&api, &auth, transport.clone());
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inner: Arc::new(GatewayInner {
                api,
                auth,
                store,
                tokens,
                transport,
                notifier,
                refresh: RefreshCoordinator::new(),
                events,
            }),
        }
    }

    /// Issue a logical request.
    ///
    /// Returns the response for any 2xx status. Every other outcome is an
    /// error whose kind tells the caller what happened.
    pub async fn request(&self, request: ApiRequest) -> AppResult<HttpResponse> {
        let session = self.session_for(&request).await?;
        let response = self.send(&request, session.as_deref()).await?;

        let Some(used) = session else {
            return self.finish(&request, response);
        };
        if response.status != 401 {
            return self.finish(&request, response);
        }

        debug!(method = %request.method, path = %request.path, "Access credential rejected");
        let fresh = self.credential_after_rejection(&used).await?;
        let retried = self.send(&request, Some(&fresh)).await?;
        if retried.status == 401 {
            warn!(
                method = %request.method,
                path = %request.path,
                "Credential rejected again after refresh"
            );
            return Err(AppError::unauthorized(format!(
                "{} {} rejected the refreshed credential",
                request.method, request.path
            )));
        }
        self.finish(&request, retried)
    }

    /// The current session snapshot.
    pub fn current_session(&self) -> Option<Arc<Session>> {
        self.inner.store.get()
    }

    /// The session store this gateway reads credentials from.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.inner.store
    }

    /// The token endpoint client.
    pub fn tokens(&self) -> &TokenClient {
        &self.inner.tokens
    }

    /// The user notification sink.
    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.inner.notifier
    }

    /// Follow session lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    /// Total refresh exchanges started by this gateway.
    pub fn refresh_count(&self) -> u64 {
        self.inner.refresh.started()
    }

    /// Broadcast an auth event. Having no subscribers is not an error.
    pub fn emit(&self, event: AuthEvent) {
        let _ = self.inner.events.send(event);
    }

    /// Resolve which session (if any) the call goes out with, refreshing
    /// ahead of time when the credential is about to expire.
    async fn session_for(&self, request: &ApiRequest) -> AppResult<Option<Arc<Session>>> {
        let Some(session) = self.inner.store.get() else {
            if request.requires_auth {
                return Err(AppError::unauthenticated(format!(
                    "{} {} requires a session",
                    request.method, request.path
                )));
            }
            return Ok(None);
        };

        let skew_seconds = self.inner.auth.refresh_skew_seconds.min(MAX_REFRESH_SKEW_SECONDS);
        let skew = ChronoDuration::seconds(i64::try_from(skew_seconds).unwrap_or_default());
        if session.expires_within(Utc::now(), skew) {
            debug!(
                session_id = %session.id,
                "Access credential about to expire, refreshing first"
            );
            return self.refresh(&session).await.map(Some);
        }
        Ok(Some(session))
    }

    /// Obtain a credential to retry with after `used` was rejected.
    async fn credential_after_rejection(&self, used: &Session) -> AppResult<Arc<Session>> {
        match self.inner.store.get() {
            None => Err(AppError::unauthenticated("Session ended while the call was in flight")),
            // Someone else already refreshed (or logged in again).
            Some(current) if current.access_token != used.access_token => Ok(current),
            Some(current) => self.refresh(&current).await,
        }
    }

    /// Join or start the single-flight refresh for `session`.
    async fn refresh(&self, session: &Arc<Session>) -> AppResult<Arc<Session>> {
        let inner = self.inner.clone();
        let stale = session.clone();
        let store = &self.inner.store;
        let (outcome, started) = self.inner.refresh.join_or_start(
            session,
            || store.get(),
            move |generation| run_refresh(inner, stale, generation).boxed(),
        );
        if started {
            debug!(session_id = %session.id, "Started credential refresh");
        }

        match outcome.await {
            RefreshOutcome::Refreshed(session) => Ok(session),
            RefreshOutcome::Failed(err) => Err(err),
        }
    }

    async fn send(
        &self,
        request: &ApiRequest,
        session: Option<&Session>,
    ) -> AppResult<HttpResponse> {
        let mut http = HttpRequest::new(request.method, self.inner.api.url_for(&request.path))
            .with_header("Accept", "application/json");
        http.query = request.query.clone();
        if let Some(body) = &request.body {
            http = http
                .with_header("Content-Type", "application/json")
                .with_body(body.clone());
        }
        if let Some(session) = session {
            http = http.with_header("Authorization", format!("Bearer {}", session.access_token));
        }
        self.inner.transport.send(http).await
    }

    fn finish(&self, request: &ApiRequest, response: HttpResponse) -> AppResult<HttpResponse> {
        if response.is_success() {
            return Ok(response);
        }
        let err = status::error_for_status(request.method, &request.path, &response);
        if response.status >= 500 {
            warn!(
                method = %request.method,
                path = %request.path,
                status = response.status,
                "Server error"
            );
            self.inner
                .notifier
                .notify(Notification::error("Server error. Please try again later."));
        }
        Err(err)
    }
}

/// The body of one refresh exchange. Runs on its own task.
async fn run_refresh(
    inner: Arc<GatewayInner>,
    session: Arc<Session>,
    generation: u64,
) -> RefreshOutcome {
    info!(session_id = %session.id, generation, "Refreshing access credential");

    let outcome = match inner.tokens.refresh_grant(&session.refresh_token).await {
        Ok(tokens) => {
            let refresh_token = match inner.auth.refresh_rotation {
                RefreshRotation::Accept => tokens
                    .refresh_token
                    .clone()
                    .unwrap_or_else(|| session.refresh_token.clone()),
                RefreshRotation::Keep => session.refresh_token.clone(),
            };
            let next = session.refreshed(tokens.access_token, refresh_token, tokens.expires_in);
            match inner.store.replace_current(next).await {
                Some(current) => {
                    info!(session_id = %current.id, "Access credential refreshed");
                    let _ = inner.events.send(AuthEvent::Refreshed {
                        session_id: current.id,
                    });
                    RefreshOutcome::Refreshed(current)
                }
                None => RefreshOutcome::Failed(AppError::unauthenticated(
                    "Session ended while its credential was being refreshed",
                )),
            }
        }
        Err(err) => {
            warn!(session_id = %session.id, error = %err, "Credential refresh failed, logging out");
            if inner.store.clear_lineage(session.id).await {
                let _ = inner.events.send(AuthEvent::LoggedOut {
                    session_id: session.id,
                    reason: LogoutReason::RefreshFailed,
                });
                inner
                    .notifier
                    .notify(Notification::error("Your session has expired. Please log in again."));
            }
            RefreshOutcome::Failed(AppError::unauthenticated(format!(
                "Logged out: {}",
                err.message
            )))
        }
    };

    inner.refresh.finish(generation);
    outcome
}
