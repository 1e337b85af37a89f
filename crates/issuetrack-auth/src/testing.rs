//! In-process HTTP doubles for tests.
//!
//! [`MockTransport`] answers every request from a closure. [`FakeApi`]
//! behaves like the real backend's auth layer: it issues and rotates
//! tokens, rejects stale access tokens with 401, and routes everything
//! else to a handler.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use issuetrack_core::error::AppError;
use issuetrack_core::result::AppResult;
use issuetrack_core::traits::notifier::{Notification, Notifier};
use issuetrack_core::traits::transport::HttpTransport;
use issuetrack_core::types::http::{HttpRequest, HttpResponse};

/// Path fragment identifying token endpoint calls.
pub const TOKEN_PATH: &str = "/api/auth/token/";

/// What a double answers.
#[derive(Debug, Clone)]
pub enum Reply {
    /// An HTTP response.
    Response(HttpResponse),
    /// A connection-level failure.
    NetworkError,
    /// Another reply after a delay.
    Delayed(Duration, Box<Reply>),
}

impl Reply {
    /// JSON response.
    pub fn json(status: u16, body: Value) -> Self {
        Self::Response(HttpResponse::new(status, body))
    }

    /// Empty-bodied response.
    pub fn empty(status: u16) -> Self {
        Self::Response(HttpResponse::new(status, Value::Null))
    }

    /// This reply, delivered after `delay`.
    pub fn after(self, delay: Duration) -> Self {
        Self::Delayed(delay, Box::new(self))
    }

    async fn resolve(self) -> AppResult<HttpResponse> {
        let mut reply = self;
        loop {
            match reply {
                Self::Response(response) => return Ok(response),
                Self::NetworkError => return Err(AppError::transport("connection refused")),
                Self::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
            }
        }
    }
}

type Handler = Box<dyn Fn(&HttpRequest) -> Reply + Send + Sync>;

/// Transport answering from a closure and recording every request.
pub struct MockTransport {
    handler: Handler,
    requests: Mutex<Vec<HttpRequest>>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("requests", &self.requests().len())
            .finish()
    }
}

impl MockTransport {
    /// Create a transport answering with `handler`.
    pub fn new(handler: impl Fn(&HttpRequest) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request seen so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Number of token endpoint calls.
    pub fn token_calls(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.url.ends_with(TOKEN_PATH))
            .count()
    }

    /// Number of calls whose URL contains `fragment`, token calls excluded.
    pub fn calls_to(&self, fragment: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| !r.url.ends_with(TOKEN_PATH) && r.url.contains(fragment))
            .count()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> AppResult<HttpResponse> {
        let reply = (self.handler)(&request);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        reply.resolve().await
    }
}

struct Tokens {
    access: String,
    refresh: String,
    issued: usize,
}

/// A stand-in for the backend's OAuth2 layer.
///
/// The password grant accepts any username with password `"secret"`.
/// Access tokens are named `A1`, `A2`, ... and refresh tokens `R1`,
/// `R2`, ...; only the most recent access token is accepted.
pub struct FakeApi {
    tokens: Mutex<Tokens>,
    rotate: AtomicBool,
    refresh_rejected: AtomicBool,
    refresh_delay: Mutex<Duration>,
    expires_in: Mutex<Option<u64>>,
    refresh_calls: AtomicUsize,
    password_calls: AtomicUsize,
    handler: Handler,
    requests: Mutex<Vec<HttpRequest>>,
}

impl std::fmt::Debug for FakeApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeApi")
            .field("refresh_calls", &self.refresh_calls())
            .finish()
    }
}

impl FakeApi {
    /// Create a backend routing authorised non-token calls to `handler`.
    pub fn new(handler: impl Fn(&HttpRequest) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            tokens: Mutex::new(Tokens {
                access: String::new(),
                refresh: String::new(),
                issued: 0,
            }),
            rotate: AtomicBool::new(false),
            refresh_rejected: AtomicBool::new(false),
            refresh_delay: Mutex::new(Duration::ZERO),
            expires_in: Mutex::new(None),
            refresh_calls: AtomicUsize::new(0),
            password_calls: AtomicUsize::new(0),
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Rotate the refresh token on every refresh grant.
    pub fn rotating(self) -> Self {
        self.rotate.store(true, Ordering::SeqCst);
        self
    }

    /// Delay refresh responses, widening the concurrent-expiry window.
    pub fn with_refresh_delay(self, delay: Duration) -> Self {
        if let Ok(mut d) = self.refresh_delay.lock() {
            *d = delay;
        }
        self
    }

    /// Report `expires_in` on issued tokens.
    pub fn with_expires_in(self, seconds: u64) -> Self {
        if let Ok(mut e) = self.expires_in.lock() {
            *e = Some(seconds);
        }
        self
    }

    /// Pre-issue a token pair, as if a login happened before the test.
    pub fn issue(&self) -> (String, String) {
        let mut tokens = self.lock_tokens();
        tokens.issued += 1;
        tokens.access = format!("A{}", tokens.issued);
        tokens.refresh = format!("R{}", tokens.issued);
        (tokens.access.clone(), tokens.refresh.clone())
    }

    /// Invalidate the current access token server-side.
    pub fn expire_access(&self) {
        self.lock_tokens().access = "<expired>".to_string();
    }

    /// Make every subsequent refresh grant fail with `invalid_grant`.
    pub fn reject_refresh(&self) {
        self.refresh_rejected.store(true, Ordering::SeqCst);
    }

    /// The access token the backend currently accepts.
    pub fn current_access(&self) -> String {
        self.lock_tokens().access.clone()
    }

    /// The refresh token the backend currently accepts.
    pub fn current_refresh(&self) -> String {
        self.lock_tokens().refresh.clone()
    }

    /// Number of refresh grants received.
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Number of password grants received.
    pub fn password_calls(&self) -> usize {
        self.password_calls.load(Ordering::SeqCst)
    }

    /// Non-token requests whose URL contains `fragment`.
    pub fn calls_to(&self, fragment: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| !r.url.ends_with(TOKEN_PATH) && r.url.contains(fragment))
            .count()
    }

    /// Every request seen so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn lock_tokens(&self) -> std::sync::MutexGuard<'_, Tokens> {
        match self.tokens.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn token_body(&self, access: &str, refresh: Option<&str>) -> Value {
        let mut body = json!({"access_token": access, "token_type": "Bearer"});
        if let Some(refresh) = refresh {
            body["refresh_token"] = json!(refresh);
        }
        if let Some(expires_in) = self.expires_in.lock().ok().and_then(|e| *e) {
            body["expires_in"] = json!(expires_in);
        }
        body
    }

    fn token_endpoint(&self, request: &HttpRequest) -> Reply {
        let body = request.body.clone().unwrap_or(Value::Null);
        match body["grant_type"].as_str() {
            Some("password") => {
                self.password_calls.fetch_add(1, Ordering::SeqCst);
                if body["password"] != "secret" {
                    return Reply::json(400, json!({"error": "invalid_grant"}));
                }
                let (access, refresh) = self.issue();
                Reply::json(200, self.token_body(&access, Some(&refresh)))
            }
            Some("refresh_token") => {
                self.refresh_calls.fetch_add(1, Ordering::SeqCst);
                let delay = self.refresh_delay.lock().map(|d| *d).unwrap_or_default();
                let mut tokens = self.lock_tokens();
                if self.refresh_rejected.load(Ordering::SeqCst)
                    || body["refresh_token"].as_str() != Some(tokens.refresh.as_str())
                {
                    return Reply::json(400, json!({"error": "invalid_grant"})).after(delay);
                }
                tokens.issued += 1;
                tokens.access = format!("A{}", tokens.issued);
                let rotated = if self.rotate.load(Ordering::SeqCst) {
                    tokens.refresh = format!("R{}", tokens.issued);
                    Some(tokens.refresh.clone())
                } else {
                    None
                };
                let access = tokens.access.clone();
                drop(tokens);
                Reply::json(200, self.token_body(&access, rotated.as_deref())).after(delay)
            }
            _ => Reply::json(400, json!({"error": "unsupported_grant_type"})),
        }
    }
}

#[async_trait]
impl HttpTransport for FakeApi {
    async fn send(&self, request: HttpRequest) -> AppResult<HttpResponse> {
        let reply = if request.url.ends_with(TOKEN_PATH) {
            self.token_endpoint(&request)
        } else {
            let current = self.current_access();
            match request.bearer_token() {
                Some(token) if token == current => (self.handler)(&request),
                _ => Reply::json(
                    401,
                    json!({"detail": "Authentication credentials were not provided."}),
                ),
            }
        };
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        reply.resolve().await
    }
}

/// Notifier that keeps every notification for later assertions.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    /// Notifications received so far.
    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(notification);
        }
    }
}
