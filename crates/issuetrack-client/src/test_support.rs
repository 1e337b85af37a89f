//! A signed-in client over a fake backend.

use std::sync::Arc;

use issuetrack_auth::session::MemorySessionPersistence;
use issuetrack_auth::testing::{FakeApi, RecordingNotifier, Reply};
use issuetrack_auth::Session;
use issuetrack_core::config::AppConfig;
use issuetrack_core::types::http::HttpRequest;
use issuetrack_realtime::testing::MockConnector;

use crate::client::{Client, ClientParts};

pub(crate) struct Fixture {
    pub client: Client,
    pub api: Arc<FakeApi>,
}

impl Fixture {
    /// A client already holding a valid session for `api`.
    pub async fn new(handler: impl Fn(&HttpRequest) -> Reply + Send + Sync + 'static) -> Self {
        let fixture = Self::signed_out(handler);
        let (access, refresh) = fixture.api.issue();
        fixture
            .client
            .store()
            .set(Session::new(access, refresh, None))
            .await;
        fixture
    }

    /// A client with no session.
    pub fn signed_out(handler: impl Fn(&HttpRequest) -> Reply + Send + Sync + 'static) -> Self {
        let api = Arc::new(FakeApi::new(handler));
        let client = Client::with_parts(
            AppConfig::default(),
            ClientParts {
                transport: api.clone(),
                persistence: Box::new(MemorySessionPersistence::default()),
                connector: Arc::new(MockConnector::new()),
                notifier: Arc::new(RecordingNotifier::default()),
            },
        );
        Self { client, api }
    }
}
