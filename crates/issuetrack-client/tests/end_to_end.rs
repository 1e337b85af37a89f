//! Whole-client scenarios against a fake backend and push channel.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use issuetrack_auth::session::{
    FileSessionPersistence, MemorySessionPersistence, PersistedCredentials, SessionPersistence,
};
use issuetrack_auth::testing::{FakeApi, RecordingNotifier, Reply};
use issuetrack_cache::keys;
use issuetrack_client::api::IssueFilter;
use issuetrack_client::{Client, ClientParts};
use issuetrack_core::config::AppConfig;
use issuetrack_core::error::ErrorKind;
use issuetrack_core::traits::notifier::NotificationLevel;
use issuetrack_core::types::http::HttpRequest;
use issuetrack_realtime::ConnectionState;
use issuetrack_realtime::testing::MockConnector;

struct Harness {
    client: Client,
    api: Arc<FakeApi>,
    connector: Arc<MockConnector>,
    notifier: Arc<RecordingNotifier>,
}

fn issue(id: u64, title: &str) -> serde_json::Value {
    json!({"id": id, "title": title, "description": "", "severity": "high", "status": "open"})
}

fn route(req: &HttpRequest) -> Reply {
    let url = req.url.as_str();
    if url.ends_with("/api/users/me/") {
        Reply::json(
            200,
            json!({"id": 1, "email": "ada@example.com", "username": "ada", "role": "admin"}),
        )
    } else if url.ends_with("/api/issues/") {
        Reply::json(200, json!([issue(7, "Crash on save"), issue(8, "Typo")]))
    } else if url.ends_with("/api/issues/7/") {
        Reply::json(200, issue(7, "Crash on save"))
    } else if url.ends_with("/api/analytics/dashboard/") {
        Reply::json(200, json!({"total_issues": 2, "status_counts": [], "severity_counts": []}))
    } else {
        Reply::empty(404)
    }
}

fn harness() -> Harness {
    harness_with(Box::new(MemorySessionPersistence::default()))
}

fn harness_with(persistence: Box<dyn SessionPersistence>) -> Harness {
    let api = Arc::new(FakeApi::new(route).with_refresh_delay(Duration::from_millis(20)));
    let connector = Arc::new(MockConnector::new());
    let notifier = Arc::new(RecordingNotifier::default());

    let mut config = AppConfig::default();
    config.realtime.backoff_initial_ms = 10;
    config.realtime.backoff_max_ms = 50;

    let client = Client::with_parts(
        config,
        ClientParts {
            transport: api.clone(),
            persistence,
            connector: connector.clone(),
            notifier: notifier.clone(),
        },
    );
    Harness {
        client,
        api,
        connector,
        notifier,
    }
}

async fn wait_state(client: &Client, want: ConnectionState) {
    let mut changes = client.realtime().state_changes();
    tokio::time::timeout(Duration::from_secs(5), changes.wait_for(|s| *s == want))
        .await
        .expect("timed out waiting for connection state")
        .expect("realtime client dropped");
}

async fn eventually(mut check: impl AsyncFnMut() -> bool) {
    for _ in 0..1000 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

fn bearer_tokens(api: &FakeApi, fragment: &str) -> Vec<String> {
    api.requests()
        .iter()
        .filter(|r| r.url.ends_with(fragment))
        .filter_map(|r| r.bearer_token().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_expired_access_is_refreshed_and_retried_transparently() {
    let h = harness();
    let session = h.client.login("ada@example.com", "secret").await.unwrap();
    assert_eq!(session.access_token, "A1");

    h.api.expire_access();
    let issues = h.client.issues().list(&IssueFilter::default()).await.unwrap();

    assert_eq!(issues.len(), 2);
    assert_eq!(h.api.refresh_calls(), 1);
    assert_eq!(bearer_tokens(&h.api, "/api/issues/"), vec!["A1", "A2"]);
    assert_eq!(h.client.store().get().unwrap().access_token, "A2");
    assert_eq!(h.client.store().get().unwrap().id, session.id);
}

#[tokio::test]
async fn test_concurrent_expiry_shares_one_refresh() {
    let h = harness();
    h.client.login("ada@example.com", "secret").await.unwrap();
    h.api.expire_access();

    let issues = h.client.issues();
    let analytics = h.client.analytics();
    let users = h.client.users();
    let filter = IssueFilter::default();
    let (list, detail, dashboard, me) = tokio::join!(
        issues.list(&filter),
        issues.get(7),
        analytics.dashboard(),
        users.me(),
    );

    assert!(list.is_ok() && detail.is_ok() && dashboard.is_ok() && me.is_ok());
    assert_eq!(h.api.refresh_calls(), 1);
}

#[tokio::test]
async fn test_rejected_refresh_logs_out_and_blocks_further_calls() {
    let h = harness();
    h.client.start();
    h.client.login("ada@example.com", "secret").await.unwrap();
    h.client.analytics().dashboard().await.unwrap();

    h.api.expire_access();
    h.api.reject_refresh();
    let err = h.client.issues().get(7).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unauthenticated);
    assert!(h.client.store().get().is_none());

    let before = h.api.requests().len();
    let err = h.client.issues().get(7).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unauthenticated);
    assert_eq!(h.api.requests().len(), before);

    // The cached dashboard does not outlive the session.
    let cache = h.client.cache().clone();
    eventually(async || cache.peek(&keys::dashboard()).await.is_none()).await;
    assert!(
        h.notifier
            .notifications()
            .iter()
            .any(|n| n.level == NotificationLevel::Error)
    );
    h.client.shutdown().await;
}

#[tokio::test]
async fn test_push_event_stales_issue_views_and_next_read_refetches_once() {
    let h = harness();
    h.client.start();
    h.client.login("ada@example.com", "secret").await.unwrap();
    wait_state(&h.client, ConnectionState::Connected).await;

    let issues = h.client.issues();
    let filter = IssueFilter::default();
    issues.list(&filter).await.unwrap();
    issues.list(&filter).await.unwrap();
    assert_eq!(h.api.calls_to("/api/issues/"), 1);
    assert_eq!(h.client.cache().is_stale(&keys::issue_list([])).await, Some(false));

    assert!(h.connector.push(
        &json!({
            "type": "resource-changed",
            "data": {
                "action": "updated",
                "resourceKind": "issue",
                "resourceId": 7,
                "title": "Crash on save"
            }
        })
        .to_string()
    ));
    let cache = h.client.cache().clone();
    eventually(async || cache.is_stale(&keys::issue_list([])).await == Some(true)).await;

    issues.list(&filter).await.unwrap();
    issues.list(&filter).await.unwrap();
    assert_eq!(h.api.calls_to("/api/issues/"), 2);
    assert!(
        h.notifier
            .notifications()
            .iter()
            .any(|n| n.message == "Issue updated: Crash on save")
    );
    h.client.shutdown().await;
}

#[tokio::test]
async fn test_refresh_keeps_push_connection() {
    let h = harness();
    h.client.start();
    h.client.login("ada@example.com", "secret").await.unwrap();
    wait_state(&h.client, ConnectionState::Connected).await;

    h.api.expire_access();
    h.client.issues().get(7).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(h.connector.connects(), 1);
    assert_eq!(h.client.realtime().state(), ConnectionState::Connected);
    h.client.shutdown().await;
}

#[tokio::test]
async fn test_login_logout_cycles_leave_no_connection_behind() {
    let h = harness();
    h.client.start();
    for _ in 0..3 {
        h.client.login("ada@example.com", "secret").await.unwrap();
        wait_state(&h.client, ConnectionState::Connected).await;
        assert_eq!(h.connector.live_connections(), 1);

        assert!(h.client.logout().await);
        wait_state(&h.client, ConnectionState::Disconnected).await;
        assert_eq!(h.connector.live_connections(), 0);
    }
    assert_eq!(h.connector.connects(), 3);
    h.client.shutdown().await;
}

#[tokio::test]
async fn test_no_session_means_no_network() {
    let h = harness();
    let err = h.client.issues().list(&IssueFilter::default()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unauthenticated);
    assert!(h.api.requests().is_empty());
}

#[tokio::test]
async fn test_waiting_client_picks_up_login_saved_elsewhere() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let h = harness_with(Box::new(FileSessionPersistence::new(&path)));
    h.client.start();
    assert!(h.client.restore().await.unwrap().is_none());

    // Another process logs in and saves its credentials.
    let login_elsewhere = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let (access_token, refresh_token) = h.api.issue();
        FileSessionPersistence::new(&path)
            .save(&PersistedCredentials {
                access_token,
                refresh_token,
            })
            .await
            .unwrap();
    };
    let waiting = tokio::time::timeout(
        Duration::from_secs(5),
        h.client.wait_for_session(Duration::from_millis(10)),
    );
    let (session, ()) = tokio::join!(waiting, login_elsewhere);
    let session = session.expect("saved session was never picked up");

    assert_eq!(session.access_token, h.api.current_access());
    assert_eq!(h.client.current_user().unwrap().username, "ada");
    wait_state(&h.client, ConnectionState::Connected).await;
    h.client.shutdown().await;
}

#[tokio::test]
async fn test_session_ended_resolves_on_logout() {
    let h = harness();
    h.client.login("ada@example.com", "secret").await.unwrap();

    let ended = h.client.session_ended();
    let logout = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(h.client.logout().await);
    };
    tokio::time::timeout(Duration::from_secs(5), async { tokio::join!(ended, logout) })
        .await
        .expect("session end was not observed");
    assert!(h.client.store().get().is_none());
}
