//! Cache reads over the REST API.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use issuetrack_auth::AuthGateway;
use issuetrack_cache::keys::{ANALYTICS, ISSUE, USER};
use issuetrack_core::error::AppError;
use issuetrack_core::result::AppResult;
use issuetrack_core::traits::fetcher::QueryFetcher;
use issuetrack_core::types::QueryKey;
use issuetrack_core::types::http::ApiRequest;

use crate::api::paths;

/// Loads cached queries with GET requests through the auth gateway.
#[derive(Debug, Clone)]
pub struct ApiFetcher {
    gateway: AuthGateway,
    current_user_path: String,
}

impl ApiFetcher {
    /// A fetcher issuing GETs through `gateway`. The current user's
    /// profile is read from `current_user_path`.
    pub fn new(gateway: AuthGateway, current_user_path: impl Into<String>) -> Self {
        Self {
            gateway,
            current_user_path: current_user_path.into(),
        }
    }

    /// The GET request that loads `key`.
    pub fn request_for(&self, key: &QueryKey) -> AppResult<ApiRequest> {
        let id = key.id.as_ref();
        let path = match (key.kind.as_str(), key.view.as_str(), id) {
            (ISSUE, "list", None) => paths::ISSUES.to_string(),
            (ISSUE, "detail", Some(id)) => paths::issue(id),
            (ISSUE, "comments", Some(id)) => paths::issue_comments(id),
            (USER, "list", None) => paths::USERS.to_string(),
            (USER, "detail", Some(id)) => paths::user(id),
            (USER, "me", None) => self.current_user_path.clone(),
            (ANALYTICS, "dashboard", None) => paths::DASHBOARD.to_string(),
            (ANALYTICS, "daily", None) => paths::DAILY_STATS.to_string(),
            _ => return Err(AppError::internal(format!("No endpoint serves query {key}"))),
        };
        Ok(key
            .params
            .iter()
            .fold(ApiRequest::get(path), |request, (name, value)| {
                request.with_query(name.as_str(), value.as_str())
            }))
    }
}

#[async_trait]
impl QueryFetcher for ApiFetcher {
    async fn fetch(&self, key: &QueryKey) -> AppResult<Value> {
        let request = self.request_for(key)?;
        debug!(key = %key, path = %request.path, "Fetching query");
        Ok(self.gateway.request(request).await?.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;
    use issuetrack_auth::testing::Reply;
    use issuetrack_cache::keys;
    use issuetrack_core::error::ErrorKind;
    use issuetrack_core::types::http::Method;

    fn fetcher() -> ApiFetcher {
        let fixture = Fixture::signed_out(|_| Reply::empty(404));
        ApiFetcher::new(fixture.client.gateway().clone(), "/api/users/me/")
    }

    #[test]
    fn test_routes() {
        let fetcher = fetcher();
        let cases = [
            (keys::issue_list([("status", "open")]), "/api/issues/"),
            (keys::issue(7u64), "/api/issues/7/"),
            (keys::issue_comments(7u64), "/api/issues/7/comments/"),
            (keys::user_list(), "/api/users/"),
            (keys::user(2u64), "/api/users/2/"),
            (keys::current_user(), "/api/users/me/"),
            (keys::dashboard(), "/api/analytics/dashboard/"),
            (keys::daily_stats(30), "/api/analytics/daily-stats/"),
        ];
        for (key, path) in cases {
            let request = fetcher.request_for(&key).unwrap();
            assert_eq!(request.method, Method::Get);
            assert_eq!(request.path, path, "{key}");
            assert!(request.requires_auth);
        }

        let request = fetcher.request_for(&keys::issue_list([("status", "open")])).unwrap();
        assert_eq!(request.query, vec![("status".to_string(), "open".to_string())]);
    }

    #[test]
    fn test_unknown_query_is_internal_error() {
        let err = fetcher()
            .request_for(&QueryKey::view("issue", "timeline", None))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
    }
}
