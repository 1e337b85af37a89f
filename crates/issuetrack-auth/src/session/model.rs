//! Session and user profile types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// The authenticated user as returned by the current-user endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Server-side user ID.
    pub id: u64,
    /// Login email.
    #[serde(default)]
    pub email: String,
    /// Display username.
    #[serde(default)]
    pub username: String,
    /// `admin`, `maintainer`, or `reporter`.
    #[serde(default)]
    pub role: Option<String>,
    /// Any other profile fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    /// Whether the user has the admin role.
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some("admin")
    }
}

/// A live credential pair plus the identity it belongs to.
///
/// Sessions are immutable values. The store replaces the whole value on
/// every change, so a reader holding one never sees a half-applied refresh.
#[derive(Clone, PartialEq)]
pub struct Session {
    /// Lineage ID. Assigned at login or restore and carried across
    /// refreshes; a new login gets a new one.
    pub id: Uuid,
    /// Short-lived access credential.
    pub access_token: String,
    /// Longer-lived refresh credential.
    pub refresh_token: String,
    /// When the access token expires, if the server said.
    pub expires_at: Option<DateTime<Utc>>,
    /// The authenticated user, once known.
    pub user: Option<UserProfile>,
}

impl Session {
    /// Start a new session lineage.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in: Option<u64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at: expires_at_from(expires_in),
            user: None,
        }
    }

    /// A copy of this session with refreshed credentials. The lineage ID and
    /// user carry over.
    pub fn refreshed(
        &self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in: Option<u64>,
    ) -> Self {
        Self {
            id: self.id,
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at: expires_at_from(expires_in),
            user: self.user.clone(),
        }
    }

    /// A copy of this session with the user attached.
    pub fn with_user(&self, user: UserProfile) -> Self {
        Self {
            user: Some(user),
            ..self.clone()
        }
    }

    /// Whether the access token expires within `skew` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.expires_at
            .is_some_and(|at| at.checked_sub_signed(skew).is_none_or(|t| t <= now))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user.as_ref().map(|u| u.id))
            .finish()
    }
}

fn expires_at_from(expires_in: Option<u64>) -> Option<DateTime<Utc>> {
    expires_in
        .and_then(|secs| i64::try_from(secs).ok())
        .map(|secs| Utc::now() + Duration::seconds(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refreshed_keeps_lineage_and_user() {
        let user = UserProfile {
            id: 1,
            email: "ada@example.com".to_string(),
            username: "ada".to_string(),
            role: Some("admin".to_string()),
            extra: Map::new(),
        };
        let session = Session::new("A1", "R1", None).with_user(user.clone());
        let next = session.refreshed("A2", "R1", Some(300));
        assert_eq!(next.id, session.id);
        assert_eq!(next.access_token, "A2");
        assert_eq!(next.user, Some(user));
        assert!(next.expires_at.is_some());
    }

    #[test]
    fn test_expires_within() {
        let mut session = Session::new("A1", "R1", None);
        let now = Utc::now();
        assert!(!session.expires_within(now, Duration::seconds(30)));
        session.expires_at = Some(now + Duration::seconds(10));
        assert!(session.expires_within(now, Duration::seconds(30)));
        assert!(!session.expires_within(now, Duration::seconds(5)));
    }

    #[test]
    fn test_skew_reaching_past_representable_time_counts_as_expiring() {
        let mut session = Session::new("A1", "R1", None);
        let now = Utc::now();
        session.expires_at = Some(now + Duration::seconds(10));
        assert!(session.expires_within(now, Duration::days(1_000_000_000)));
    }

    #[test]
    fn test_user_profile_keeps_unknown_fields() {
        let profile: UserProfile = serde_json::from_value(serde_json::json!({
            "id": 3,
            "email": "r@example.com",
            "username": "r",
            "role": "reporter",
            "first_name": "Rita"
        }))
        .unwrap();
        assert!(!profile.is_admin());
        assert_eq!(profile.extra.get("first_name"), Some(&serde_json::json!("Rita")));
    }
}
