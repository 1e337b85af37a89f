//! User administration.

use serde::Serialize;

use issuetrack_auth::{AuthGateway, UserProfile};
use issuetrack_cache::{CacheInvalidator, QueryCache, keys};
use issuetrack_core::error::AppError;
use issuetrack_core::events::{ChangeAction, ResourceChanged};
use issuetrack_core::result::AppResult;
use issuetrack_core::types::http::ApiRequest;

use super::{list_items, paths};

/// Fields for a new account.
#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    /// Login email.
    pub email: String,
    /// Display name.
    pub username: String,
    /// Initial password.
    pub password: String,
    /// `admin`, `maintainer`, or `reporter`.
    pub role: String,
}

/// A partial update. Unset fields are left alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserUpdate {
    /// New login email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// New display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// New role; checked locally before sending.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

const ROLES: [&str; 3] = ["admin", "maintainer", "reporter"];

fn check_role(role: &str) -> AppResult<()> {
    if ROLES.contains(&role) {
        Ok(())
    } else {
        Err(AppError::validation(format!(
            "Unknown role '{role}' (expected admin, maintainer, reporter)"
        )))
    }
}

/// User endpoints. Listing and changing users needs the admin role
/// server-side; a 403 comes back as `Unauthorized`.
#[derive(Debug, Clone)]
pub struct UsersApi {
    gateway: AuthGateway,
    cache: QueryCache,
    invalidator: CacheInvalidator,
}

impl UsersApi {
    /// User endpoints reading through `cache` and invalidating through
    /// `invalidator` after writes.
    pub fn new(gateway: AuthGateway, cache: QueryCache, invalidator: CacheInvalidator) -> Self {
        Self {
            gateway,
            cache,
            invalidator,
        }
    }

    /// Every account.
    pub async fn list(&self) -> AppResult<Vec<UserProfile>> {
        list_items(self.cache.read(&keys::user_list()).await?)
    }

    /// The signed-in user's profile.
    pub async fn me(&self) -> AppResult<UserProfile> {
        let value = self.cache.read(&keys::current_user()).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Create an account.
    pub async fn create(&self, user: &NewUser) -> AppResult<UserProfile> {
        check_role(&user.role)?;
        let created: UserProfile = self
            .gateway
            .request(ApiRequest::post(paths::USERS, serde_json::to_value(user)?))
            .await?
            .json()?;
        self.changed(ChangeAction::Created, created.id);
        Ok(created)
    }

    /// Apply a partial update to account `id`.
    pub async fn update(&self, id: u64, update: &UserUpdate) -> AppResult<UserProfile> {
        if let Some(role) = &update.role {
            check_role(role)?;
        }
        let updated: UserProfile = self
            .gateway
            .request(ApiRequest::patch(paths::user(id), serde_json::to_value(update)?))
            .await?
            .json()?;
        self.changed(ChangeAction::Updated, id);
        Ok(updated)
    }

    /// Delete account `id`.
    pub async fn delete(&self, id: u64) -> AppResult<()> {
        self.gateway.request(ApiRequest::delete(paths::user(id))).await?;
        self.changed(ChangeAction::Deleted, id);
        Ok(())
    }

    fn changed(&self, action: ChangeAction, id: u64) {
        self.invalidator
            .on_resource_changed(&ResourceChanged::new(action, keys::USER, Some(id.into())));
    }
}
