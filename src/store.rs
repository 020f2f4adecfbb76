//! Local users and the provider identities linked to them.
//!
//! A [`LocalUser`] is keyed on email; a [`ProviderIdentity`] is unique on
//! `(provider, provider_id)` and always belongs to exactly one user, while a
//! user may own one identity per provider.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub use memory::MemoryIdentityStore;
pub use postgres::{MIGRATOR, PgIdentityStore};

use crate::profile::non_blank;
use crate::{CanonicalProfile, ProviderKind, ProviderTokens};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("profile has no email to reconcile on")]
    ProfileIncomplete,

    #[error("user {0} not found")]
    UserNotFound(i64),

    #[error("email {0} is already taken")]
    EmailTaken(String),

    #[error("unknown provider {0:?} in stored identity")]
    CorruptProvider(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LocalUser {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    pub id: i64,
    pub user_id: i64,
    pub provider: ProviderKind,
    pub provider_id: String,
    pub tokens: ProviderTokens,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUser {
    pub name: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub avatar_url: Option<String>,
}

/// Partial update; `None` leaves the column untouched. A blank email or
/// avatar reads as `None`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub avatar_url: Option<String>,
}

// Email is the reconciliation key, so "" must never be stored as one.
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(non_blank)
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Creates the user for `profile.email`, or refreshes name and avatar of
    /// the existing one. Returns the stable local id either way.
    async fn upsert_user(&self, profile: &CanonicalProfile) -> Result<i64, StoreError>;

    /// Links `(provider, provider_id)` to `user_id` in a single atomic
    /// insert-or-update; a returning identity gets its tokens replaced and is
    /// reassigned to `user_id`.
    async fn upsert_provider_identity(
        &self,
        user_id: i64,
        provider: ProviderKind,
        provider_id: &str,
        tokens: &ProviderTokens,
    ) -> Result<(), StoreError>;

    /// Resolves a freshly fetched profile to a local user and links the
    /// identity, both writes in one transaction.
    ///
    /// Profiles without an email are matched on `(provider, provider_id)`
    /// instead; a first login of such an identity creates a user with no
    /// email.
    async fn reconcile(
        &self,
        provider: ProviderKind,
        profile: &CanonicalProfile,
        tokens: &ProviderTokens,
    ) -> Result<i64, StoreError>;

    async fn find_user(&self, id: i64) -> Result<Option<LocalUser>, StoreError>;

    async fn find_identities(&self, user_id: i64) -> Result<Vec<ProviderIdentity>, StoreError>;

    async fn list_users(&self) -> Result<Vec<LocalUser>, StoreError>;

    async fn create_user(&self, user: NewUser) -> Result<LocalUser, StoreError>;

    async fn update_user(&self, id: i64, patch: UserPatch) -> Result<LocalUser, StoreError>;

    async fn delete_user(&self, id: i64) -> Result<(), StoreError>;
}
