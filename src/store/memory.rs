use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{IdentityStore, LocalUser, NewUser, ProviderIdentity, StoreError, UserPatch};
use crate::{CanonicalProfile, ProviderKind, ProviderTokens};

/// Process-memory store with the same semantics as the Postgres one.
///
/// Every operation runs under one lock, which makes `reconcile` atomic.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    last_user_id: i64,
    last_identity_id: i64,
    users: BTreeMap<i64, LocalUser>,
    identities: Vec<ProviderIdentity>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn email_owner(&self, email: &str) -> Option<i64> {
        self.users
            .values()
            .find(|user| user.email.as_deref() == Some(email))
            .map(|user| user.id)
    }

    fn insert_user(
        &mut self,
        name: String,
        email: Option<String>,
        avatar_url: Option<String>,
    ) -> i64 {
        self.last_user_id += 1;
        let now = Utc::now();
        let user = LocalUser {
            id: self.last_user_id,
            name,
            email,
            avatar_url,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(user.id, user);
        self.last_user_id
    }

    fn refresh_user(&mut self, id: i64, profile: &CanonicalProfile) {
        if let Some(user) = self.users.get_mut(&id) {
            user.name = profile.display_name.clone();
            if profile.avatar_url.is_some() {
                user.avatar_url = profile.avatar_url.clone();
            }
            user.updated_at = Utc::now();
        }
    }

    fn upsert_user_by_email(&mut self, email: &str, profile: &CanonicalProfile) -> i64 {
        match self.email_owner(email) {
            Some(id) => {
                self.refresh_user(id, profile);
                id
            }
            None => self.insert_user(
                profile.display_name.clone(),
                Some(email.to_string()),
                profile.avatar_url.clone(),
            ),
        }
    }

    fn identity_owner(&self, provider: ProviderKind, provider_id: &str) -> Option<i64> {
        self.identities
            .iter()
            .find(|identity| identity.provider == provider && identity.provider_id == provider_id)
            .map(|identity| identity.user_id)
    }

    fn upsert_identity(
        &mut self,
        user_id: i64,
        provider: ProviderKind,
        provider_id: &str,
        tokens: &ProviderTokens,
    ) -> Result<(), StoreError> {
        if !self.users.contains_key(&user_id) {
            return Err(StoreError::UserNotFound(user_id));
        }

        let now = Utc::now();
        if let Some(identity) = self
            .identities
            .iter_mut()
            .find(|identity| identity.provider == provider && identity.provider_id == provider_id)
        {
            let refresh_token = tokens
                .refresh_token
                .clone()
                .or_else(|| identity.tokens.refresh_token.take());
            identity.user_id = user_id;
            identity.tokens = ProviderTokens {
                access_token: tokens.access_token.clone(),
                refresh_token,
                expires_at: tokens.expires_at,
            };
            identity.updated_at = now;
            return Ok(());
        }

        self.last_identity_id += 1;
        self.identities.push(ProviderIdentity {
            id: self.last_identity_id,
            user_id,
            provider,
            provider_id: provider_id.to_string(),
            tokens: tokens.clone(),
            created_at: now,
            updated_at: now,
        });
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn upsert_user(&self, profile: &CanonicalProfile) -> Result<i64, StoreError> {
        let email = profile.email.as_deref().ok_or(StoreError::ProfileIncomplete)?;
        let mut inner = self.inner.lock().await;
        Ok(inner.upsert_user_by_email(email, profile))
    }

    async fn upsert_provider_identity(
        &self,
        user_id: i64,
        provider: ProviderKind,
        provider_id: &str,
        tokens: &ProviderTokens,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.upsert_identity(user_id, provider, provider_id, tokens)
    }

    async fn reconcile(
        &self,
        provider: ProviderKind,
        profile: &CanonicalProfile,
        tokens: &ProviderTokens,
    ) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().await;

        let user_id = match profile.email.as_deref() {
            Some(email) => inner.upsert_user_by_email(email, profile),
            None => match inner.identity_owner(provider, &profile.external_id) {
                Some(id) => {
                    inner.refresh_user(id, profile);
                    id
                }
                None => inner.insert_user(
                    profile.display_name.clone(),
                    None,
                    profile.avatar_url.clone(),
                ),
            },
        };

        inner.upsert_identity(user_id, provider, &profile.external_id, tokens)?;
        Ok(user_id)
    }

    async fn find_user(&self, id: i64) -> Result<Option<LocalUser>, StoreError> {
        Ok(self.inner.lock().await.users.get(&id).cloned())
    }

    async fn find_identities(&self, user_id: i64) -> Result<Vec<ProviderIdentity>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .identities
            .iter()
            .filter(|identity| identity.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_users(&self) -> Result<Vec<LocalUser>, StoreError> {
        Ok(self.inner.lock().await.users.values().cloned().collect())
    }

    async fn create_user(&self, user: NewUser) -> Result<LocalUser, StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(email) = user.email.as_deref() {
            if inner.email_owner(email).is_some() {
                return Err(StoreError::EmailTaken(email.to_string()));
            }
        }
        let id = inner.insert_user(user.name, user.email, user.avatar_url);
        inner.users.get(&id).cloned().ok_or(StoreError::UserNotFound(id))
    }

    async fn update_user(&self, id: i64, patch: UserPatch) -> Result<LocalUser, StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(email) = patch.email.as_deref() {
            if inner.email_owner(email).is_some_and(|owner| owner != id) {
                return Err(StoreError::EmailTaken(email.to_string()));
            }
        }

        let user = inner.users.get_mut(&id).ok_or(StoreError::UserNotFound(id))?;
        if let Some(name) = patch.name {
            user.name = name;
        }
        if patch.email.is_some() {
            user.email = patch.email;
        }
        if patch.avatar_url.is_some() {
            user.avatar_url = patch.avatar_url;
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn delete_user(&self, id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.users.remove(&id).ok_or(StoreError::UserNotFound(id))?;
        inner.identities.retain(|identity| identity.user_id != id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str, name: &str, email: Option<&str>) -> CanonicalProfile {
        CanonicalProfile::new(id, name).with_email(email.map(str::to_string))
    }

    #[tokio::test]
    async fn upsert_user_is_idempotent_on_email_and_refreshes_profile() {
        let store = MemoryIdentityStore::new();
        let first = store
            .upsert_user(
                &profile("1", "Old Name", Some("a@x.com"))
                    .with_avatar_url(Some("https://img/old".into())),
            )
            .await
            .unwrap();
        let second = store
            .upsert_user(
                &profile("1", "New Name", Some("a@x.com"))
                    .with_avatar_url(Some("https://img/new".into())),
            )
            .await
            .unwrap();

        assert_eq!(first, second);
        let user = store.find_user(first).await.unwrap().unwrap();
        assert_eq!(user.name, "New Name");
        assert_eq!(user.avatar_url.as_deref(), Some("https://img/new"));
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upsert_user_without_email_is_incomplete() {
        let store = MemoryIdentityStore::new();
        let result = store.upsert_user(&profile("9", "insta", None)).await;
        assert!(matches!(result, Err(StoreError::ProfileIncomplete)));
    }

    #[tokio::test]
    async fn identity_upsert_keeps_one_row_with_latest_tokens() {
        let store = MemoryIdentityStore::new();
        let user_id = store
            .upsert_user(&profile("42", "octo", Some("a@x.com")))
            .await
            .unwrap();

        store
            .upsert_provider_identity(
                user_id,
                ProviderKind::Github,
                "42",
                &ProviderTokens::new("first").with_refresh_token("r1"),
            )
            .await
            .unwrap();
        store
            .upsert_provider_identity(
                user_id,
                ProviderKind::Github,
                "42",
                &ProviderTokens::new("second").with_refresh_token("r2"),
            )
            .await
            .unwrap();

        let identities = store.find_identities(user_id).await.unwrap();
        assert_eq!(identities.len(), 1);
        assert_eq!(identities[0].tokens.access_token, "second");
        assert_eq!(identities[0].tokens.refresh_token.as_deref(), Some("r2"));
    }

    #[tokio::test]
    async fn identity_upsert_reassigns_ownership() {
        let store = MemoryIdentityStore::new();
        let alice = store
            .upsert_user(&profile("1", "alice", Some("alice@x.com")))
            .await
            .unwrap();
        let bob = store
            .upsert_user(&profile("2", "bob", Some("bob@x.com")))
            .await
            .unwrap();

        let tokens = ProviderTokens::new("t");
        store
            .upsert_provider_identity(alice, ProviderKind::Google, "g-1", &tokens)
            .await
            .unwrap();
        store
            .upsert_provider_identity(bob, ProviderKind::Google, "g-1", &tokens)
            .await
            .unwrap();

        assert!(store.find_identities(alice).await.unwrap().is_empty());
        assert_eq!(store.find_identities(bob).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn identity_upsert_requires_existing_user() {
        let store = MemoryIdentityStore::new();
        let result = store
            .upsert_provider_identity(99, ProviderKind::Github, "1", &ProviderTokens::new("t"))
            .await;
        assert!(matches!(result, Err(StoreError::UserNotFound(99))));
    }

    #[tokio::test]
    async fn reconcile_links_providers_sharing_an_email() {
        let store = MemoryIdentityStore::new();
        let tokens = ProviderTokens::new("t");
        let via_github = store
            .reconcile(
                ProviderKind::Github,
                &profile("42", "octo", Some("a@x.com")),
                &tokens,
            )
            .await
            .unwrap();
        let via_google = store
            .reconcile(
                ProviderKind::Google,
                &profile("g-7", "Octo Cat", Some("a@x.com")),
                &tokens,
            )
            .await
            .unwrap();

        assert_eq!(via_github, via_google);
        assert_eq!(store.find_identities(via_github).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reconcile_without_email_keys_on_provider_identity() {
        let store = MemoryIdentityStore::new();
        let first = store
            .reconcile(
                ProviderKind::Instagram,
                &profile("ig-1", "insta", None),
                &ProviderTokens::new("t1"),
            )
            .await
            .unwrap();
        let second = store
            .reconcile(
                ProviderKind::Instagram,
                &profile("ig-1", "insta_renamed", None),
                &ProviderTokens::new("t2"),
            )
            .await
            .unwrap();

        assert_eq!(first, second);
        let user = store.find_user(first).await.unwrap().unwrap();
        assert_eq!(user.email, None);
        assert_eq!(user.name, "insta_renamed");
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_avatar_keeps_previous_one() {
        let store = MemoryIdentityStore::new();
        let id = store
            .upsert_user(
                &profile("1", "a", Some("a@x.com")).with_avatar_url(Some("https://img/a".into())),
            )
            .await
            .unwrap();
        store
            .upsert_user(&profile("1", "a", Some("a@x.com")))
            .await
            .unwrap();
        let user = store.find_user(id).await.unwrap().unwrap();
        assert_eq!(user.avatar_url.as_deref(), Some("https://img/a"));
    }

    #[tokio::test]
    async fn crud_rejects_duplicate_email_and_unknown_ids() {
        let store = MemoryIdentityStore::new();
        let user = store
            .create_user(NewUser {
                name: "a".into(),
                email: Some("a@x.com".into()),
                avatar_url: None,
            })
            .await
            .unwrap();

        let duplicate = store
            .create_user(NewUser {
                name: "b".into(),
                email: Some("a@x.com".into()),
                avatar_url: None,
            })
            .await;
        assert!(matches!(duplicate, Err(StoreError::EmailTaken(_))));

        let updated = store
            .update_user(
                user.id,
                UserPatch {
                    name: Some("renamed".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.email.as_deref(), Some("a@x.com"));

        store.delete_user(user.id).await.unwrap();
        assert!(matches!(
            store.delete_user(user.id).await,
            Err(StoreError::UserNotFound(_))
        ));
    }
}
