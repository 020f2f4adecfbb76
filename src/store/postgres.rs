use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool};

use super::{IdentityStore, LocalUser, NewUser, ProviderIdentity, StoreError, UserPatch};
use crate::{CanonicalProfile, ProviderKind, ProviderTokens};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const USER_COLUMNS: &str = "id, name, email, avatar_url, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct IdentityRow {
    id: i64,
    user_id: i64,
    provider: String,
    provider_id: String,
    access_token: String,
    refresh_token: Option<String>,
    token_expiry: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<IdentityRow> for ProviderIdentity {
    type Error = StoreError;

    fn try_from(row: IdentityRow) -> Result<Self, Self::Error> {
        let provider = row
            .provider
            .parse::<ProviderKind>()
            .map_err(|_| StoreError::CorruptProvider(row.provider.clone()))?;
        Ok(ProviderIdentity {
            id: row.id,
            user_id: row.user_id,
            provider,
            provider_id: row.provider_id,
            tokens: ProviderTokens {
                access_token: row.access_token,
                refresh_token: row.refresh_token,
                expires_at: row.token_expiry,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Postgres-backed store sharing one bounded connection pool.
#[derive(Debug, Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    /// Reverts every applied migration.
    pub async fn revert(&self) -> Result<(), StoreError> {
        MIGRATOR.undo(&self.pool, 0).await?;
        Ok(())
    }
}

async fn upsert_user_by_email(
    conn: &mut PgConnection,
    email: &str,
    profile: &CanonicalProfile,
) -> Result<i64, StoreError> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
            INSERT INTO users (name, email, avatar_url)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE SET
                name = EXCLUDED.name,
                avatar_url = COALESCE(EXCLUDED.avatar_url, users.avatar_url),
                updated_at = NOW()
            RETURNING id
        "#,
    )
    .bind(&profile.display_name)
    .bind(email)
    .bind(&profile.avatar_url)
    .fetch_one(conn)
    .await?;

    Ok(id)
}

async fn upsert_user_by_identity(
    conn: &mut PgConnection,
    provider: ProviderKind,
    profile: &CanonicalProfile,
) -> Result<i64, StoreError> {
    // Serializes first logins of the same email-less identity.
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(format!("{provider}:{}", profile.external_id))
        .execute(&mut *conn)
        .await?;

    let owner = sqlx::query_scalar::<_, i64>(
        "SELECT user_id FROM provider_identities WHERE provider = $1 AND provider_id = $2",
    )
    .bind(provider.as_str())
    .bind(&profile.external_id)
    .fetch_optional(&mut *conn)
    .await?;

    let id = match owner {
        Some(id) => {
            sqlx::query(
                r#"
                    UPDATE users
                    SET name = $1, avatar_url = COALESCE($2, avatar_url), updated_at = NOW()
                    WHERE id = $3
                "#,
            )
            .bind(&profile.display_name)
            .bind(&profile.avatar_url)
            .bind(id)
            .execute(&mut *conn)
            .await?;
            id
        }
        None => {
            sqlx::query_scalar::<_, i64>(
                "INSERT INTO users (name, email, avatar_url) VALUES ($1, NULL, $2) RETURNING id",
            )
            .bind(&profile.display_name)
            .bind(&profile.avatar_url)
            .fetch_one(&mut *conn)
            .await?
        }
    };

    Ok(id)
}

async fn upsert_identity(
    conn: &mut PgConnection,
    user_id: i64,
    provider: ProviderKind,
    provider_id: &str,
    tokens: &ProviderTokens,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
            INSERT INTO provider_identities
                (user_id, provider, provider_id, access_token, refresh_token, token_expiry)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (provider, provider_id) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                access_token = EXCLUDED.access_token,
                refresh_token = COALESCE(EXCLUDED.refresh_token, provider_identities.refresh_token),
                token_expiry = EXCLUDED.token_expiry,
                updated_at = NOW()
        "#,
    )
    .bind(user_id)
    .bind(provider.as_str())
    .bind(provider_id)
    .bind(&tokens.access_token)
    .bind(&tokens.refresh_token)
    .bind(tokens.expires_at)
    .execute(conn)
    .await
    .map_err(|err| match foreign_key_violation(&err) {
        true => StoreError::UserNotFound(user_id),
        false => StoreError::Database(err),
    })?;

    Ok(())
}

fn unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

fn foreign_key_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_foreign_key_violation())
}

fn email_conflict(err: sqlx::Error, email: Option<&str>) -> StoreError {
    match (unique_violation(&err), email) {
        (true, Some(email)) => StoreError::EmailTaken(email.to_string()),
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn upsert_user(&self, profile: &CanonicalProfile) -> Result<i64, StoreError> {
        let email = profile.email.as_deref().ok_or(StoreError::ProfileIncomplete)?;
        let mut conn = self.pool.acquire().await?;
        upsert_user_by_email(&mut conn, email, profile).await
    }

    async fn upsert_provider_identity(
        &self,
        user_id: i64,
        provider: ProviderKind,
        provider_id: &str,
        tokens: &ProviderTokens,
    ) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        upsert_identity(&mut conn, user_id, provider, provider_id, tokens).await
    }

    async fn reconcile(
        &self,
        provider: ProviderKind,
        profile: &CanonicalProfile,
        tokens: &ProviderTokens,
    ) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await?;

        let user_id = match profile.email.as_deref() {
            Some(email) => upsert_user_by_email(&mut tx, email, profile).await?,
            None => upsert_user_by_identity(&mut tx, provider, profile).await?,
        };
        upsert_identity(&mut tx, user_id, provider, &profile.external_id, tokens).await?;

        tx.commit().await?;
        Ok(user_id)
    }

    async fn find_user(&self, id: i64) -> Result<Option<LocalUser>, StoreError> {
        let user = sqlx::query_as::<_, LocalUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_identities(&self, user_id: i64) -> Result<Vec<ProviderIdentity>, StoreError> {
        let rows = sqlx::query_as::<_, IdentityRow>(
            r#"
                SELECT id, user_id, provider, provider_id, access_token, refresh_token,
                       token_expiry, created_at, updated_at
                FROM provider_identities
                WHERE user_id = $1
                ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ProviderIdentity::try_from).collect()
    }

    async fn list_users(&self) -> Result<Vec<LocalUser>, StoreError> {
        let users = sqlx::query_as::<_, LocalUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn create_user(&self, user: NewUser) -> Result<LocalUser, StoreError> {
        sqlx::query_as::<_, LocalUser>(&format!(
            r#"
            INSERT INTO users (name, email, avatar_url)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.avatar_url)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| email_conflict(err, user.email.as_deref()))
    }

    async fn update_user(&self, id: i64, patch: UserPatch) -> Result<LocalUser, StoreError> {
        sqlx::query_as::<_, LocalUser>(&format!(
            r#"
                UPDATE users SET
                    name = COALESCE($1, name),
                    email = COALESCE($2, email),
                    avatar_url = COALESCE($3, avatar_url),
                    updated_at = NOW()
                WHERE id = $4
                RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&patch.name)
        .bind(&patch.email)
        .bind(&patch.avatar_url)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| email_conflict(err, patch.email.as_deref()))?
        .ok_or(StoreError::UserNotFound(id))
    }

    async fn delete_user(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        match result.rows_affected() {
            0 => Err(StoreError::UserNotFound(id)),
            _ => Ok(()),
        }
    }
}
