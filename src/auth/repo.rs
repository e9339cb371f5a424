use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, ProfileChanges, ProviderLink, User};
use crate::error::AuthError;

/// Persistence port for user accounts. Store calls are the only suspension
/// points in the request path.
///
/// Uniqueness of `email` and `username` is enforced by the store itself;
/// callers may pre-check for friendlier errors, but a violation slipping
/// through a concurrent pre-check comes back as the matching duplicate kind,
/// never as corrupt data.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AuthError>;

    /// Disjunctive lookup over email and username. The first matching row
    /// wins; if one user's email somehow equals another's username the
    /// choice is an accepted ambiguity, not resolved here.
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, AuthError>;

    async fn find_by_provider(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> Result<Option<User>, AuthError>;

    async fn insert(&self, user: NewUser) -> Result<User, AuthError>;

    /// Stamp a successful authentication on the account.
    async fn record_login(&self, id: Uuid) -> Result<User, AuthError>;

    /// Migrate the account to a new provider identity. Overwrites the
    /// previous provider pair — one provider per user, by design of the
    /// linking model.
    async fn link_provider(&self, id: Uuid, link: ProviderLink) -> Result<User, AuthError>;

    async fn update_profile(&self, id: Uuid, changes: ProfileChanges)
        -> Result<User, AuthError>;

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, AuthError>;
}

pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const USER_COLUMNS: &str = "id, email, username, name, hashed_password, provider, provider_id, \
     avatar_url, email_verified, is_active, is_superuser, last_login, created_at, updated_at";

fn map_write_error(e: sqlx::Error) -> AuthError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_unique_violation() {
            if db_err.constraint() == Some("users_email_key") {
                return AuthError::DuplicateEmail;
            }
            if db_err.constraint() == Some("users_username_key") {
                return AuthError::DuplicateUsername;
            }
        }
    }
    AuthError::Database(e)
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 OR username = $1 LIMIT 1"
        ))
        .bind(identifier)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_provider(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE provider = $1 AND provider_id = $2"
        ))
        .bind(provider)
        .bind(provider_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn insert(&self, user: NewUser) -> Result<User, AuthError> {
        let created = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users \
                 (email, username, name, hashed_password, provider, provider_id, \
                  avatar_url, email_verified, is_superuser) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.name)
        .bind(&user.hashed_password)
        .bind(&user.provider)
        .bind(&user.provider_id)
        .bind(&user.avatar_url)
        .bind(user.email_verified)
        .bind(user.is_superuser)
        .fetch_one(&self.db)
        .await
        .map_err(map_write_error)?;
        Ok(created)
    }

    async fn record_login(&self, id: Uuid) -> Result<User, AuthError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET last_login = now(), updated_at = now() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        user.ok_or(AuthError::UserNotFound)
    }

    async fn link_provider(&self, id: Uuid, link: ProviderLink) -> Result<User, AuthError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET provider = $2, provider_id = $3, \
                 name = COALESCE($4, name), avatar_url = COALESCE($5, avatar_url), \
                 last_login = now(), updated_at = now() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(&link.provider)
        .bind(&link.provider_id)
        .bind(&link.name)
        .bind(&link.avatar_url)
        .fetch_optional(&self.db)
        .await?;
        user.ok_or(AuthError::UserNotFound)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileChanges,
    ) -> Result<User, AuthError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET username = COALESCE($2, username), \
                 name = COALESCE($3, name), avatar_url = COALESCE($4, avatar_url), \
                 hashed_password = COALESCE($5, hashed_password), updated_at = now() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(&changes.username)
        .bind(&changes.name)
        .bind(&changes.avatar_url)
        .bind(&changes.hashed_password)
        .fetch_optional(&self.db)
        .await
        .map_err(map_write_error)?;
        user.ok_or(AuthError::UserNotFound)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, AuthError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }
}
