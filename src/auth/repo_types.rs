use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
///
/// `email` is the primary identity key; `username` and
/// `(provider, provider_id)` are secondary unique lookup keys.
/// `hashed_password` is present only for accounts created with the
/// `"email"` provider and never leaves the service in JSON.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: Option<String>,
    pub name: Option<String>,
    #[serde(skip_serializing, default)]
    pub hashed_password: Option<String>,
    pub provider: String,
    pub provider_id: Option<String>,
    pub avatar_url: Option<String>,
    pub email_verified: bool,
    pub is_active: bool,
    pub is_superuser: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

/// Fields for a user row about to be inserted. The store assigns `id` and
/// `created_at`.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: Option<String>,
    pub name: Option<String>,
    pub hashed_password: Option<String>,
    pub provider: String,
    pub provider_id: Option<String>,
    pub avatar_url: Option<String>,
    pub email_verified: bool,
    pub is_superuser: bool,
}

/// Provider identity migrated onto an existing account. `name` and
/// `avatar_url` only overwrite the stored values when present.
#[derive(Debug, Clone)]
pub struct ProviderLink {
    pub provider: String,
    pub provider_id: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Partial profile update; `None` leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub hashed_password: Option<String>,
}
