use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::auth::jwt::JwtKeys;
use crate::auth::password::CredentialHasher;
use crate::auth::repo::{PgUserStore, UserStore};
use crate::auth::service::AuthService;
use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let users = Arc::new(PgUserStore::new(db.clone())) as Arc<dyn UserStore>;
        Self::from_parts(db, config, users)
    }

    pub fn from_parts(
        db: PgPool,
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
    ) -> anyhow::Result<Self> {
        let auth = Arc::new(AuthService::new(
            users.clone(),
            JwtKeys::from_config(&config.jwt),
            CredentialHasher::new(&config.hash)?,
        ));
        Ok(Self {
            db,
            config,
            users,
            auth,
        })
    }
}
