use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{
            AccessTokenResponse, LoginRequest, OAuthRequest, RefreshRequest, RegisterRequest,
            TokenPairResponse, UpdateMeRequest,
        },
        extractors::AuthUser,
        repo_types::User,
    },
    error::AuthError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/oauth", post(oauth))
        .route("/auth/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me).put(update_me))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<Json<User>, AuthError> {
    payload.email = payload.email.trim().to_string();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AuthError::Validation("Invalid email".into()));
    }

    if let Some(password) = &payload.password {
        if password.len() < 8 {
            warn!("password too short");
            return Err(AuthError::Validation("Password too short".into()));
        }
    }

    let user = state.auth.register(payload).await?;
    Ok(Json(user))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenPairResponse>, AuthError> {
    let tokens = state
        .auth
        .login(payload.identifier.trim(), &payload.password)
        .await?;
    Ok(Json(tokens))
}

#[instrument(skip(state, payload))]
pub async fn oauth(
    State(state): State<AppState>,
    Json(mut payload): Json<OAuthRequest>,
) -> Result<Json<User>, AuthError> {
    payload.email = payload.email.trim().to_string();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email from provider");
        return Err(AuthError::Validation("Invalid email".into()));
    }

    let user = state.auth.oauth_login_or_register(payload).await?;
    Ok(Json(user))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AccessTokenResponse>, AuthError> {
    let token = state.auth.refresh(&payload.refresh_token).await?;
    Ok(Json(token))
}

#[instrument(skip(user))]
pub async fn get_me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

#[instrument(skip(state, user, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<UpdateMeRequest>,
) -> Result<Json<User>, AuthError> {
    if let Some(password) = &payload.password {
        if password.len() < 8 {
            warn!(user_id = %user.id, "password too short");
            return Err(AuthError::Validation("Password too short".into()));
        }
    }
    let updated = state.auth.update_profile(user.id, payload).await?;
    Ok(Json(updated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape_check() {
        assert!(is_valid_email("alice@example.com"));
        assert!(is_valid_email("a.b+c@sub.example.org"));
        assert!(!is_valid_email("alice"));
        assert!(!is_valid_email("alice@nodot"));
        assert!(!is_valid_email("with space@example.com"));
    }
}
