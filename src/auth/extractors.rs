use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::auth::repo_types::User;
use crate::error::AuthError;
use crate::state::AppState;

/// Extracts the bearer access token and resolves it to the current account.
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AuthError::InvalidToken)?;

        // Expect "Bearer <token>"
        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or(AuthError::InvalidToken)?;

        let user = state.auth.whoami(token).await?;
        Ok(AuthUser(user))
    }
}
