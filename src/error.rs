use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

/// Every failure the auth surface can produce.
///
/// `InvalidCredentials` and `InactiveAccount` are distinct kinds internally
/// but render identically to the caller, so a login response never reveals
/// whether the account exists, the password was wrong, or the account was
/// disabled.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is disabled")]
    InactiveAccount,

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Username already taken")]
    DuplicateUsername,

    #[error("Password is required for email accounts")]
    MissingPassword,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("User not found")]
    UserNotFound,

    #[error("{0}")]
    Validation(String),

    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthError::InvalidCredentials | AuthError::InactiveAccount => {
                (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string())
            }
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, self.to_string()),
            AuthError::DuplicateEmail | AuthError::DuplicateUsername => {
                (StatusCode::CONFLICT, self.to_string())
            }
            AuthError::MissingPassword | AuthError::Validation(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            AuthError::UserNotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AuthError::Database(e) => {
                error!(error = %e, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AuthError::Internal(e) => {
                error!(error = %e, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn rendered(err: AuthError) -> (StatusCode, String) {
        let response = err.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn inactive_account_is_indistinguishable_from_bad_credentials() {
        let bad = rendered(AuthError::InvalidCredentials).await;
        let inactive = rendered(AuthError::InactiveAccount).await;
        assert_eq!(bad, inactive);
        assert_eq!(bad.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn duplicate_kinds_render_as_conflict_with_distinct_messages() {
        let (email_status, email_body) = rendered(AuthError::DuplicateEmail).await;
        let (username_status, username_body) = rendered(AuthError::DuplicateUsername).await;
        assert_eq!(email_status, StatusCode::CONFLICT);
        assert_eq!(username_status, StatusCode::CONFLICT);
        assert_ne!(email_body, username_body);
    }

    #[tokio::test]
    async fn internal_errors_do_not_leak_details() {
        let (status, body) = rendered(AuthError::Internal(anyhow::anyhow!("secret detail"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.contains("secret detail"));
    }
}
