use serde::{Deserialize, Serialize};

fn default_provider() -> String {
    "email".to_string()
}

fn default_true() -> bool {
    true
}

/// Request body for credential registration.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: Option<String>,
    pub name: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_provider")]
    pub provider: String,
    pub provider_id: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
}

/// Request body for login; `identifier` is an email or a username.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

/// OAuth callback payload after the provider round-trip.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthRequest {
    pub provider: String,
    pub provider_id: String,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default = "default_true")]
    pub email_verified: bool,
}

/// Request body for token refresh.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Request body for profile updates on the authenticated account.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMeRequest {
    pub username: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub password: Option<String>,
}

/// Response returned after a successful login.
#[derive(Debug, Serialize)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

/// Response returned after a successful refresh; the refresh token itself is
/// not rotated.
#[derive(Debug, Serialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_request_defaults_to_email_provider() {
        let request: RegisterRequest =
            serde_json::from_str(r#"{"email": "a@b.co", "password": "pw"}"#).unwrap();
        assert_eq!(request.provider, "email");
        assert!(!request.email_verified);
        assert!(request.username.is_none());
    }

    #[test]
    fn oauth_request_defaults_email_verified_to_true() {
        let request: OAuthRequest = serde_json::from_str(
            r#"{"provider": "google", "provider_id": "g-1", "email": "a@b.co"}"#,
        )
        .unwrap();
        assert!(request.email_verified);
    }

    #[test]
    fn token_pair_serializes_bearer_shape() {
        let response = TokenPairResponse {
            access_token: "a".into(),
            refresh_token: "r".into(),
            token_type: "bearer",
            expires_in: 3600,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["token_type"], "bearer");
        assert_eq!(json["expires_in"], 3600);
    }
}
