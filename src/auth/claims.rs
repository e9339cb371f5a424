use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type of JWT: access or refresh.
///
/// The marker is part of the signed payload, so a refresh token can never be
/// replayed where an access token is expected and vice versa.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT payload used for authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,       // user ID
    pub exp: usize,      // expires at (unix timestamp)
    pub iat: usize,      // issued at (unix timestamp)
    pub iss: String,     // issuer
    pub aud: String,     // audience
    pub kind: TokenKind, // access or refresh
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&TokenKind::Access).unwrap(), "\"access\"");
        assert_eq!(serde_json::to_string(&TokenKind::Refresh).unwrap(), "\"refresh\"");
    }
}
