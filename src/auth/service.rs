use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::dto::{
    AccessTokenResponse, OAuthRequest, RegisterRequest, TokenPairResponse, UpdateMeRequest,
};
use crate::auth::jwt::JwtKeys;
use crate::auth::password::CredentialHasher;
use crate::auth::repo::UserStore;
use crate::auth::repo_types::{NewUser, ProfileChanges, ProviderLink, User};
use crate::error::AuthError;

fn local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

/// Orchestrates hashing, token issuance and the account store into the
/// login, register, OAuth, refresh and whoami flows.
pub struct AuthService {
    users: Arc<dyn UserStore>,
    keys: JwtKeys,
    hasher: CredentialHasher,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, keys: JwtKeys, hasher: CredentialHasher) -> Self {
        Self {
            users,
            keys,
            hasher,
        }
    }

    /// Argon2 work runs on the blocking pool so the request dispatch path
    /// never stalls on it.
    async fn hash_blocking(&self, plain: String) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&plain))
            .await
            .map_err(|e| AuthError::Internal(anyhow::Error::new(e)))?
            .map_err(AuthError::Internal)
    }

    async fn verify_blocking(&self, plain: String, digest: String) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&plain, &digest))
            .await
            .map_err(|e| AuthError::Internal(anyhow::Error::new(e)))
    }

    /// Resolve a free username from `base` by appending `1`, `2`, … until no
    /// row matches. Terminates: the store is finite, the suffix space is not.
    /// A concurrent registration racing past this check loses at the store's
    /// uniqueness constraint, not here.
    async fn unique_username(&self, base: &str) -> Result<String, AuthError> {
        let mut candidate = base.to_string();
        let mut counter = 1u32;
        while self.users.find_by_username(&candidate).await?.is_some() {
            candidate = format!("{base}{counter}");
            counter += 1;
        }
        Ok(candidate)
    }

    fn token_pair(&self, user_id: Uuid) -> Result<TokenPairResponse, AuthError> {
        Ok(TokenPairResponse {
            access_token: self.keys.sign_access(user_id)?,
            refresh_token: self.keys.sign_refresh(user_id)?,
            token_type: "bearer",
            expires_in: self.keys.access_ttl.as_secs(),
        })
    }

    /// Authenticate against email or username plus password.
    ///
    /// Unknown identifier, password-less (pure OAuth) account and failed
    /// verification all collapse into `InvalidCredentials`; an inactive
    /// account is a separate internal condition that renders the same to the
    /// caller.
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<TokenPairResponse, AuthError> {
        let user = self
            .users
            .find_by_identifier(identifier)
            .await?
            .ok_or_else(|| {
                warn!(identifier, "login for unknown identifier");
                AuthError::InvalidCredentials
            })?;

        let digest = user
            .hashed_password
            .clone()
            .ok_or(AuthError::InvalidCredentials)?;
        if !self.verify_blocking(password.to_owned(), digest).await? {
            warn!(user_id = %user.id, "login with invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_active {
            warn!(user_id = %user.id, "login for inactive account");
            return Err(AuthError::InactiveAccount);
        }

        self.users.record_login(user.id).await?;
        info!(user_id = %user.id, "user logged in");
        self.token_pair(user.id)
    }

    /// Credential registration. The pre-checks give friendly errors; the
    /// store's uniqueness constraints remain the final arbiter under
    /// concurrency.
    pub async fn register(&self, data: RegisterRequest) -> Result<User, AuthError> {
        if data.provider == "email" && data.password.is_none() {
            return Err(AuthError::MissingPassword);
        }

        if self.users.find_by_email(&data.email).await?.is_some() {
            return Err(AuthError::DuplicateEmail);
        }
        if let Some(username) = &data.username {
            if self.users.find_by_username(username).await?.is_some() {
                return Err(AuthError::DuplicateUsername);
            }
        }

        let username = match data.username {
            Some(username) => username,
            None => self.unique_username(local_part(&data.email)).await?,
        };

        let hashed_password = match data.password {
            Some(password) => Some(self.hash_blocking(password).await?),
            None => None,
        };

        let user = self
            .users
            .insert(NewUser {
                email: data.email,
                username: Some(username),
                name: data.name,
                hashed_password,
                provider: data.provider,
                provider_id: data.provider_id,
                avatar_url: data.avatar_url,
                email_verified: data.email_verified,
                is_superuser: false,
            })
            .await?;

        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user)
    }

    /// Reconcile an OAuth callback with the account store.
    ///
    /// Decision order: returning provider identity, then email match
    /// (account linking), then a fresh account. Always succeeds short of a
    /// store failure.
    pub async fn oauth_login_or_register(&self, data: OAuthRequest) -> Result<User, AuthError> {
        if let Some(user) = self
            .users
            .find_by_provider(&data.provider, &data.provider_id)
            .await?
        {
            debug!(user_id = %user.id, provider = %data.provider, "returning oauth user");
            return self.users.record_login(user.id).await;
        }

        if let Some(user) = self.users.find_by_email(&data.email).await? {
            info!(
                user_id = %user.id,
                provider = %data.provider,
                "linking provider to existing account"
            );
            return self
                .users
                .link_provider(
                    user.id,
                    ProviderLink {
                        provider: data.provider,
                        provider_id: data.provider_id,
                        name: data.name,
                        avatar_url: data.avatar_url,
                    },
                )
                .await;
        }

        let username = self.unique_username(local_part(&data.email)).await?;
        let user = self
            .users
            .insert(NewUser {
                email: data.email,
                username: Some(username),
                name: data.name,
                hashed_password: None,
                provider: data.provider,
                provider_id: Some(data.provider_id),
                avatar_url: data.avatar_url,
                email_verified: data.email_verified,
                is_superuser: false,
            })
            .await?;

        info!(user_id = %user.id, provider = %user.provider, "oauth user created");
        Ok(user)
    }

    /// Exchange a refresh token for a new access token. The refresh token is
    /// not rotated. A vanished subject is rejected as an invalid token, the
    /// same unauthorized class as a bad signature.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AccessTokenResponse, AuthError> {
        let claims = self.keys.verify_refresh(refresh_token)?;
        let user = self
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        if !user.is_active {
            warn!(user_id = %user.id, "refresh for inactive account");
            return Err(AuthError::InactiveAccount);
        }
        Ok(AccessTokenResponse {
            access_token: self.keys.sign_access(user.id)?,
            token_type: "bearer",
            expires_in: self.keys.access_ttl.as_secs(),
        })
    }

    /// Resolve a bearer access token to the current account record.
    pub async fn whoami(&self, access_token: &str) -> Result<User, AuthError> {
        let claims = self.keys.verify_access(access_token)?;
        self.users
            .find_by_id(claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Update profile fields on the authenticated account; a supplied
    /// password is re-hashed before storage.
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        changes: UpdateMeRequest,
    ) -> Result<User, AuthError> {
        if let Some(username) = &changes.username {
            if let Some(existing) = self.users.find_by_username(username).await? {
                if existing.id != user_id {
                    return Err(AuthError::DuplicateUsername);
                }
            }
        }
        let hashed_password = match changes.password {
            Some(password) => Some(self.hash_blocking(password).await?),
            None => None,
        };
        self.users
            .update_profile(
                user_id,
                ProfileChanges {
                    username: changes.username,
                    name: changes.name,
                    avatar_url: changes.avatar_url,
                    hashed_password,
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::TokenKind;
    use crate::auth::repo::memory::MemoryUserStore;
    use crate::config::{HashConfig, JwtConfig};

    fn test_keys() -> JwtKeys {
        JwtKeys::from_config(&JwtConfig {
            secret: "test-secret".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_minutes: 5,
            refresh_ttl_minutes: 60,
        })
    }

    fn test_hasher() -> CredentialHasher {
        // Low cost keeps the suite fast; behavior is unchanged.
        CredentialHasher::new(&HashConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .expect("valid test parameters")
    }

    fn service() -> (AuthService, Arc<MemoryUserStore>) {
        let store = Arc::new(MemoryUserStore::new());
        let service = AuthService::new(store.clone(), test_keys(), test_hasher());
        (service, store)
    }

    fn register_req(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            username: None,
            name: None,
            password: Some("password123".into()),
            provider: "email".into(),
            provider_id: None,
            avatar_url: None,
            email_verified: false,
        }
    }

    fn oauth_req(email: &str, provider_id: &str) -> OAuthRequest {
        OAuthRequest {
            provider: "google".into(),
            provider_id: provider_id.into(),
            email: email.into(),
            name: Some("Alice Example".into()),
            avatar_url: Some("https://lh3.example/alice.png".into()),
            email_verified: true,
        }
    }

    #[tokio::test]
    async fn register_derives_username_from_email_local_part() {
        let (service, _) = service();
        let user = service.register(register_req("alice@example.com")).await.unwrap();
        assert_eq!(user.username.as_deref(), Some("alice"));
        assert_eq!(user.provider, "email");
        assert!(!user.email_verified);
        let digest = user.hashed_password.expect("email accounts store a digest");
        assert_ne!(digest, "password123");
    }

    #[tokio::test]
    async fn colliding_base_usernames_receive_integer_suffixes() {
        let (service, _) = service();
        let first = service.register(register_req("alice@one.com")).await.unwrap();
        let second = service.register(register_req("alice@two.com")).await.unwrap();
        let third = service.register(register_req("alice@three.com")).await.unwrap();
        assert_eq!(first.username.as_deref(), Some("alice"));
        assert_eq!(second.username.as_deref(), Some("alice1"));
        assert_eq!(third.username.as_deref(), Some("alice2"));
    }

    #[tokio::test]
    async fn register_requires_password_for_email_provider_only() {
        let (service, _) = service();

        let mut missing = register_req("alice@example.com");
        missing.password = None;
        assert!(matches!(
            service.register(missing).await,
            Err(AuthError::MissingPassword)
        ));

        let mut oauth_seeded = register_req("bob@example.com");
        oauth_seeded.password = None;
        oauth_seeded.provider = "github".into();
        oauth_seeded.provider_id = Some("gh-7".into());
        let user = service.register(oauth_seeded).await.unwrap();
        assert!(user.hashed_password.is_none());
        assert_eq!(user.provider, "github");
    }

    #[tokio::test]
    async fn register_rejects_taken_email_and_taken_username() {
        let (service, _) = service();
        service.register(register_req("alice@example.com")).await.unwrap();

        assert!(matches!(
            service.register(register_req("alice@example.com")).await,
            Err(AuthError::DuplicateEmail)
        ));

        let mut explicit = register_req("carol@example.com");
        explicit.username = Some("alice".into());
        assert!(matches!(
            service.register(explicit).await,
            Err(AuthError::DuplicateUsername)
        ));
    }

    #[tokio::test]
    async fn login_accepts_email_or_username_and_records_last_login() {
        let (service, store) = service();
        let user = service.register(register_req("alice@example.com")).await.unwrap();
        assert!(user.last_login.is_none());

        let by_email = service.login("alice@example.com", "password123").await.unwrap();
        assert_eq!(by_email.token_type, "bearer");
        assert_eq!(by_email.expires_in, 5 * 60);
        let claims = test_keys().verify_access(&by_email.access_token).unwrap();
        assert_eq!(claims.sub, user.id);

        let by_username = service.login("alice", "password123").await.unwrap();
        assert!(test_keys().verify_refresh(&by_username.refresh_token).is_ok());

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.last_login.is_some());
    }

    #[tokio::test]
    async fn login_failures_are_the_same_error_kind() {
        let (service, _) = service();
        service.register(register_req("alice@example.com")).await.unwrap();

        assert!(matches!(
            service.login("nonexistent@x.com", "anything").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            service.login("alice@example.com", "wrong-password").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn login_rejects_inactive_account_as_separate_kind() {
        let (service, store) = service();
        let user = service.register(register_req("alice@example.com")).await.unwrap();
        store.set_active(user.id, false);
        assert!(matches!(
            service.login("alice@example.com", "password123").await,
            Err(AuthError::InactiveAccount)
        ));
    }

    #[tokio::test]
    async fn login_rejects_password_less_oauth_account() {
        let (service, _) = service();
        let user = service
            .oauth_login_or_register(oauth_req("alice@example.com", "g-1"))
            .await
            .unwrap();
        assert!(user.hashed_password.is_none());
        assert!(matches!(
            service.login("alice@example.com", "anything").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn oauth_fast_path_returns_same_account_and_touches_only_last_login() {
        let (service, _) = service();
        let created = service
            .oauth_login_or_register(oauth_req("alice@example.com", "g-1"))
            .await
            .unwrap();
        assert!(created.last_login.is_none());

        let mut returning = oauth_req("alice@example.com", "g-1");
        returning.name = Some("Different Name".into());
        let again = service.oauth_login_or_register(returning).await.unwrap();

        assert_eq!(again.id, created.id);
        assert!(again.last_login.is_some());
        // fast path does not overwrite profile fields
        assert_eq!(again.name, created.name);
        assert_eq!(again.avatar_url, created.avatar_url);
        assert_eq!(again.email_verified, created.email_verified);
    }

    #[tokio::test]
    async fn oauth_links_provider_onto_existing_email_account() {
        let (service, _) = service();
        let mut seeded = register_req("alice@example.com");
        seeded.name = Some("Alice".into());
        let registered = service.register(seeded).await.unwrap();
        assert_eq!(registered.provider, "email");

        let mut callback = oauth_req("alice@example.com", "g-42");
        callback.name = None; // absent profile fields must not clobber stored ones
        let linked = service.oauth_login_or_register(callback).await.unwrap();

        assert_eq!(linked.id, registered.id);
        assert_eq!(linked.provider, "google");
        assert_eq!(linked.provider_id.as_deref(), Some("g-42"));
        assert_eq!(linked.name.as_deref(), Some("Alice"));
        assert_eq!(linked.avatar_url.as_deref(), Some("https://lh3.example/alice.png"));
        assert_eq!(linked.hashed_password, registered.hashed_password);
        assert!(linked.updated_at.is_some());

        // the password still works after linking
        assert!(service.login("alice@example.com", "password123").await.is_ok());
    }

    #[tokio::test]
    async fn oauth_creates_account_with_derived_username() {
        let (service, _) = service();
        let user = service
            .oauth_login_or_register(oauth_req("new.user@example.com", "g-9"))
            .await
            .unwrap();
        assert_eq!(user.username.as_deref(), Some("new.user"));
        assert_eq!(user.provider, "google");
        assert!(user.email_verified);
        assert!(user.hashed_password.is_none());
    }

    #[tokio::test]
    async fn refresh_issues_access_token_without_rotation() {
        let (service, _) = service();
        service.register(register_req("alice@example.com")).await.unwrap();
        let pair = service.login("alice@example.com", "password123").await.unwrap();

        let refreshed = service.refresh(&pair.refresh_token).await.unwrap();
        let claims = test_keys().verify_access(&refreshed.access_token).unwrap();
        assert_eq!(claims.kind, TokenKind::Access);

        // an access token can never mint new tokens
        assert!(matches!(
            service.refresh(&pair.access_token).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn refresh_rejects_vanished_or_inactive_subject() {
        let (service, store) = service();
        let user = service.register(register_req("alice@example.com")).await.unwrap();
        let pair = service.login("alice@example.com", "password123").await.unwrap();

        store.set_active(user.id, false);
        assert!(matches!(
            service.refresh(&pair.refresh_token).await,
            Err(AuthError::InactiveAccount)
        ));

        store.remove(user.id);
        assert!(matches!(
            service.refresh(&pair.refresh_token).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn whoami_resolves_access_tokens_only() {
        let (service, store) = service();
        let user = service.register(register_req("alice@example.com")).await.unwrap();
        let pair = service.login("alice@example.com", "password123").await.unwrap();

        let me = service.whoami(&pair.access_token).await.unwrap();
        assert_eq!(me.id, user.id);

        assert!(matches!(
            service.whoami(&pair.refresh_token).await,
            Err(AuthError::InvalidToken)
        ));

        store.remove(user.id);
        assert!(matches!(
            service.whoami(&pair.access_token).await,
            Err(AuthError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn update_profile_rehashes_password_and_respects_username_uniqueness() {
        let (service, _) = service();
        let alice = service.register(register_req("alice@example.com")).await.unwrap();
        service.register(register_req("bob@example.com")).await.unwrap();

        let updated = service
            .update_profile(
                alice.id,
                UpdateMeRequest {
                    username: Some("alice-renamed".into()),
                    name: Some("Alice R".into()),
                    avatar_url: None,
                    password: Some("new-password".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.username.as_deref(), Some("alice-renamed"));
        assert_ne!(updated.hashed_password, alice.hashed_password);
        assert!(service.login("alice-renamed", "new-password").await.is_ok());

        assert!(matches!(
            service
                .update_profile(
                    alice.id,
                    UpdateMeRequest {
                        username: Some("bob".into()),
                        name: None,
                        avatar_url: None,
                        password: None,
                    },
                )
                .await,
            Err(AuthError::DuplicateUsername)
        ));
    }
}
