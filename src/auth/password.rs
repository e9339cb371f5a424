use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use tracing::{error, warn};

use crate::config::HashConfig;

/// Argon2id password hashing with configurable cost factors.
///
/// Hashing is deliberately expensive; callers on a latency-sensitive path
/// should move it onto the blocking pool (see `AuthService`).
#[derive(Clone)]
pub struct CredentialHasher {
    params: Params,
}

impl CredentialHasher {
    pub fn new(config: &HashConfig) -> anyhow::Result<Self> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| anyhow::anyhow!("invalid argon2 parameters: {e}"))?;
        Ok(Self { params })
    }

    fn engine(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password with a fresh random salt. The same input yields a
    /// different PHC string on every call.
    pub fn hash(&self, plain: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .engine()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    /// Verify a password against a stored PHC digest.
    ///
    /// Fails closed: a malformed digest is logged and treated as a mismatch,
    /// never surfaced as an error.
    pub fn verify(&self, plain: &str, digest: &str) -> bool {
        let parsed = match PasswordHash::new(digest) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "malformed password digest, rejecting");
                return false;
            }
        };
        self.engine()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok()
    }
}
