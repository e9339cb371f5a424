use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Argon2 cost factors. Defaults follow the argon2 crate's recommended
/// parameters; raising memory/iterations slows attackers at the price of
/// login latency.
#[derive(Debug, Clone, Deserialize)]
pub struct HashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub hash: HashConfig,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "authhub".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "authhub-users".into()),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 60),
            refresh_ttl_minutes: env_or("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };
        let hash = HashConfig {
            memory_kib: env_or("ARGON2_MEMORY_KIB", 19456),
            iterations: env_or("ARGON2_ITERATIONS", 2),
            parallelism: env_or("ARGON2_PARALLELISM", 1),
        };
        Ok(Self {
            database_url,
            jwt,
            hash,
        })
    }
}
