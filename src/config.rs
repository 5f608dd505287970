// Runtime configuration loaded from the environment

use std::time::Duration;

/// Where user records are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

/// Configuration failures, reported before the server starts
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing configuration: {0}")]
    Missing(&'static str),

    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub store_timeout: Duration,
    pub token_encryption_key: Option<String>,
    pub token_signing_key: Option<String>,
    pub signed_token_ttl_secs: i64,
}

impl Config {
    /// Read configuration from the process environment (after `.env`)
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to its value
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let port = match lookup("PORT") {
            Some(p) => p.parse().map_err(|_| ConfigError::Invalid("PORT"))?,
            None => 8080,
        };

        let store_backend = match lookup("USER_STORE")
            .unwrap_or_else(|| "postgres".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "postgres" | "postgresql" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            _ => return Err(ConfigError::Invalid("USER_STORE")),
        };

        let database_url = lookup("DATABASE_URL").filter(|s| !s.is_empty());
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let store_timeout_secs: u64 = match lookup("STORE_TIMEOUT_SECS") {
            Some(s) => s
                .parse()
                .ok()
                .filter(|v| *v > 0)
                .ok_or(ConfigError::Invalid("STORE_TIMEOUT_SECS"))?,
            None => 10,
        };

        let signed_token_ttl_secs: i64 = match lookup("SIGNED_TOKEN_TTL_SECS") {
            Some(s) => s
                .parse()
                .ok()
                .filter(|v| *v > 0)
                .ok_or(ConfigError::Invalid("SIGNED_TOKEN_TTL_SECS"))?,
            None => 24 * 60 * 60,
        };

        Ok(Self {
            host,
            port,
            store_backend,
            database_url,
            store_timeout: Duration::from_secs(store_timeout_secs),
            token_encryption_key: lookup("TOKEN_ENCRYPTION_KEY").filter(|s| !s.is_empty()),
            token_signing_key: lookup("TOKEN_SIGNING_KEY").filter(|s| !s.is_empty()),
            signed_token_ttl_secs,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
