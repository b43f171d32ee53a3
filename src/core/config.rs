//! Application configuration from environment variables.
//!
//! Load configuration using `Config::from_env()` after calling `dotenvy::dotenv()`.

use std::net::SocketAddr;
use std::str::FromStr;

use crate::core::auth::issuer::{
    DEFAULT_ACCESS_TOKEN_TTL_SECS, DEFAULT_REFRESH_TOKEN_TTL_SECS, MAX_TOKEN_TTL_SECS, TokenTtl,
};
use crate::core::auth::jwt::SigningSecret;
use crate::core::auth::password::{
    DEFAULT_BCRYPT_COST, MAX_BCRYPT_COST, MIN_BCRYPT_COST, PasswordHasher,
};
use crate::core::db::models::Role;
use crate::core::db::pool::{DbConfig, DbError};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error(transparent)]
    Database(#[from] DbError),
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL settings; `None` runs on in-memory stores
    pub db: Option<DbConfig>,

    /// HMAC secret for signing tokens
    pub jwt_secret: Option<SigningSecret>,

    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub bcrypt_cost: u32,
    pub bind_addr: SocketAddr,
    pub request_timeout_secs: u64,

    /// Role given to self-registered accounts
    pub default_role: Role,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Call `dotenvy::dotenv()` before this to load from `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let db = match lookup("DATABASE_URL") {
            Some(_) => Some(DbConfig::from_lookup(&lookup)?),
            None => None,
        };

        let access_token_ttl_secs = parse_or(
            &lookup,
            "ACCESS_TOKEN_TTL_SECS",
            DEFAULT_ACCESS_TOKEN_TTL_SECS,
        )?;
        let refresh_token_ttl_secs = parse_or(
            &lookup,
            "REFRESH_TOKEN_TTL_SECS",
            DEFAULT_REFRESH_TOKEN_TTL_SECS,
        )?;
        let bcrypt_cost = parse_or(&lookup, "BCRYPT_COST", DEFAULT_BCRYPT_COST)?;
        let request_timeout_secs = parse_or(
            &lookup,
            "REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;

        if !(1..=MAX_TOKEN_TTL_SECS).contains(&access_token_ttl_secs) {
            return Err(invalid("ACCESS_TOKEN_TTL_SECS", access_token_ttl_secs));
        }
        if !(1..=MAX_TOKEN_TTL_SECS).contains(&refresh_token_ttl_secs) {
            return Err(invalid("REFRESH_TOKEN_TTL_SECS", refresh_token_ttl_secs));
        }
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&bcrypt_cost) {
            return Err(invalid("BCRYPT_COST", bcrypt_cost));
        }

        Ok(Self {
            db,
            jwt_secret: lookup("JWT_SECRET").map(SigningSecret::new),
            access_token_ttl_secs,
            refresh_token_ttl_secs,
            bcrypt_cost,
            bind_addr: parse_or(&lookup, "BIND_ADDR", default_bind_addr())?,
            request_timeout_secs,
            default_role: parse_or(&lookup, "DEFAULT_ROLE", Role::default())?,
        })
    }

    /// Check if database is configured
    pub fn has_database(&self) -> bool {
        self.db.is_some()
    }

    /// Check if a signing secret is configured
    pub fn has_jwt_secret(&self) -> bool {
        self.jwt_secret.is_some()
    }

    /// Configured signing secret, or a fresh random one
    pub fn signing_secret(&self) -> SigningSecret {
        self.jwt_secret.clone().unwrap_or_else(SigningSecret::generate)
    }

    pub fn token_ttl(&self) -> TokenTtl {
        TokenTtl::default()
            .access(chrono::Duration::seconds(self.access_token_ttl_secs))
            .refresh(chrono::Duration::seconds(self.refresh_token_ttl_secs))
    }

    pub fn password_hasher(&self) -> PasswordHasher {
        PasswordHasher::new(self.bcrypt_cost)
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn invalid(key: &'static str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    }
}

fn parse_or<T: FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|_| invalid(key, value)),
        None => Ok(default),
    }
}
