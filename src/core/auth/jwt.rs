//! Token codec: compact HS256-signed claim sets
//!
//! Access and refresh tokens carry different claim shapes. Both shapes reject
//! unknown fields, so a token can only be verified as the kind it was issued as.
//! The signature is checked before the payload is deserialized, and expiry is
//! enforced strictly (`exp <= now` is expired, no leeway).

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::db::models::{AccountId, Role};

/// Length of a generated signing secret in bytes
pub const GENERATED_SECRET_BYTES: usize = 32;

/// Shared HMAC secret. Never printed.
#[derive(Clone)]
pub struct SigningSecret(Vec<u8>);

impl SigningSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Generate a random secret that lives as long as the process
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; GENERATED_SECRET_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

/// Token codec errors
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token signature is invalid")]
    BadSignature,

    #[error("Token is malformed")]
    Malformed,

    #[error("Token expired")]
    Expired,

    #[error("Token encoding failed: {0}")]
    Encoding(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::BadSignature,
            _ => TokenError::Malformed,
        }
    }
}

/// A claim set the codec can sign and verify
pub trait TokenClaims: Serialize + DeserializeOwned + Clone {
    /// Expiration time (Unix timestamp, seconds)
    fn expires_at(&self) -> i64;
}

/// Claims of a short-lived access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessClaims {
    /// Subject (account ID)
    pub sub: String,
    pub role: Role,
    /// Linked chat-system user, only when the account has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_uid: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl AccessClaims {
    /// Get the subject as an account ID
    pub fn account_id(&self) -> Result<AccountId, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::Malformed)
    }
}

impl TokenClaims for AccessClaims {
    fn expires_at(&self) -> i64 {
        self.exp
    }
}

/// Claims of a refresh token; `jti` is the refresh record id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshClaims {
    pub jti: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl TokenClaims for RefreshClaims {
    fn expires_at(&self) -> i64 {
        self.exp
    }
}

/// Signs and verifies claim sets with a shared secret
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(secret: &SigningSecret) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Serialize and sign a claim set
    pub fn sign<C: TokenClaims>(&self, claims: &C) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Verify a token and decode it as `C`
    pub fn verify<C: TokenClaims>(&self, token: &str) -> Result<C, TokenError> {
        let token_data = decode::<C>(token, &self.decoding_key, &self.validation)?;

        if token_data.claims.expires_at() <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }

        Ok(token_data.claims)
    }
}
