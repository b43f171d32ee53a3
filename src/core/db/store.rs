//! Store contracts shared by the PostgreSQL repositories and the in-memory stores
//!
//! Both stores are plain persistence: no caching, strong reads assumed from the
//! backing store. The one cross-request guarantee lives in
//! [`RefreshTokenStore::remove`], which must delete and return atomically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::core::auth::password::{MAX_PASSWORD_BYTES, PasswordError};
use crate::core::db::models::{Account, AccountId, InconsistentAccount, RefreshTokenRecord, Role};

/// Longest accepted username, in characters
pub const MAX_USERNAME_CHARS: usize = 64;

/// Random bytes behind every refresh token id
pub const TOKEN_ID_BYTES: usize = 32;

/// Account store error types
#[derive(Debug, thiserror::Error)]
pub enum AccountStoreError {
    #[error("Username already exists")]
    DuplicateUsername,

    #[error("Provider user is already registered")]
    DuplicateProviderUser,

    #[error("Weak input: {0}")]
    WeakInput(&'static str),

    #[error("Account not found")]
    NotFound,

    #[error(transparent)]
    Inconsistent(#[from] InconsistentAccount),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Refresh token store error types
#[derive(Debug, thiserror::Error)]
pub enum RefreshTokenStoreError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Persistent account records
#[async_trait]
pub trait AccountStore: Clone + Send + Sync + 'static {
    /// Look up an account by id
    async fn get(&self, id: AccountId) -> Result<Option<Account>, AccountStoreError>;

    /// Create a local account, hashing `password`
    async fn create_local(
        &self,
        role: Role,
        username: &str,
        password: &str,
    ) -> Result<AccountId, AccountStoreError>;

    /// Find a local account by credentials.
    ///
    /// Unknown username and wrong password both yield `Ok(None)`.
    async fn find_local(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Account>, AccountStoreError>;

    /// Bind a chat-system user to an account. Idempotent; `NotFound` if the
    /// account does not exist.
    async fn link_chat(&self, id: AccountId, chat_uid: &str) -> Result<(), AccountStoreError>;

    /// Create an account backed by an external identity provider
    async fn create_external(
        &self,
        role: Role,
        provider_user_id: &str,
    ) -> Result<AccountId, AccountStoreError>;

    /// Find an externally-linked account by the provider's user id
    async fn find_external(
        &self,
        provider_user_id: &str,
    ) -> Result<Option<Account>, AccountStoreError>;
}

/// Persistent single-use refresh token records
#[async_trait]
pub trait RefreshTokenStore: Clone + Send + Sync + 'static {
    /// Create a record with a fresh random id, stamped with the store's clock
    async fn create(
        &self,
        account_id: AccountId,
    ) -> Result<RefreshTokenRecord, RefreshTokenStoreError>;

    /// Atomically delete the record with `id` and return it.
    ///
    /// Of any number of concurrent calls with the same id, exactly one observes
    /// `Some`.
    async fn remove(&self, id: &str) -> Result<Option<RefreshTokenRecord>, RefreshTokenStoreError>;

    /// Delete every record issued before `cutoff`, returning how many went away
    async fn purge_issued_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RefreshTokenStoreError>;
}

/// Reject credentials that cannot be stored safely
pub fn validate_local_credentials(username: &str, password: &str) -> Result<(), AccountStoreError> {
    if username.trim().is_empty() {
        return Err(AccountStoreError::WeakInput("username must not be empty"));
    }

    if username.chars().count() > MAX_USERNAME_CHARS {
        return Err(AccountStoreError::WeakInput("username is too long"));
    }

    if password.is_empty() {
        return Err(AccountStoreError::WeakInput("password must not be empty"));
    }

    // bcrypt ignores everything past 72 bytes
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AccountStoreError::WeakInput("password is too long"));
    }

    Ok(())
}

/// Reject an empty provider user id
pub fn validate_provider_user_id(provider_user_id: &str) -> Result<(), AccountStoreError> {
    if provider_user_id.trim().is_empty() {
        return Err(AccountStoreError::WeakInput(
            "provider user id must not be empty",
        ));
    }

    Ok(())
}

/// Generate an unguessable refresh token id (256 bits, hex)
pub fn generate_token_id() -> String {
    let mut bytes = [0u8; TOKEN_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
