//! Password hashing with bcrypt
//!
//! Hashing and verification run on tokio's blocking pool. Verification of an
//! unknown user still pays for a full bcrypt comparison against a dummy hash of
//! the same cost, so "no such user" and "wrong password" take the same time.

use std::sync::{Arc, OnceLock};

/// Cost factor for bcrypt hashing (12 is recommended for production)
pub const DEFAULT_BCRYPT_COST: u32 = 12;

/// Work factor range bcrypt accepts
pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;

/// Longest password bcrypt hashes without truncation
pub const MAX_PASSWORD_BYTES: usize = 72;

const DUMMY_PASSWORD: &str = "keyturn-timing-equalizer";

/// Password hashing errors
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    Hashing(#[from] bcrypt::BcryptError),

    #[error("Password hashing task failed: {0}")]
    Task(String),
}

/// bcrypt hasher with a tunable work factor
#[derive(Clone)]
pub struct PasswordHasher {
    cost: u32,
    dummy_hash: Arc<OnceLock<String>>,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_BCRYPT_COST)
    }
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher")
            .field("cost", &self.cost)
            .finish()
    }
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self {
            cost,
            dummy_hash: Arc::new(OnceLock::new()),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Build the dummy hash ahead of the first unknown-user login.
    ///
    /// Clones share the dummy hash, so warming one warms them all.
    pub async fn warm_up(&self) -> Result<(), PasswordError> {
        let dummy_hash = Arc::clone(&self.dummy_hash);
        let cost = self.cost;

        tokio::task::spawn_blocking(move || dummy_hash_for(&dummy_hash, cost).map(|_| ()))
            .await
            .map_err(|e| PasswordError::Task(e.to_string()))?
            .map_err(PasswordError::from)
    }

    /// Hash a password (salt is generated by bcrypt)
    pub async fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let password = password.to_owned();
        let cost = self.cost;

        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| PasswordError::Task(e.to_string()))?
            .map_err(PasswordError::from)
    }

    /// Verify `password` against `stored_hash`.
    ///
    /// With `None` the password is checked against a dummy hash and the result is
    /// always `false`.
    pub async fn verify(
        &self,
        password: &str,
        stored_hash: Option<&str>,
    ) -> Result<bool, PasswordError> {
        let password = password.to_owned();
        let stored_hash = stored_hash.map(str::to_owned);
        let dummy_hash = Arc::clone(&self.dummy_hash);
        let cost = self.cost;

        tokio::task::spawn_blocking(move || -> Result<bool, bcrypt::BcryptError> {
            match stored_hash {
                Some(hash) => bcrypt::verify(password, &hash),
                None => {
                    let hash = dummy_hash_for(&dummy_hash, cost)?;
                    bcrypt::verify(password, &hash).map(|_| false)
                }
            }
        })
        .await
        .map_err(|e| PasswordError::Task(e.to_string()))?
        .map_err(PasswordError::from)
    }
}

fn dummy_hash_for(cell: &OnceLock<String>, cost: u32) -> Result<String, bcrypt::BcryptError> {
    if let Some(hash) = cell.get() {
        return Ok(hash.clone());
    }
    let hash = bcrypt::hash(DUMMY_PASSWORD, cost)?;
    Ok(cell.get_or_init(|| hash).clone())
}
