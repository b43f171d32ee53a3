//! Refresh token repository
//!
//! Records are keyed by the SHA-256 of the token id, so a database dump does not
//! contain usable ids. Consumption is a single `DELETE ... RETURNING`, which
//! PostgreSQL executes atomically: concurrent removals of the same id see the
//! row at most once.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::db::models::{AccountId, RefreshTokenRecord};
use crate::core::db::store::{RefreshTokenStore, RefreshTokenStoreError, generate_token_id};

/// Refresh token repository backed by PostgreSQL
#[derive(Clone)]
pub struct RefreshTokenRepository {
    pool: PgPool,
}

impl RefreshTokenRepository {
    /// Create a new refresh token repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Hash a token id using SHA-256
    pub fn hash_token_id(id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(id.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Count live records for an account
    #[cfg(test)]
    pub async fn count_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<i64, RefreshTokenStoreError> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM refresh_tokens
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }
}

#[async_trait]
impl RefreshTokenStore for RefreshTokenRepository {
    async fn create(
        &self,
        account_id: AccountId,
    ) -> Result<RefreshTokenRecord, RefreshTokenStoreError> {
        let id = generate_token_id();

        let issued_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            INSERT INTO refresh_tokens (id_hash, account_id)
            VALUES ($1, $2)
            RETURNING issued_at
            "#,
        )
        .bind(Self::hash_token_id(&id))
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(RefreshTokenRecord {
            id,
            account_id,
            issued_at,
        })
    }

    async fn remove(&self, id: &str) -> Result<Option<RefreshTokenRecord>, RefreshTokenStoreError> {
        let removed = sqlx::query_as::<_, (Uuid, DateTime<Utc>)>(
            r#"
            DELETE FROM refresh_tokens
            WHERE id_hash = $1
            RETURNING account_id, issued_at
            "#,
        )
        .bind(Self::hash_token_id(id))
        .fetch_optional(&self.pool)
        .await?;

        Ok(removed.map(|(account_id, issued_at)| RefreshTokenRecord {
            id: id.to_string(),
            account_id,
            issued_at,
        }))
    }

    async fn purge_issued_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RefreshTokenStoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE issued_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
