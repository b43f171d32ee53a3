//! Account repository for database operations
//!
//! Local and externally-linked accounts in one `accounts` table. Passwords are
//! stored as bcrypt hashes; username uniqueness is enforced by a unique index.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::auth::password::PasswordHasher;
use crate::core::db::models::{Account, AccountCredentials, AccountId, AccountKind, AccountRow, Role};
use crate::core::db::store::{
    AccountStore, AccountStoreError, validate_local_credentials, validate_provider_user_id,
};

/// Account repository backed by PostgreSQL
#[derive(Clone)]
pub struct AccountRepository {
    pool: PgPool,
    hasher: PasswordHasher,
}

impl AccountRepository {
    /// Create a new account repository with the default bcrypt cost
    pub fn new(pool: PgPool) -> Self {
        Self::with_hasher(pool, PasswordHasher::default())
    }

    /// Create a new account repository with a specific hasher
    pub fn with_hasher(pool: PgPool, hasher: PasswordHasher) -> Self {
        Self { pool, hasher }
    }

    /// Find a local account by username
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, AccountStoreError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, role, kind, username, password_hash, provider_user_id, chat_uid, created_at
            FROM accounts
            WHERE kind = $1 AND username = $2
            "#,
        )
        .bind(AccountKind::Local)
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Account::try_from).transpose()?)
    }

    /// Delete an account by ID
    #[cfg(test)]
    pub async fn delete(&self, id: AccountId) -> Result<bool, AccountStoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl AccountStore for AccountRepository {
    async fn get(&self, id: AccountId) -> Result<Option<Account>, AccountStoreError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, role, kind, username, password_hash, provider_user_id, chat_uid, created_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Account::try_from).transpose()?)
    }

    async fn create_local(
        &self,
        role: Role,
        username: &str,
        password: &str,
    ) -> Result<AccountId, AccountStoreError> {
        validate_local_credentials(username, password)?;

        let password_hash = self.hasher.hash(password).await?;

        let result = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO accounts (role, kind, username, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(role)
        .bind(AccountKind::Local)
        .bind(username)
        .bind(&password_hash)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(id) => Ok(id),
            Err(e) if is_unique_violation(&e) => Err(AccountStoreError::DuplicateUsername),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_local(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Account>, AccountStoreError> {
        let account = self.find_by_username(username).await?;

        let stored_hash = match account.as_ref().map(|a| &a.credentials) {
            Some(AccountCredentials::Local { password_hash, .. }) => Some(password_hash.as_str()),
            _ => None,
        };

        if self.hasher.verify(password, stored_hash).await? {
            Ok(account)
        } else {
            Ok(None)
        }
    }

    async fn link_chat(&self, id: AccountId, chat_uid: &str) -> Result<(), AccountStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET chat_uid = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(chat_uid)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AccountStoreError::NotFound);
        }

        Ok(())
    }

    async fn create_external(
        &self,
        role: Role,
        provider_user_id: &str,
    ) -> Result<AccountId, AccountStoreError> {
        validate_provider_user_id(provider_user_id)?;

        let result = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO accounts (role, kind, provider_user_id)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(role)
        .bind(AccountKind::External)
        .bind(provider_user_id)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(id) => Ok(id),
            Err(e) if is_unique_violation(&e) => Err(AccountStoreError::DuplicateProviderUser),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_external(
        &self,
        provider_user_id: &str,
    ) -> Result<Option<Account>, AccountStoreError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, role, kind, username, password_hash, provider_user_id, chat_uid, created_at
            FROM accounts
            WHERE kind = $1 AND provider_user_id = $2
            "#,
        )
        .bind(AccountKind::External)
        .bind(provider_user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Account::try_from).transpose()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Integration Tests (require database)
    // ========================================================================

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_create_local_account() {
        let repo = create_test_repo().await;
        let username = unique_username("create");

        let id = repo
            .create_local(Role::Partner, &username, "secure_password123")
            .await
            .unwrap();

        let account = repo.get(id).await.unwrap().unwrap();
        assert_eq!(account.role, Role::Partner);
        assert_eq!(account.username(), Some(username.as_str()));
        match &account.credentials {
            AccountCredentials::Local { password_hash, .. } => {
                assert_ne!(password_hash, "secure_password123");
                assert!(password_hash.starts_with("$2"));
            }
            other => panic!("expected local credentials, got {:?}", other),
        }

        // Cleanup
        repo.delete(id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_create_local_duplicate_username() {
        let repo = create_test_repo().await;
        let username = unique_username("dup");

        let id = repo
            .create_local(Role::Client, &username, "password")
            .await
            .unwrap();

        let result = repo.create_local(Role::Admin, &username, "other").await;
        assert!(matches!(result, Err(AccountStoreError::DuplicateUsername)));

        // Cleanup
        repo.delete(id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_find_local() {
        let repo = create_test_repo().await;
        let username = unique_username("find");

        let id = repo
            .create_local(Role::Client, &username, "correct_password")
            .await
            .unwrap();

        let found = repo.find_local(&username, "correct_password").await.unwrap();
        assert_eq!(found.map(|a| a.id), Some(id));

        let wrong = repo.find_local(&username, "wrong_password").await.unwrap();
        assert!(wrong.is_none());

        let unknown = repo
            .find_local(&unique_username("nobody"), "correct_password")
            .await
            .unwrap();
        assert!(unknown.is_none());

        // Cleanup
        repo.delete(id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_link_chat() {
        let repo = create_test_repo().await;
        let id = repo
            .create_local(Role::Client, &unique_username("link"), "password")
            .await
            .unwrap();

        repo.link_chat(id, "usrAbc").await.unwrap();
        repo.link_chat(id, "usrAbc").await.unwrap();

        let account = repo.get(id).await.unwrap().unwrap();
        assert_eq!(account.chat_uid.as_deref(), Some("usrAbc"));

        let missing = repo.link_chat(Uuid::new_v4(), "usrAbc").await;
        assert!(matches!(missing, Err(AccountStoreError::NotFound)));

        // Cleanup
        repo.delete(id).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_external_account() {
        let repo = create_test_repo().await;
        let provider_user_id = format!("vk-{}", Uuid::new_v4());

        let id = repo
            .create_external(Role::Client, &provider_user_id)
            .await
            .unwrap();

        let found = repo.find_external(&provider_user_id).await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.kind(), AccountKind::External);

        let dup = repo.create_external(Role::Client, &provider_user_id).await;
        assert!(matches!(dup, Err(AccountStoreError::DuplicateProviderUser)));

        // Cleanup
        repo.delete(id).await.unwrap();
    }

    fn unique_username(prefix: &str) -> String {
        format!("{}_{}", prefix, &Uuid::new_v4().simple().to_string()[..12])
    }

    // Helper function to create test repository
    async fn create_test_repo() -> AccountRepository {
        use crate::core::db::pool::{DbConfig, create_pool};

        let config = DbConfig::from_env().expect("DATABASE_URL must be set for tests");
        let pool = create_pool(&config)
            .await
            .expect("Failed to create test pool");
        AccountRepository::with_hasher(pool, PasswordHasher::new(4))
    }
}
