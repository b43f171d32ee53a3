//! In-memory stores
//!
//! Same contracts as the PostgreSQL repositories, kept in `DashMap`s. Used by
//! the test suite and when the service runs without `DATABASE_URL`. Nothing
//! survives a restart.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use crate::core::auth::password::PasswordHasher;
use crate::core::db::models::{Account, AccountCredentials, AccountId, RefreshTokenRecord, Role};
use crate::core::db::store::{
    AccountStore, AccountStoreError, RefreshTokenStore, RefreshTokenStoreError,
    generate_token_id, validate_local_credentials, validate_provider_user_id,
};

#[derive(Default)]
struct Accounts {
    by_id: DashMap<AccountId, Account>,
    by_username: DashMap<String, AccountId>,
    by_provider_user: DashMap<String, AccountId>,
}

/// In-memory account store
#[derive(Clone, Default)]
pub struct MemoryAccountStore {
    accounts: Arc<Accounts>,
    hasher: PasswordHasher,
}

impl MemoryAccountStore {
    pub fn new(hasher: PasswordHasher) -> Self {
        Self {
            accounts: Arc::default(),
            hasher,
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.by_id.is_empty()
    }

    fn lookup(&self, index: &DashMap<String, AccountId>, key: &str) -> Option<Account> {
        let id = index.get(key).map(|id| *id)?;
        self.accounts.by_id.get(&id).map(|a| a.value().clone())
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get(&self, id: AccountId) -> Result<Option<Account>, AccountStoreError> {
        Ok(self.accounts.by_id.get(&id).map(|a| a.value().clone()))
    }

    async fn create_local(
        &self,
        role: Role,
        username: &str,
        password: &str,
    ) -> Result<AccountId, AccountStoreError> {
        validate_local_credentials(username, password)?;

        // Skip the bcrypt work for an obvious duplicate; the entry below decides.
        if self.accounts.by_username.contains_key(username) {
            return Err(AccountStoreError::DuplicateUsername);
        }

        let password_hash = self.hasher.hash(password).await?;

        match self.accounts.by_username.entry(username.to_string()) {
            Entry::Occupied(_) => Err(AccountStoreError::DuplicateUsername),
            Entry::Vacant(slot) => {
                let id = Uuid::new_v4();
                self.accounts.by_id.insert(
                    id,
                    Account {
                        id,
                        role,
                        credentials: AccountCredentials::Local {
                            username: username.to_string(),
                            password_hash,
                        },
                        chat_uid: None,
                        created_at: Utc::now(),
                    },
                );
                slot.insert(id);
                Ok(id)
            }
        }
    }

    async fn find_local(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Account>, AccountStoreError> {
        let account = self.lookup(&self.accounts.by_username, username);

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
        match self.accounts.by_id.get_mut(&id) {
            Some(mut account) => {
                account.chat_uid = Some(chat_uid.to_string());
                Ok(())
            }
            None => Err(AccountStoreError::NotFound),
        }
    }

    async fn create_external(
        &self,
        role: Role,
        provider_user_id: &str,
    ) -> Result<AccountId, AccountStoreError> {
        validate_provider_user_id(provider_user_id)?;

        match self
            .accounts
            .by_provider_user
            .entry(provider_user_id.to_string())
        {
            Entry::Occupied(_) => Err(AccountStoreError::DuplicateProviderUser),
            Entry::Vacant(slot) => {
                let id = Uuid::new_v4();
                self.accounts.by_id.insert(
                    id,
                    Account {
                        id,
                        role,
                        credentials: AccountCredentials::External {
                            provider_user_id: provider_user_id.to_string(),
                        },
                        chat_uid: None,
                        created_at: Utc::now(),
                    },
                );
                slot.insert(id);
                Ok(id)
            }
        }
    }

    async fn find_external(
        &self,
        provider_user_id: &str,
    ) -> Result<Option<Account>, AccountStoreError> {
        Ok(self.lookup(&self.accounts.by_provider_user, provider_user_id))
    }
}

/// In-memory refresh token store
#[derive(Clone, Default)]
pub struct MemoryRefreshTokenStore {
    tokens: Arc<DashMap<String, RefreshTokenRecord>>,
}

impl MemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn create(
        &self,
        account_id: AccountId,
    ) -> Result<RefreshTokenRecord, RefreshTokenStoreError> {
        let record = RefreshTokenRecord {
            id: generate_token_id(),
            account_id,
            issued_at: Utc::now(),
        };
        self.tokens.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn remove(&self, id: &str) -> Result<Option<RefreshTokenRecord>, RefreshTokenStoreError> {
        Ok(self.tokens.remove(id).map(|(_, record)| record))
    }

    async fn purge_issued_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RefreshTokenStoreError> {
        let mut purged = 0;
        self.tokens.retain(|_, record| {
            let keep = record.issued_at >= cutoff;
            if !keep {
                purged += 1;
            }
            keep
        });
        Ok(purged)
    }
}
