//! Persistent models for Keyturn
//!
//! Accounts and refresh token records as they live in the backing store,
//! plus the row types used to read them out of PostgreSQL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Opaque, immutable account identifier
pub type AccountId = Uuid;

// ============================================================================
// Role
// ============================================================================

/// Authorization tier of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Client,
    Partner,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Partner => write!(f, "partner"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "client" => Ok(Role::Client),
            "partner" => Ok(Role::Partner),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

// ============================================================================
// Account Model
// ============================================================================

/// How an account authenticates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Local,
    External,
}

impl std::fmt::Display for AccountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountKind::Local => write!(f, "local"),
            AccountKind::External => write!(f, "external"),
        }
    }
}

/// Credential payload of an account; exactly one variant per account
#[derive(Clone, PartialEq, Eq)]
pub enum AccountCredentials {
    Local {
        username: String,
        password_hash: String,
    },
    External {
        provider_user_id: String,
    },
}

impl AccountCredentials {
    pub fn kind(&self) -> AccountKind {
        match self {
            AccountCredentials::Local { .. } => AccountKind::Local,
            AccountCredentials::External { .. } => AccountKind::External,
        }
    }
}

// The hash never shows up in logs.
impl std::fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountCredentials::Local { username, .. } => f
                .debug_struct("Local")
                .field("username", username)
                .field("password_hash", &"<redacted>")
                .finish(),
            AccountCredentials::External { provider_user_id } => f
                .debug_struct("External")
                .field("provider_user_id", provider_user_id)
                .finish(),
        }
    }
}

/// Account entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub role: Role,
    pub credentials: AccountCredentials,
    /// Identifier of the bound chat-system user, absent until linked
    pub chat_uid: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn kind(&self) -> AccountKind {
        self.credentials.kind()
    }

    /// Username of a local account
    pub fn username(&self) -> Option<&str> {
        match &self.credentials {
            AccountCredentials::Local { username, .. } => Some(username),
            AccountCredentials::External { .. } => None,
        }
    }
}

/// Flat `accounts` row as stored in PostgreSQL
#[derive(Debug, Clone, FromRow)]
pub struct AccountRow {
    pub id: Uuid,
    pub role: Role,
    pub kind: AccountKind,
    pub username: Option<String>,
    pub password_hash: Option<String>,
    pub provider_user_id: Option<String>,
    pub chat_uid: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Raised when a stored row carries a payload that does not match its kind
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("account {id} has inconsistent {kind} credentials")]
pub struct InconsistentAccount {
    pub id: Uuid,
    pub kind: AccountKind,
}

impl TryFrom<AccountRow> for Account {
    type Error = InconsistentAccount;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let credentials = match (row.kind, row.username, row.password_hash, row.provider_user_id) {
            (AccountKind::Local, Some(username), Some(password_hash), None) => {
                AccountCredentials::Local {
                    username,
                    password_hash,
                }
            }
            (AccountKind::External, None, None, Some(provider_user_id)) => {
                AccountCredentials::External { provider_user_id }
            }
            (kind, ..) => return Err(InconsistentAccount { id: row.id, kind }),
        };

        Ok(Self {
            id: row.id,
            role: row.role,
            credentials,
            chat_uid: row.chat_uid,
            created_at: row.created_at,
        })
    }
}

/// Account without credential data (for API responses)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResponse {
    pub id: AccountId,
    pub role: Role,
    pub kind: AccountKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_uid: Option<String>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        let kind = account.kind();
        let username = account.username().map(str::to_string);
        Self {
            id: account.id,
            role: account.role,
            kind,
            username,
            chat_uid: account.chat_uid,
        }
    }
}

// ============================================================================
// Refresh Token Model
// ============================================================================

/// Single-use refresh token record; presence in the store means active
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub id: String,
    pub account_id: AccountId,
    pub issued_at: DateTime<Utc>,
}

// ============================================================================
// Tests
// ============================================================================
