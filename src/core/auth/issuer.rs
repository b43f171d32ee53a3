//! Token issuer
//!
//! Mints access/refresh pairs and rotates them. Every pair gets a brand-new
//! refresh record; a refresh consumes its record through the store's atomic
//! remove, so a refresh token works at most once. Bad signature, malformed,
//! expired and already-consumed refresh tokens all surface as the same
//! [`AuthError::InvalidToken`].

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::core::auth::jwt::{AccessClaims, RefreshClaims, TokenCodec, TokenError};
use crate::core::db::models::{Account, AccountId, Role};
use crate::core::db::store::{
    AccountStore, AccountStoreError, RefreshTokenStore, RefreshTokenStoreError,
};

/// Default access token lifetime: 10 minutes
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 10 * 60;

/// Default refresh token lifetime: 30 days
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Longest configurable token lifetime: 10 years
pub const MAX_TOKEN_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Lifetimes of issued tokens, counted from the refresh record's issue time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenTtl {
    pub access: Duration,
    pub refresh: Duration,
}

impl Default for TokenTtl {
    fn default() -> Self {
        Self {
            access: Duration::seconds(DEFAULT_ACCESS_TOKEN_TTL_SECS),
            refresh: Duration::seconds(DEFAULT_REFRESH_TOKEN_TTL_SECS),
        }
    }
}

impl TokenTtl {
    /// Set access token lifetime
    pub fn access(mut self, ttl: Duration) -> Self {
        self.access = ttl;
        self
    }

    /// Set refresh token lifetime
    pub fn refresh(mut self, ttl: Duration) -> Self {
        self.refresh = ttl;
        self
    }
}

/// Token pair returned after login or refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiration (Unix timestamp)
    pub access_expires_at: i64,
    /// Refresh token expiration (Unix timestamp)
    pub refresh_expires_at: i64,
    pub token_type: String,
}

/// Issuer error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Username already exists")]
    DuplicateUsername,

    #[error("Weak input: {0}")]
    WeakInput(&'static str),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Account not found")]
    NotFound,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AccountStoreError> for AuthError {
    fn from(err: AccountStoreError) -> Self {
        match err {
            AccountStoreError::DuplicateUsername => AuthError::DuplicateUsername,
            AccountStoreError::WeakInput(reason) => AuthError::WeakInput(reason),
            AccountStoreError::NotFound => AuthError::NotFound,
            _ => AuthError::Internal(err.to_string()),
        }
    }
}

impl From<RefreshTokenStoreError> for AuthError {
    fn from(err: RefreshTokenStoreError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::BadSignature | TokenError::Malformed | TokenError::Expired => {
                AuthError::InvalidToken
            }
            TokenError::Encoding(_) => AuthError::Internal(err.to_string()),
        }
    }
}

/// Registration request data
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

/// Login request data
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Token refresh request
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Mints and rotates token pairs over an account store and a refresh token store
#[derive(Clone)]
pub struct TokenIssuer<A, R> {
    accounts: A,
    refresh_tokens: R,
    codec: TokenCodec,
    ttl: TokenTtl,
    default_role: Role,
}

impl<A: AccountStore, R: RefreshTokenStore> TokenIssuer<A, R> {
    pub fn new(accounts: A, refresh_tokens: R, codec: TokenCodec) -> Self {
        Self {
            accounts,
            refresh_tokens,
            codec,
            ttl: TokenTtl::default(),
            default_role: Role::default(),
        }
    }

    /// Set token lifetimes
    pub fn with_ttl(mut self, ttl: TokenTtl) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the role given to self-registered accounts
    pub fn with_default_role(mut self, role: Role) -> Self {
        self.default_role = role;
        self
    }

    pub fn accounts(&self) -> &A {
        &self.accounts
    }

    pub fn refresh_tokens(&self) -> &R {
        &self.refresh_tokens
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn ttl(&self) -> TokenTtl {
        self.ttl
    }

    pub fn default_role(&self) -> Role {
        self.default_role
    }

    /// Mint a new pair for `account` backed by a fresh refresh record
    pub async fn make_token_pair(&self, account: &Account) -> Result<TokenPair, AuthError> {
        let record = self.refresh_tokens.create(account.id).await?;

        let expires_at = |ttl: Duration| {
            record
                .issued_at
                .checked_add_signed(ttl)
                .map(|t| t.timestamp())
                .ok_or_else(|| {
                    AuthError::Internal(format!("token lifetime out of range: {}", ttl))
                })
        };
        let access_expires_at = expires_at(self.ttl.access)?;
        let refresh_expires_at = expires_at(self.ttl.refresh)?;

        let access_claims = AccessClaims {
            sub: account.id.to_string(),
            role: account.role,
            chat_uid: account.chat_uid.clone(),
            exp: access_expires_at,
        };
        let refresh_claims = RefreshClaims {
            jti: record.id,
            exp: refresh_expires_at,
        };

        Ok(TokenPair {
            access_token: self.codec.sign(&access_claims)?,
            refresh_token: self.codec.sign(&refresh_claims)?,
            access_expires_at,
            refresh_expires_at,
            token_type: "Bearer".to_string(),
        })
    }

    /// Consume a refresh token and mint a replacement pair
    pub async fn refresh_token_pair(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims: RefreshClaims = self.codec.verify(refresh_token).map_err(|e| {
            tracing::debug!("Refresh token rejected: {}", e);
            AuthError::from(e)
        })?;

        let Some(record) = self.refresh_tokens.remove(&claims.jti).await? else {
            tracing::debug!("Unknown refresh token");
            return Err(AuthError::InvalidToken);
        };

        let Some(account) = self.accounts.get(record.account_id).await? else {
            tracing::error!(
                "Refresh record references missing account: {}",
                record.account_id
            );
            return Err(AuthError::NotFound);
        };

        self.make_token_pair(&account).await
    }

    /// Authenticate a local account and mint a pair
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(Account, TokenPair), AuthError> {
        let account = self
            .accounts
            .find_local(username, password)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let tokens = self.make_token_pair(&account).await?;

        Ok((account, tokens))
    }

    /// Create a local account with the default role
    pub async fn register(&self, username: &str, password: &str) -> Result<AccountId, AuthError> {
        Ok(self
            .accounts
            .create_local(self.default_role, username, password)
            .await?)
    }

    /// Verify an access token
    pub fn verify_access(&self, access_token: &str) -> Result<AccessClaims, AuthError> {
        Ok(self.codec.verify(access_token)?)
    }

    /// Resolve the account behind an access token
    pub async fn current_account(&self, access_token: &str) -> Result<Account, AuthError> {
        let claims = self.verify_access(access_token)?;
        let account_id = claims.account_id()?;

        self.accounts
            .get(account_id)
            .await?
            .ok_or(AuthError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::jwt::SigningSecret;
    use crate::core::auth::password::PasswordHasher;
    use crate::core::db::repositories::{MemoryAccountStore, MemoryRefreshTokenStore};
    use uuid::Uuid;

    type TestIssuer = TokenIssuer<MemoryAccountStore, MemoryRefreshTokenStore>;

    fn create_test_issuer() -> TestIssuer {
        TokenIssuer::new(
            MemoryAccountStore::new(PasswordHasher::new(4)),
            MemoryRefreshTokenStore::new(),
            TokenCodec::new(&SigningSecret::new("issuer_test_secret")),
        )
    }

    async fn create_account(issuer: &TestIssuer, role: Role) -> Account {
        let id = issuer
            .accounts()
            .create_local(role, "alice", "s3cret")
            .await
            .unwrap();
        issuer.accounts().get(id).await.unwrap().unwrap()
    }

    // ========================================================================
    // TokenTtl Tests
    // ========================================================================

    #[test]
    fn test_default_ttl() {
        let ttl = TokenTtl::default();
        assert_eq!(ttl.access, Duration::minutes(10));
        assert_eq!(ttl.refresh, Duration::days(30));
    }

    #[test]
    fn test_ttl_builder() {
        let ttl = TokenTtl::default()
            .access(Duration::minutes(5))
            .refresh(Duration::days(1));
        assert_eq!(ttl.access, Duration::minutes(5));
        assert_eq!(ttl.refresh, Duration::days(1));
    }

    // ========================================================================
    // Error Conversion Tests
    // ========================================================================

    #[test]
    fn test_token_errors_collapse_to_invalid_token() {
        for err in [
            TokenError::BadSignature,
            TokenError::Malformed,
            TokenError::Expired,
        ] {
            assert!(matches!(AuthError::from(err), AuthError::InvalidToken));
        }
        assert!(matches!(
            AuthError::from(TokenError::Encoding("boom".to_string())),
            AuthError::Internal(_)
        ));
    }

    #[test]
    fn test_store_error_conversion() {
        assert!(matches!(
            AuthError::from(AccountStoreError::DuplicateUsername),
            AuthError::DuplicateUsername
        ));
        assert!(matches!(
            AuthError::from(AccountStoreError::WeakInput("x")),
            AuthError::WeakInput("x")
        ));
        assert!(matches!(
            AuthError::from(AccountStoreError::NotFound),
            AuthError::NotFound
        ));
        assert!(matches!(
            AuthError::from(AccountStoreError::DuplicateProviderUser),
            AuthError::Internal(_)
        ));
    }

    // ========================================================================
    // MakeTokenPair Tests
    // ========================================================================

    #[tokio::test]
    async fn test_make_token_pair_claims() {
        let issuer = create_test_issuer();
        let account = create_account(&issuer, Role::Partner).await;

        let pair = issuer.make_token_pair(&account).await.unwrap();
        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(issuer.refresh_tokens().len(), 1);

        let access = issuer.verify_access(&pair.access_token).unwrap();
        assert_eq!(access.account_id().unwrap(), account.id);
        assert_eq!(access.role, Role::Partner);
        assert_eq!(access.chat_uid, None);
        assert_eq!(access.exp, pair.access_expires_at);

        let refresh: RefreshClaims = issuer.codec().verify(&pair.refresh_token).unwrap();
        assert_eq!(refresh.exp, pair.refresh_expires_at);
        assert_eq!(
            pair.refresh_expires_at - pair.access_expires_at,
            DEFAULT_REFRESH_TOKEN_TTL_SECS - DEFAULT_ACCESS_TOKEN_TTL_SECS
        );
    }

    #[tokio::test]
    async fn test_make_token_pair_carries_chat_link() {
        let issuer = create_test_issuer();
        let account = create_account(&issuer, Role::Client).await;
        issuer.accounts().link_chat(account.id, "usrChat").await.unwrap();
        let account = issuer.accounts().get(account.id).await.unwrap().unwrap();

        let pair = issuer.make_token_pair(&account).await.unwrap();
        let access = issuer.verify_access(&pair.access_token).unwrap();
        assert_eq!(access.chat_uid.as_deref(), Some("usrChat"));
    }

    #[tokio::test]
    async fn test_every_pair_gets_a_new_record() {
        let issuer = create_test_issuer();
        let account = create_account(&issuer, Role::Client).await;

        let first = issuer.make_token_pair(&account).await.unwrap();
        let second = issuer.make_token_pair(&account).await.unwrap();

        assert_ne!(first.refresh_token, second.refresh_token);
        assert_eq!(issuer.refresh_tokens().len(), 2);
    }

    #[tokio::test]
    async fn test_expired_access_token_rejected() {
        let issuer = create_test_issuer().with_ttl(TokenTtl::default().access(Duration::seconds(-5)));
        let account = create_account(&issuer, Role::Client).await;

        let pair = issuer.make_token_pair(&account).await.unwrap();
        assert!(matches!(
            issuer.verify_access(&pair.access_token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_out_of_range_ttl_is_an_error() {
        let issuer = create_test_issuer()
            .with_ttl(TokenTtl::default().refresh(Duration::days(365 * 1_000_000)));
        create_account(&issuer, Role::Client).await;

        let result = issuer.login("alice", "s3cret").await;
        assert!(matches!(result, Err(AuthError::Internal(_))));
    }

    // ========================================================================
    // RefreshTokenPair Tests
    // ========================================================================

    #[tokio::test]
    async fn test_refresh_rotates() {
        let issuer = create_test_issuer();
        let account = create_account(&issuer, Role::Admin).await;
        let original = issuer.make_token_pair(&account).await.unwrap();

        let rotated = issuer
            .refresh_token_pair(&original.refresh_token)
            .await
            .unwrap();
        assert_ne!(rotated.refresh_token, original.refresh_token);
        assert_eq!(issuer.refresh_tokens().len(), 1);

        let access = issuer.verify_access(&rotated.access_token).unwrap();
        assert_eq!(access.role, Role::Admin);

        let replay = issuer.refresh_token_pair(&original.refresh_token).await;
        assert!(matches!(replay, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_refresh_with_access_token_fails() {
        let issuer = create_test_issuer();
        let account = create_account(&issuer, Role::Client).await;
        let pair = issuer.make_token_pair(&account).await.unwrap();

        let result = issuer.refresh_token_pair(&pair.access_token).await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
        assert_eq!(issuer.refresh_tokens().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_with_garbage_fails() {
        let issuer = create_test_issuer();
        let result = issuer.refresh_token_pair("not.a.token").await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_refresh_with_unknown_id_fails() {
        let issuer = create_test_issuer();
        let forged = issuer
            .codec()
            .sign(&RefreshClaims {
                jti: "never-issued".to_string(),
                exp: (chrono::Utc::now() + Duration::days(1)).timestamp(),
            })
            .unwrap();

        let result = issuer.refresh_token_pair(&forged).await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_expired_refresh_token_leaves_record() {
        let issuer =
            create_test_issuer().with_ttl(TokenTtl::default().refresh(Duration::seconds(-5)));
        let account = create_account(&issuer, Role::Client).await;
        let pair = issuer.make_token_pair(&account).await.unwrap();

        let result = issuer.refresh_token_pair(&pair.refresh_token).await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
        assert_eq!(issuer.refresh_tokens().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_for_missing_account() {
        let issuer = create_test_issuer();
        let ghost = Account {
            id: Uuid::new_v4(),
            role: Role::Client,
            credentials: crate::core::db::models::AccountCredentials::External {
                provider_user_id: "gone".to_string(),
            },
            chat_uid: None,
            created_at: chrono::Utc::now(),
        };
        let pair = issuer.make_token_pair(&ghost).await.unwrap();

        let result = issuer.refresh_token_pair(&pair.refresh_token).await;
        assert!(matches!(result, Err(AuthError::NotFound)));
    }

    // ========================================================================
    // Login / Register Tests
    // ========================================================================

    #[tokio::test]
    async fn test_register_uses_default_role() {
        let issuer = create_test_issuer().with_default_role(Role::Partner);

        let id = issuer.register("bob", "hunter2").await.unwrap();
        let account = issuer.accounts().get(id).await.unwrap().unwrap();
        assert_eq!(account.role, Role::Partner);

        let dup = issuer.register("bob", "other").await;
        assert!(matches!(dup, Err(AuthError::DuplicateUsername)));

        let weak = issuer.register("carol", "").await;
        assert!(matches!(weak, Err(AuthError::WeakInput(_))));
    }

    #[tokio::test]
    async fn test_login() {
        let issuer = create_test_issuer();
        let account = create_account(&issuer, Role::Admin).await;

        let (logged_in, pair) = issuer.login("alice", "s3cret").await.unwrap();
        assert_eq!(logged_in.id, account.id);

        let current = issuer.current_account(&pair.access_token).await.unwrap();
        assert_eq!(current.id, account.id);
    }

    #[tokio::test]
    async fn test_login_failures_are_identical() {
        let issuer = create_test_issuer();
        create_account(&issuer, Role::Client).await;

        let wrong_password = issuer.login("alice", "wrong").await.unwrap_err();
        let unknown_user = issuer.login("mallory", "s3cret").await.unwrap_err();

        assert!(matches!(wrong_password, AuthError::InvalidCredentials));
        assert!(matches!(unknown_user, AuthError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
        assert!(issuer.refresh_tokens().is_empty());
    }
}
