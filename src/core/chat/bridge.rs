//! REST authenticator for the chat server
//!
//! The chat server POSTs `{endpoint, name, secret, rec}` to `/chat/auth` and
//! always expects HTTP 200; failures travel in the `err` field. `secret` is
//! base64: `username:password` for the `basic` scheme, an access token for any
//! other scheme.

use axum::{
    Json, Router, extract::State, extract::rejection::JsonRejection, routing::post,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::auth::jwt::{AccessClaims, TokenCodec};
use crate::core::db::models::{Account, AccountId, Role};
use crate::core::db::store::{AccountStore, AccountStoreError};

/// Auth level granted to every authenticated chat session
const AUTH_LEVEL: &str = "auth";

/// Chat-side account features: validated
const FEATURES: &str = "V";

/// Default access for chat accounts created on first login
const NEW_ACCOUNT_AUTH: &str = "JRW";
const NEW_ACCOUNT_ANON: &str = "N";

/// Bridge errors, reported to the chat server as `{"err": "<code>"}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("failed")]
    Failed,

    #[error("malformed")]
    Malformed,

    #[error("unsupported")]
    Unsupported,
}

impl From<AccountStoreError> for BridgeError {
    fn from(err: AccountStoreError) -> Self {
        match err {
            AccountStoreError::NotFound => {}
            other => tracing::warn!("Chat bridge store error: {}", other),
        }
        BridgeError::Failed
    }
}

/// Request from the chat server
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeRequest {
    pub endpoint: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub rec: Option<ChatRecord>,
}

/// Chat-side view of an authenticated user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authlvl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl ChatRecord {
    fn authenticated(uid: Option<String>, role: Role) -> Self {
        Self {
            uid,
            authlvl: Some(AUTH_LEVEL.to_string()),
            features: Some(FEATURES.to_string()),
            tags: vec![format!("role:{}", role)],
            state: Some("ok".to_string()),
        }
    }
}

/// Instructions for creating the chat-side account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewAccount {
    pub auth: String,
    pub anon: String,
}

/// Response to the chat server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BridgeResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rec: Option<ChatRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strarr: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newacc: Option<NewAccount>,
}

impl From<BridgeError> for BridgeResponse {
    fn from(err: BridgeError) -> Self {
        Self {
            err: Some(err.to_string()),
            ..Default::default()
        }
    }
}

impl BridgeResponse {
    /// Record for `role`, asking the chat server to create the user when there
    /// is no chat uid yet
    fn for_user(chat_uid: Option<String>, role: Role) -> Self {
        let newacc = chat_uid.is_none().then(|| NewAccount {
            auth: NEW_ACCOUNT_AUTH.to_string(),
            anon: NEW_ACCOUNT_ANON.to_string(),
        });

        Self {
            rec: Some(ChatRecord::authenticated(chat_uid, role)),
            newacc,
            ..Default::default()
        }
    }
}

/// Who presented the secret
enum Identity {
    Account(Account),
    Token(AccessClaims),
}

impl Identity {
    fn account_id(&self) -> Result<AccountId, BridgeError> {
        match self {
            Identity::Account(account) => Ok(account.id),
            Identity::Token(claims) => claims.account_id().map_err(|_| BridgeError::Failed),
        }
    }
}

/// Answers the chat server's authenticator calls
#[derive(Clone)]
pub struct ChatBridge<A> {
    accounts: A,
    codec: TokenCodec,
}

impl<A: AccountStore> ChatBridge<A> {
    pub fn new(accounts: A, codec: TokenCodec) -> Self {
        Self { accounts, codec }
    }

    /// Dispatch one authenticator call
    pub async fn handle(&self, request: &BridgeRequest) -> BridgeResponse {
        tracing::debug!("Chat bridge request: endpoint={}", request.endpoint);

        let result = match request.endpoint.as_str() {
            "auth" => self.auth(request).await,
            "link" => self.link(request).await,
            "rtagns" => Ok(BridgeResponse {
                strarr: Some(vec!["role".to_string()]),
                ..Default::default()
            }),
            _ => Err(BridgeError::Unsupported),
        };

        result.unwrap_or_else(BridgeResponse::from)
    }

    async fn auth(&self, request: &BridgeRequest) -> Result<BridgeResponse, BridgeError> {
        match self.authenticate(request).await? {
            Identity::Account(account) => Ok(BridgeResponse::for_user(account.chat_uid, account.role)),
            Identity::Token(claims) => {
                if let Some(chat_uid) = &claims.chat_uid {
                    return Ok(BridgeResponse::for_user(Some(chat_uid.clone()), claims.role));
                }

                let account_id = claims.account_id().map_err(|_| BridgeError::Failed)?;
                let account = self
                    .accounts
                    .get(account_id)
                    .await?
                    .ok_or(BridgeError::Failed)?;

                Ok(BridgeResponse::for_user(account.chat_uid, account.role))
            }
        }
    }

    async fn link(&self, request: &BridgeRequest) -> Result<BridgeResponse, BridgeError> {
        let chat_uid = request
            .rec
            .as_ref()
            .and_then(|rec| rec.uid.as_deref())
            .filter(|uid| !uid.is_empty())
            .ok_or(BridgeError::Malformed)?;

        let account_id = self.authenticate(request).await?.account_id()?;
        self.accounts.link_chat(account_id, chat_uid).await?;

        tracing::info!("Linked chat user {} to account {}", chat_uid, account_id);

        Ok(BridgeResponse::default())
    }

    async fn authenticate(&self, request: &BridgeRequest) -> Result<Identity, BridgeError> {
        let secret = STANDARD
            .decode(&request.secret)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or(BridgeError::Failed)?;

        if request.name == "basic" {
            let (username, password) = secret.split_once(':').ok_or(BridgeError::Failed)?;
            let account = self
                .accounts
                .find_local(username, password)
                .await?
                .ok_or(BridgeError::Failed)?;
            Ok(Identity::Account(account))
        } else {
            let claims = self
                .codec
                .verify::<AccessClaims>(&secret)
                .map_err(|_| BridgeError::Failed)?;
            Ok(Identity::Token(claims))
        }
    }
}

/// Create the chat bridge router
pub fn chat_bridge_router<A: AccountStore>(bridge: ChatBridge<A>) -> Router {
    Router::new()
        .route("/chat/auth", post(chat_auth_handler::<A>))
        .with_state(Arc::new(bridge))
}

/// POST /chat/auth
async fn chat_auth_handler<A: AccountStore>(
    State(bridge): State<Arc<ChatBridge<A>>>,
    request: Result<Json<BridgeRequest>, JsonRejection>,
) -> Json<BridgeResponse> {
    match request {
        Ok(Json(request)) => Json(bridge.handle(&request).await),
        Err(rejection) => {
            tracing::debug!("Malformed chat bridge request: {}", rejection);
            Json(BridgeError::Malformed.into())
        }
    }
}
