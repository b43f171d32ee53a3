//! Auth API endpoints
//!
//! Provides REST API endpoints for authentication:
//! - POST /api/auth/register - Register a local account
//! - POST /api/auth/login - Login and get tokens
//! - POST /api/auth/refresh - Exchange a refresh token for a new pair
//! - GET /api/auth/me - Get current account info
//!
//! Failures carry no detail: every auth failure is "authentication failed",
//! every rejected registration is "registration failed".

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;

use crate::core::auth::issuer::{
    AuthError, LoginRequest, RefreshRequest, RegisterRequest, TokenIssuer, TokenPair,
};
use crate::core::db::models::{AccountId, AccountResponse};
use crate::core::db::store::{AccountStore, RefreshTokenStore};

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

/// Convert AuthError to API response
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message, code) = match &self {
            AuthError::InvalidCredentials | AuthError::InvalidToken | AuthError::NotFound => (
                StatusCode::UNAUTHORIZED,
                "authentication failed",
                "AUTHENTICATION_FAILED",
            ),
            AuthError::DuplicateUsername | AuthError::WeakInput(_) => (
                StatusCode::BAD_REQUEST,
                "registration failed",
                "REGISTRATION_FAILED",
            ),
            AuthError::Internal(detail) => {
                tracing::error!("Internal auth error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error",
                    "INTERNAL_ERROR",
                )
            }
        };

        (status, Json(ApiError::new(message, code))).into_response()
    }
}

/// Response for registration
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: AccountId,
}

/// Create the auth API router
pub fn auth_api_router<A, R>(issuer: TokenIssuer<A, R>) -> Router
where
    A: AccountStore,
    R: RefreshTokenStore,
{
    let state = Arc::new(issuer);

    Router::new()
        .route("/api/auth/register", post(register_handler::<A, R>))
        .route("/api/auth/login", post(login_handler::<A, R>))
        .route("/api/auth/refresh", post(refresh_handler::<A, R>))
        .route("/api/auth/me", get(me_handler::<A, R>))
        .with_state(state)
}

/// POST /api/auth/register
/// Register a local account with the default role
async fn register_handler<A: AccountStore, R: RefreshTokenStore>(
    State(issuer): State<Arc<TokenIssuer<A, R>>>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, AuthError> {
    tracing::info!("Registration attempt for username: {}", request.username);

    let id = issuer
        .register(&request.username, &request.password)
        .await
        .inspect_err(|e| tracing::info!("Registration rejected: {}", e))?;

    tracing::info!("Account registered: {}", id);

    Ok(Json(RegisterResponse { id }))
}

/// POST /api/auth/login
/// Login and get access/refresh tokens
async fn login_handler<A: AccountStore, R: RefreshTokenStore>(
    State(issuer): State<Arc<TokenIssuer<A, R>>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenPair>, AuthError> {
    match issuer.login(&request.username, &request.password).await {
        Ok((account, tokens)) => {
            tracing::info!("Login succeeded for account: {}", account.id);
            Ok(Json(tokens))
        }
        Err(e) => {
            tracing::info!("Login failed for username: {}", request.username);
            Err(e)
        }
    }
}

/// POST /api/auth/refresh
/// Rotate a refresh token
async fn refresh_handler<A: AccountStore, R: RefreshTokenStore>(
    State(issuer): State<Arc<TokenIssuer<A, R>>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, AuthError> {
    tracing::debug!("Token refresh request");

    let tokens = issuer.refresh_token_pair(&request.refresh_token).await?;

    Ok(Json(tokens))
}

/// GET /api/auth/me
/// Get current account info from access token
async fn me_handler<A: AccountStore, R: RefreshTokenStore>(
    State(issuer): State<Arc<TokenIssuer<A, R>>>,
    headers: HeaderMap,
) -> Result<Json<AccountResponse>, AuthError> {
    let token = extract_bearer_token(&headers)?;

    let account = issuer.current_account(&token).await?;

    Ok(Json(account.into()))
}

/// Extract Bearer token from Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::InvalidToken)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidToken)?;

    if token.is_empty() {
        return Err(AuthError::InvalidToken);
    }

    Ok(token.to_string())
}
