//! Authentication module for Keyturn
//!
//! This module provides:
//! - Password hashing and verification
//! - Signing and verification of access/refresh tokens
//! - Token pair issuing with single-use refresh rotation
//! - REST API endpoints for auth operations

pub mod api;
pub mod issuer;
pub mod jwt;
pub mod password;

pub use api::{ApiError, auth_api_router};
pub use issuer::{
    AuthError, LoginRequest, RefreshRequest, RegisterRequest, TokenIssuer, TokenPair, TokenTtl,
};
pub use jwt::{AccessClaims, RefreshClaims, SigningSecret, TokenClaims, TokenCodec, TokenError};
pub use password::{PasswordError, PasswordHasher};
