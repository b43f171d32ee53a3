//! Database module for Keyturn
//!
//! This module provides database connectivity, models, the store contracts and
//! their implementations for persistent storage using PostgreSQL and SQLx.

pub mod models;
pub mod pool;
pub mod repositories;
pub mod store;

// Re-export commonly used items
pub use models::*;
pub use pool::{DbConfig, DbError, create_pool, create_pool_with_migrations, health_check};
pub use repositories::{
    AccountRepository, MemoryAccountStore, MemoryRefreshTokenStore, RefreshTokenRepository,
};
pub use store::{AccountStore, AccountStoreError, RefreshTokenStore, RefreshTokenStoreError};

// Re-export sqlx types that might be needed
pub use sqlx::PgPool;
