//! Store implementations for Keyturn
//!
//! PostgreSQL repositories for production and `DashMap`-backed stores for tests
//! and database-less runs. Both implement the traits in [`crate::core::db::store`].

pub mod account;
pub mod memory;
pub mod refresh_token;

pub use account::AccountRepository;
pub use memory::{MemoryAccountStore, MemoryRefreshTokenStore};
pub use refresh_token::RefreshTokenRepository;
