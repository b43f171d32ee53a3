//! Accounts, credentials and the token lifecycle

pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
