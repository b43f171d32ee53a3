//! Keyturn - account credentials and token lifecycle service
//!
//! Local accounts with bcrypt-hashed passwords, short-lived signed access
//! tokens, and single-use rotating refresh tokens, served over HTTP with
//! axum. A chat server can delegate its logins through the REST bridge.

pub mod core;
