//! Authgate Server Library
//!
//! Bearer-token authentication core: one-time nonces, per-issuer HMAC
//! secrets, HS256 token verification and the actix-web gate that ties
//! them together. The server binary wires these into an HTTP service.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod security;
pub mod services;

// Re-export commonly used types for convenience
pub use config::AppSettings;
pub use error::AppError;
pub use models::runtime_config::AppState;
