pub mod auth_jwt_claims;
pub mod runtime_config;
pub use auth_jwt_claims::*;
pub use runtime_config::*;
