pub mod bearer_auth;

pub use bearer_auth::{extract_bearer_token, AuthRejection, BearerAuthentication};

#[cfg(test)]
mod bearer_auth_test;
