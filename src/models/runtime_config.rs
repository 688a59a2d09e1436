use std::sync::Arc;

use crate::config::AppSettings;
use crate::services::auth::{NonceStore, TokenVerifier};

/// Application state shared across request handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<AppSettings>,
    pub nonce_store: Arc<NonceStore>,
    pub token_verifier: Arc<TokenVerifier>,
}

impl AppState {
    pub fn new(
        settings: Arc<AppSettings>,
        nonce_store: Arc<NonceStore>,
        token_verifier: Arc<TokenVerifier>,
    ) -> Self {
        Self {
            settings,
            nonce_store,
            token_verifier,
        }
    }
}
