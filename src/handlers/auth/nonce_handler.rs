use actix_web::{web, HttpResponse};
use log::debug;
use serde::Serialize;

use crate::error::AppError;
use crate::models::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceResponse {
    pub nonce: String,
    /// Unix seconds after which the nonce is no longer accepted
    pub expires_at: i64,
}

/// Issue a single-use nonce for the client to embed in its next token.
pub async fn issue_nonce(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let issued = state.nonce_store.issue()?;
    debug!("Issued nonce, {} outstanding", state.nonce_store.outstanding());

    Ok(HttpResponse::Ok()
        .insert_header(("Cache-Control", "no-store"))
        .json(NonceResponse {
            nonce: issued.nonce,
            expires_at: issued.expires_at.timestamp(),
        }))
}
