use actix_web::{web, HttpResponse, Responder};
use serde::{Serialize, Deserialize};

use crate::models::AppState;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: String,
    version: String,
    outstanding_nonces: usize,
}

pub async fn health_check(state: web::Data<AppState>) -> impl Responder {
    // Public endpoint: no issuer names, no secrets
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        outstanding_nonces: state.nonce_store.outstanding(),
    };

    HttpResponse::Ok().json(response)
}
