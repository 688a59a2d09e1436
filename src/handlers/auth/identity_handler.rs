use actix_web::HttpResponse;

use crate::models::AuthenticatedIdentity;

/// Echo the issuer the Bearer token was verified for.
pub async fn get_identity(identity: AuthenticatedIdentity) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "issuer": identity.issuer
    }))
}
