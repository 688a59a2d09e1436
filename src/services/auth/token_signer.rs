use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use log::{debug, error};

use crate::error::AppError;
use crate::models::auth_jwt_claims::Claims;

// Default token lifetime in seconds
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 60;

/// Sign claims into a compact HS256 token, the way a client builds its Bearer token.
pub fn sign_token(claims: &Claims, secret: &[u8]) -> Result<String, AppError> {
    let encoding_key = EncodingKey::from_secret(secret);

    // HS256 is the only algorithm the verifier accepts
    let header = Header::new(Algorithm::HS256);

    encode(&header, claims, &encoding_key).map_err(|e| {
        error!("Failed to sign token: {}", e);
        AppError::Internal(format!("Token signing failed: {}", e))
    })
}

/// Build a token for `issuer` that expires after `ttl` and carries `nonce` if given.
pub fn create_token(
    issuer: &str,
    secret: &[u8],
    nonce: Option<&str>,
    ttl: Option<Duration>,
) -> Result<String, AppError> {
    let exp = Utc::now()
        .checked_add_signed(ttl.unwrap_or_else(|| Duration::seconds(DEFAULT_TOKEN_TTL_SECS)))
        .ok_or_else(|| AppError::Internal("Failed to calculate token expiration time".to_string()))?;

    let mut claims = Claims::new(issuer).with_exp(exp.timestamp());
    if let Some(nonce) = nonce {
        claims = claims.with_nonce(nonce);
    }

    debug!("Creating token for issuer {} (exp: {})", issuer, exp);
    sign_token(&claims, secret)
}

/// Sign arbitrary header and payload JSON (for testing purposes).
#[cfg(test)]
pub fn sign_raw(header_json: &str, payload_json: &str, secret: &[u8]) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header_json),
        URL_SAFE_NO_PAD.encode(payload_json)
    );
    let tag = crate::security::signature::hmac_sha256(secret, signing_input.as_bytes());
    format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(tag))
}
