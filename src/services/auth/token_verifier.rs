use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use log::{debug, error, trace};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::config::settings::AuthConfig;
use crate::error::VerificationError;
use crate::models::auth_jwt_claims::{
    AuthenticatedIdentity, Claims, TokenHeader, ACCEPTED_ALGORITHM, TOKEN_TYPE,
};
use crate::security::signature::verify_hmac_sha256;

use super::nonce_store::NonceStore;
use super::secret_resolver::SecretResolver;

/// Tokens longer than this are rejected before any decoding.
pub const MAX_TOKEN_LENGTH: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct VerifierOptions {
    /// Seconds of tolerance added to `exp`.
    pub exp_leeway_secs: i64,
    /// Reject tokens that carry no nonce.
    pub require_nonce: bool,
}

impl From<&AuthConfig> for VerifierOptions {
    fn from(config: &AuthConfig) -> Self {
        Self {
            exp_leeway_secs: config.exp_leeway_secs,
            require_nonce: config.require_nonce,
        }
    }
}

/// Verifies compact HS256 tokens signed with a per-issuer shared secret.
pub struct TokenVerifier {
    resolver: Arc<dyn SecretResolver>,
    nonce_store: Arc<NonceStore>,
    options: VerifierOptions,
}

impl TokenVerifier {
    pub fn new(
        resolver: Arc<dyn SecretResolver>,
        nonce_store: Arc<NonceStore>,
        options: VerifierOptions,
    ) -> Self {
        Self {
            resolver,
            nonce_store,
            options,
        }
    }

    /// Verify a token against the wall clock.
    pub fn verify(&self, token: &str) -> Result<AuthenticatedIdentity, VerificationError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a token as of `now`.
    ///
    /// Checks run in a fixed order: structure, algorithm, issuer, signature,
    /// expiry, nonce. Claims of a token are only looked at after its signature
    /// is known to be good, and the nonce is only consumed once every other
    /// check has passed.
    pub fn verify_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthenticatedIdentity, VerificationError> {
        trace!("Verifying bearer token");

        if token.len() > MAX_TOKEN_LENGTH {
            return Err(VerificationError::MalformedToken("token is too long".to_string()));
        }

        let segments: Vec<&str> = token.split('.').collect();
        let [header_b64, payload_b64, signature_b64] = segments.as_slice() else {
            return Err(VerificationError::MalformedToken(format!(
                "expected 3 segments, found {}",
                segments.len()
            )));
        };

        let header: TokenHeader = decode_segment(header_b64, "header")?;
        if header.alg != ACCEPTED_ALGORITHM {
            return Err(VerificationError::UnsupportedAlgorithm(
                header.alg.chars().take(32).collect(),
            ));
        }
        if let Some(typ) = &header.typ {
            if !typ.eq_ignore_ascii_case(TOKEN_TYPE) {
                return Err(VerificationError::MalformedToken("unsupported token type".to_string()));
            }
        }

        let claims: Claims = decode_segment(payload_b64, "payload")?;
        let issuer = claims
            .iss
            .as_deref()
            .filter(|iss| !iss.trim().is_empty())
            .ok_or(VerificationError::MissingIssuer)?;

        let secret = self
            .resolver
            .resolve(issuer)
            .map_err(|e| {
                error!("Secret resolver failed while verifying a token: {}", e);
                VerificationError::SecretStoreUnavailable(e.to_string())
            })?
            .ok_or(VerificationError::UnknownIssuer)?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| VerificationError::InvalidSignature)?;
        let signing_input = &token[..header_b64.len() + 1 + payload_b64.len()];
        if !verify_hmac_sha256(secret.expose(), signing_input.as_bytes(), &signature) {
            return Err(VerificationError::InvalidSignature);
        }

        if let Some(exp) = claims.exp {
            if now.timestamp() >= exp.saturating_add(self.options.exp_leeway_secs) {
                return Err(VerificationError::TokenExpired);
            }
        }

        match claims.nonce.as_deref() {
            Some(nonce) => {
                if !self.nonce_store.consume_at(nonce, now) {
                    return Err(VerificationError::NonceReplayOrUnknown);
                }
            }
            None if self.options.require_nonce => {
                return Err(VerificationError::NonceReplayOrUnknown);
            }
            None => {}
        }

        debug!("Token verified for issuer {}", issuer);
        Ok(AuthenticatedIdentity {
            issuer: issuer.to_string(),
        })
    }
}

fn decode_segment<T: DeserializeOwned>(segment: &str, name: &str) -> Result<T, VerificationError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| VerificationError::MalformedToken(format!("{} is not base64url", name)))?;
    serde_json::from_slice(&bytes)
        .map_err(|_| VerificationError::MalformedToken(format!("{} is not a valid JSON object", name)))
}
