use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::error::Error as StdError;

#[derive(Debug)]
pub enum AppError {
    Internal(String),
    Configuration(String),
    TooManyRequests(String),
}

/// JSON body returned for every failed request.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub status: String,
    pub code: u16,
    pub error_type: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(status_code: StatusCode, error_type: &str, message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            code: status_code.as_u16(),
            error_type: error_type.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(e) => write!(f, "Internal error: {}", e),
            AppError::Configuration(e) => write!(f, "Configuration error: {}", e),
            AppError::TooManyRequests(e) => write!(f, "Too many requests: {}", e),
        }
    }
}

impl StdError for AppError {}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let (error_type, message) = match self {
            // Internal details stay in the server log
            AppError::Internal(_) => ("internal_error", "Internal server error".to_string()),
            AppError::Configuration(_) => ("configuration_error", "Internal server error".to_string()),
            AppError::TooManyRequests(_) => ("too_many_requests", self.to_string()),
        };

        HttpResponse::build(status_code).json(ErrorResponse::new(status_code, error_type, message))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

/// Outcome of a failed token verification.
///
/// Every variant except `SecretStoreUnavailable` describes bad credentials
/// supplied by the caller and maps to a 4xx response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("Missing or malformed Authorization header, expected 'Bearer <token>'")]
    MissingOrMalformedHeader,
    #[error("Malformed token: {0}")]
    MalformedToken(String),
    #[error("Unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("Token is missing the issuer claim")]
    MissingIssuer,
    #[error("Unknown token issuer")]
    UnknownIssuer,
    #[error("Invalid token signature")]
    InvalidSignature,
    #[error("Token has expired")]
    TokenExpired,
    #[error("Nonce was already used or is unknown")]
    NonceReplayOrUnknown,
    #[error("Secret store unavailable: {0}")]
    SecretStoreUnavailable(String),
}

impl VerificationError {
    /// Stable snake_case name used in logs and detailed error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            VerificationError::MissingOrMalformedHeader => "missing_or_malformed_header",
            VerificationError::MalformedToken(_) => "malformed_token",
            VerificationError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            VerificationError::MissingIssuer => "missing_issuer",
            VerificationError::UnknownIssuer => "unknown_issuer",
            VerificationError::InvalidSignature => "invalid_signature",
            VerificationError::TokenExpired => "token_expired",
            VerificationError::NonceReplayOrUnknown => "nonce_replay_or_unknown",
            VerificationError::SecretStoreUnavailable(_) => "internal_error",
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, VerificationError::SecretStoreUnavailable(_))
    }
}

/// Failure of the nonce store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NonceError {
    #[error("nonce store is at capacity ({0} outstanding nonces)")]
    CapacityExceeded(usize),
}

impl From<NonceError> for AppError {
    fn from(error: NonceError) -> Self {
        match error {
            NonceError::CapacityExceeded(_) => {
                AppError::TooManyRequests("Nonce capacity exhausted, retry later".to_string())
            }
        }
    }
}

/// Failure of a secret resolver backend, or of loading its configuration.
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("secret store unavailable: {0}")]
    Unavailable(String),
    #[error("failed to read secrets file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid secrets: {0}")]
    Invalid(String),
}
