use actix_web::{
    dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::ResponseError,
    http::{
        header::{HeaderMap, HeaderValue, AUTHORIZATION, WWW_AUTHENTICATE},
        Method, StatusCode,
    },
    Error, FromRequest, HttpMessage, HttpRequest, HttpResponse,
};
use futures_util::future::{ok, ready, Ready};
use log::{debug, error, warn};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use uuid::Uuid;

use crate::config::ErrorDetail;
use crate::error::{ErrorResponse, VerificationError};
use crate::models::auth_jwt_claims::AuthenticatedIdentity;
use crate::services::auth::TokenVerifier;

const BEARER_PREFIX: &str = "Bearer ";

// Marker struct to indicate request has already been processed by auth middleware
#[derive(Debug)]
struct AuthProcessed;

/// Extract the token from `Authorization: Bearer <token>`.
///
/// The scheme word is matched case-sensitively and must be followed by
/// exactly one space and a non-empty token.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, VerificationError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(VerificationError::MissingOrMalformedHeader)?
        .to_str()
        .map_err(|_| VerificationError::MissingOrMalformedHeader)?;

    match value.strip_prefix(BEARER_PREFIX) {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(VerificationError::MissingOrMalformedHeader),
    }
}

/// Rejection produced by the gate, rendered according to the disclosure policy.
#[derive(Debug)]
pub struct AuthRejection {
    pub error: VerificationError,
    pub detail: ErrorDetail,
}

impl AuthRejection {
    pub fn new(error: VerificationError, detail: ErrorDetail) -> Self {
        Self { error, detail }
    }

    fn error_type(&self) -> &'static str {
        match (self.detail, self.error.is_internal()) {
            (_, true) => "internal_error",
            (ErrorDetail::Generic, false) => "authentication_failed",
            (ErrorDetail::Detailed, false) => self.error.kind(),
        }
    }

    fn message(&self) -> String {
        match (self.detail, self.error.is_internal()) {
            (_, true) => "Internal server error".to_string(),
            (ErrorDetail::Generic, false) => "Authentication failed".to_string(),
            (ErrorDetail::Detailed, false) => self.error.to_string(),
        }
    }
}

impl fmt::Display for AuthRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl ResponseError for AuthRejection {
    fn status_code(&self) -> StatusCode {
        if self.error.is_internal() {
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
        match (self.detail, &self.error) {
            (ErrorDetail::Detailed, VerificationError::MissingOrMalformedHeader)
            | (ErrorDetail::Detailed, VerificationError::MalformedToken(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let mut response = HttpResponse::build(status_code);
        if !self.error.is_internal() {
            response.insert_header((WWW_AUTHENTICATE, HeaderValue::from_static("Bearer")));
        }
        response.json(ErrorResponse::new(status_code, self.error_type(), self.message()))
    }
}

// Handlers behind the gate take the verified issuer as an argument
impl FromRequest for AuthenticatedIdentity {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let identity = req.extensions().get::<AuthenticatedIdentity>().cloned();
        ready(identity.ok_or_else(|| {
            error!(
                "AuthenticatedIdentity not found in request extensions. Bearer middleware might not wrap path: {}",
                req.path()
            );
            actix_web::error::ErrorInternalServerError("Authentication context not found")
        }))
    }
}

/// Middleware that admits only requests carrying a valid Bearer token.
#[derive(Clone)]
pub struct BearerAuthentication {
    verifier: Arc<TokenVerifier>,
    error_detail: ErrorDetail,
}

impl BearerAuthentication {
    pub fn new(verifier: Arc<TokenVerifier>, error_detail: ErrorDetail) -> Self {
        Self {
            verifier,
            error_detail,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for BearerAuthentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = BearerAuthenticationMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(BearerAuthenticationMiddleware {
            service: Arc::new(service),
            verifier: self.verifier.clone(),
            error_detail: self.error_detail,
        })
    }
}

pub struct BearerAuthenticationMiddleware<S> {
    service: Arc<S>,
    verifier: Arc<TokenVerifier>,
    error_detail: ErrorDetail,
}

impl<S, B> Service<ServiceRequest> for BearerAuthenticationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        // A token must never be verified twice, its nonce would already be spent
        if req.extensions().get::<AuthProcessed>().is_some() {
            debug!("Request already processed by bearer middleware, skipping");
            return Box::pin(service.call(req));
        }

        // Skip auth check for OPTIONS requests (CORS pre-flight)
        if req.method() == Method::OPTIONS {
            debug!("Skipping authentication for OPTIONS request to: {}", req.path());
            return Box::pin(service.call(req));
        }

        req.extensions_mut().insert(AuthProcessed);

        let request_id = Uuid::new_v4();
        let detail = self.error_detail;

        let outcome = extract_bearer_token(req.headers())
            .and_then(|token| self.verifier.verify(token));

        match outcome {
            Ok(identity) => {
                debug!(
                    "Bearer token accepted for issuer {} on {} {} (request: {})",
                    identity.issuer,
                    req.method(),
                    req.path(),
                    request_id
                );
                req.extensions_mut().insert(identity);
                Box::pin(service.call(req))
            }
            Err(e) => {
                if e.is_internal() {
                    error!(
                        "Authentication aborted on {} {} (request: {}): {}",
                        req.method(),
                        req.path(),
                        request_id,
                        e
                    );
                } else {
                    warn!(
                        "Authentication rejected on {} {} (request: {}, reason: {})",
                        req.method(),
                        req.path(),
                        request_id,
                        e.kind()
                    );
                }
                Box::pin(ready(Err(Error::from(AuthRejection::new(e, detail)))))
            }
        }
    }
}
