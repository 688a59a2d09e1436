//! End-to-end tests of the Bearer gate through an actix test service.

use actix_web::{
    body::{to_bytes, MessageBody},
    dev::{Service, ServiceResponse},
    http::{header::AUTHORIZATION, Method, StatusCode},
    test, web, App, Error, HttpResponse,
};
use bytes::Bytes;
use chrono::Utc;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::settings::{AppSettings, AuthConfig, ErrorDetail, NonceConfig, ServerConfig};
use crate::error::ErrorResponse;
use crate::middleware::BearerAuthentication;
use crate::models::{AppState, Claims};
use crate::routes::configure_app;
use crate::services::auth::token_signer::{sign_raw, sign_token};
use crate::services::auth::{NonceStore, StaticSecretResolver, TokenVerifier, VerifierOptions};

const SECRET: &[u8] = b"s3cr3t";

fn test_settings(error_detail: ErrorDetail, max_outstanding: usize) -> AppSettings {
    AppSettings {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec![],
        },
        auth: AuthConfig {
            secrets_file: None,
            inline_secrets: Some("acme=s3cr3t".to_string()),
            secrets_reload_interval_secs: 0,
            error_detail,
            exp_leeway_secs: 0,
            require_nonce: false,
        },
        nonce: NonceConfig {
            max_outstanding,
            ..NonceConfig::default()
        },
    }
}

fn test_state(error_detail: ErrorDetail, max_outstanding: usize) -> AppState {
    let settings = test_settings(error_detail, max_outstanding);
    let resolver = Arc::new(StaticSecretResolver::from_settings(&settings.auth).unwrap());
    let nonce_store = Arc::new(NonceStore::from_config(&settings.nonce));
    let verifier = Arc::new(TokenVerifier::new(
        resolver,
        Arc::clone(&nonce_store),
        VerifierOptions::from(&settings.auth),
    ));
    AppState::new(Arc::new(settings), nonce_store, verifier)
}

/// Send a request and return status and body, whether the service answered
/// with a response or with an error.
async fn send<S, R, B>(app: &S, req: R) -> (StatusCode, Bytes)
where
    S: Service<R, Response = ServiceResponse<B>, Error = Error>,
    B: MessageBody,
{
    match test::try_call_service(app, req).await {
        Ok(resp) => {
            let status = resp.status();
            (status, test::read_body(resp).await)
        }
        Err(err) => {
            let resp = err.error_response();
            let status = resp.status();
            (status, to_bytes(resp.into_body()).await.unwrap())
        }
    }
}

fn bearer(token: &str) -> (actix_web::http::header::HeaderName, String) {
    (AUTHORIZATION, format!("Bearer {}", token))
}

#[actix_rt::test]
async fn test_nonce_token_round_trip_and_replay() {
    let app = test::init_service(App::new().configure(configure_app(test_state(ErrorDetail::Generic, 100)))).await;

    let (status, body) = send(&app, test::TestRequest::get().uri("/auth/nonce").to_request()).await;
    assert_eq!(status, StatusCode::OK);
    let nonce_body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let nonce = nonce_body["nonce"].as_str().unwrap().to_string();
    assert_eq!(nonce.len(), 64);
    assert!(nonce_body["expiresAt"].as_i64().unwrap() > Utc::now().timestamp());

    let claims = Claims::new("acme")
        .with_exp(Utc::now().timestamp() + 10)
        .with_nonce(nonce);
    let token = sign_token(&claims, SECRET).unwrap();

    let req = test::TestRequest::get().uri("/api/identity").insert_header(bearer(&token)).to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        serde_json::from_slice::<serde_json::Value>(&body).unwrap(),
        serde_json::json!({"issuer": "acme"})
    );

    let replay = test::TestRequest::get().uri("/api/identity").insert_header(bearer(&token)).to_request();
    let (status, body) = send(&app, replay).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        serde_json::from_slice::<ErrorResponse>(&body).unwrap(),
        ErrorResponse {
            status: "error".to_string(),
            code: 401,
            error_type: "authentication_failed".to_string(),
            message: "Authentication failed".to_string(),
        }
    );
}

#[actix_rt::test]
async fn test_detailed_mode_names_the_failed_check() {
    let app = test::init_service(App::new().configure(configure_app(test_state(ErrorDetail::Detailed, 100)))).await;

    let missing = test::TestRequest::get().uri("/api/identity").to_request();
    let (status, body) = send(&app, missing).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let parsed: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed.error_type, "missing_or_malformed_header");

    let unsigned = sign_raw(r#"{"alg":"none","typ":"JWT"}"#, r#"{"iss":"acme"}"#, b"");
    let (unsigned_head, _) = unsigned.rsplit_once('.').unwrap();
    let req = test::TestRequest::get()
        .uri("/api/identity")
        .insert_header(bearer(&format!("{}.", unsigned_head)))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let parsed: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed.error_type, "unsupported_algorithm");

    let expired = sign_token(&Claims::new("acme").with_exp(Utc::now().timestamp() - 5), SECRET).unwrap();
    let req = test::TestRequest::get().uri("/api/identity").insert_header(bearer(&expired)).to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let parsed: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed.error_type, "token_expired");
}

#[actix_rt::test]
async fn test_rejected_requests_never_reach_handler() {
    let state = test_state(ErrorDetail::Generic, 100);
    let hits = web::Data::new(AtomicUsize::new(0));

    let app = test::init_service(
        App::new().app_data(hits.clone()).service(
            web::scope("/api")
                .wrap(BearerAuthentication::new(state.token_verifier.clone(), ErrorDetail::Generic))
                .route(
                    "/count",
                    web::get().to(|hits: web::Data<AtomicUsize>| async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        HttpResponse::Ok().finish()
                    }),
                ),
        ),
    )
    .await;

    let valid = sign_token(&Claims::new("acme"), SECRET).unwrap();
    let forged = sign_token(&Claims::new("acme"), b"guess").unwrap();
    let rejected_headers = [
        None,
        Some(format!("bearer {}", valid)),
        Some(format!("Basic {}", valid)),
        Some("Bearer ".to_string()),
        Some(format!("Bearer {}", forged)),
        Some("Bearer a.b".to_string()),
    ];

    for header in rejected_headers {
        let mut req = test::TestRequest::get().uri("/api/count");
        if let Some(value) = &header {
            req = req.insert_header((AUTHORIZATION, value.as_str()));
        }
        let (status, _) = send(&app, req.to_request()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "header {:?} should be rejected", header);
    }
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let req = test::TestRequest::get().uri("/api/count").insert_header(bearer(&valid)).to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[actix_rt::test]
async fn test_rejection_carries_www_authenticate() {
    let app = test::init_service(App::new().configure(configure_app(test_state(ErrorDetail::Generic, 100)))).await;
    let req = test::TestRequest::get().uri("/api/identity").to_request();

    let err = test::try_call_service(&app, req).await.err();
    if let Some(err) = err {
        let resp = err.error_response();
        assert_eq!(resp.headers().get("www-authenticate").unwrap(), "Bearer");
    } else {
        panic!("request without a token was accepted");
    }
}

#[actix_rt::test]
async fn test_options_preflight_passes_through() {
    let state = test_state(ErrorDetail::Generic, 100);
    let app = test::init_service(
        App::new().service(
            web::scope("/api")
                .wrap(BearerAuthentication::new(state.token_verifier.clone(), ErrorDetail::Generic))
                .route("/identity", web::method(Method::OPTIONS).to(|| async { HttpResponse::NoContent().finish() })),
        ),
    )
    .await;

    let req = test::TestRequest::default()
        .method(Method::OPTIONS)
        .uri("/api/identity")
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[actix_rt::test]
async fn test_health_is_public() {
    let app = test::init_service(App::new().configure(configure_app(test_state(ErrorDetail::Generic, 100)))).await;
    let (status, body) = send(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(status, StatusCode::OK);

    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["status"], "ok");
    assert_eq!(parsed["outstandingNonces"], 0);
}

#[actix_rt::test]
async fn test_nonce_endpoint_reports_capacity() {
    let app = test::init_service(App::new().configure(configure_app(test_state(ErrorDetail::Generic, 1)))).await;

    let (status, _) = send(&app, test::TestRequest::get().uri("/auth/nonce").to_request()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, test::TestRequest::get().uri("/auth/nonce").to_request()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    let parsed: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed.error_type, "too_many_requests");
}

#[actix_rt::test]
async fn test_spent_nonce_frees_its_slot() {
    let app = test::init_service(App::new().configure(configure_app(test_state(ErrorDetail::Generic, 1)))).await;

    let (status, body) = send(&app, test::TestRequest::get().uri("/auth/nonce").to_request()).await;
    assert_eq!(status, StatusCode::OK);
    let nonce_body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let nonce = nonce_body["nonce"].as_str().unwrap().to_string();

    let token = sign_token(&Claims::new("acme").with_nonce(nonce), SECRET).unwrap();
    let req = test::TestRequest::get().uri("/api/identity").insert_header(bearer(&token)).to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, test::TestRequest::get().uri("/auth/nonce").to_request()).await;
    assert_eq!(status, StatusCode::OK);
}
