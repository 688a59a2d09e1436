use actix_web::web;
use crate::handlers;
use crate::middleware::BearerAuthentication;
use crate::models::AppState;

/// Configures API routes that REQUIRE a Bearer token.
/// Mounted under the "/api" scope and wrapped with BearerAuthentication.
/// User, group and account handlers are registered here by the embedding service.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/identity", web::get().to(handlers::auth::get_identity));
}

/// Configures public authentication routes (not part of /api).
/// Mounted under the "/auth" scope.
pub fn configure_public_auth_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/nonce", web::get().to(handlers::auth::issue_nonce));
}

/// Registers shared state, the public endpoints and the protected "/api" scope.
pub fn configure_app(state: AppState) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg: &mut web::ServiceConfig| {
        let gate = BearerAuthentication::new(
            state.token_verifier.clone(),
            state.settings.auth.error_detail,
        );

        cfg.app_data(web::Data::new(state))
            // Register health check endpoint without auth
            .service(web::resource("/health").route(web::get().to(handlers::health::health_check)))
            .service(web::scope("/auth").configure(configure_public_auth_routes))
            .service(web::scope("/api").wrap(gate).configure(configure_routes));
    }
}
