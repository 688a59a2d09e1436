use actix_cors::Cors;
use actix_web::{middleware::Logger, App, HttpServer};
use dotenv::dotenv;
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use authgate_server::config::AppSettings;
use authgate_server::models::AppState;
use authgate_server::routes::configure_app;
use authgate_server::services::auth::{NonceStore, StaticSecretResolver, TokenVerifier, VerifierOptions};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // Load application settings
    let app_settings = match AppSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Failed to load application settings: {}", e);
            log::error!("Cannot start server without valid settings");
            std::process::exit(1);
        }
    };

    // Load issuer secrets
    let resolver = match StaticSecretResolver::from_settings(&app_settings.auth) {
        Ok(resolver) => Arc::new(resolver),
        Err(e) => {
            log::error!("Failed to load issuer secrets: {}", e);
            log::error!("Cannot start server without issuer secrets");
            std::process::exit(1);
        }
    };
    if resolver.is_empty() {
        log::error!("Cannot start server without at least one issuer secret");
        std::process::exit(1);
    }
    log::info!("Loaded secrets for {} issuer(s): {}", resolver.len(), resolver.issuers().join(", "));

    let nonce_store = Arc::new(NonceStore::from_config(&app_settings.nonce));
    let token_verifier = Arc::new(TokenVerifier::new(
        resolver.clone(),
        nonce_store.clone(),
        VerifierOptions::from(&app_settings.auth),
    ));

    let purge_task = nonce_store.start_purge_task(Duration::from_secs(app_settings.nonce.purge_interval_secs));

    let reload_task = match (&app_settings.auth.secrets_file, app_settings.auth.secrets_reload_interval_secs) {
        (Some(file), interval) if interval > 0 => Some(resolver.start_reload_task(
            PathBuf::from(file),
            app_settings.auth.inline_secrets.clone(),
            Duration::from_secs(interval),
        )),
        _ => None,
    };

    log::info!(
        "Authentication errors are reported in {:?} mode, nonce TTL {}s",
        app_settings.auth.error_detail,
        app_settings.nonce.ttl_secs
    );

    // Get server host and port from settings
    let host = app_settings.server.host.clone();
    let port = app_settings.server.port;
    let cors_origins = app_settings.server.cors_origins.clone();

    log::info!("Starting server at http://{}:{}", host, port);

    let listener = TcpListener::bind(format!("{}:{}", host, port))?;
    let state = AppState::new(Arc::new(app_settings), nonce_store, token_verifier);

    let result = HttpServer::new(move || {
        // Configure CORS using actix-cors
        let mut cors = Cors::default();

        // Add allowed origins based on configuration
        if cors_origins.iter().any(|origin| origin == "*") {
            cors = cors.allow_any_origin();
        } else {
            for origin in &cors_origins {
                cors = cors.allowed_origin(origin);
            }
        }

        // Common CORS settings for all origins
        cors = cors.allow_any_method().allow_any_header();

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .configure(configure_app(state.clone()))
    })
    .listen(listener)?
    .run()
    .await;

    purge_task.abort();
    if let Some(task) = reload_task {
        task.abort();
    }
    log::info!("Server stopped");

    result
}
