//! Ceremony Coordinator Service
//!
//! HTTP front for key generation and offline signing ceremonies.
//!
//! ## Responsibilities
//!
//! - Authenticate callers and validate ceremony requests
//! - Burn each payload id exactly once in the ledger
//! - Dispatch accepted ceremonies to the signing engine
//! - Return every outcome as a result envelope
//!
//! ## Security
//!
//! - Transport guarded by `INTERNAL_SERVICE_TOKEN`
//! - Per-request ceremony auth via `CEREMONY_AUTH_TOKEN`
//! - Rate limits all endpoints per IP

use actix_governor::Governor;
use actix_web::{App, HttpServer, middleware, web};
use ceremony_coordinator::{
    DefaultCoordinator,
    config::Settings,
    middleware::{InternalAuth, RateLimitConfig, ceremony_limiter_config},
    routes, telemetry,
};
use tracing_actix_web::TracingLogger;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize tracing first
    telemetry::init_tracing();

    // Load and validate settings
    let settings = Settings::from_env();

    if let Err(message) = settings.validate() {
        tracing::error!("{message}");
        std::process::exit(1);
    }

    // Ledger and engine
    let coordinator = match DefaultCoordinator::from_settings(&settings) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create coordinator");
            std::process::exit(1);
        }
    };

    let rate_config = RateLimitConfig::from_settings(&settings);
    let governor_config = match ceremony_limiter_config(&rate_config) {
        Ok(config) => config,
        Err(message) => {
            tracing::error!("{message}");
            std::process::exit(1);
        }
    };
    tracing::info!(
        ceremonies_per_hour = rate_config.ceremonies_per_hour,
        burst = rate_config.burst,
        "Rate limiting enabled"
    );

    let addr = settings.socket_addr();
    tracing::info!(
        addr = %addr,
        ciphersuite = %settings.ciphersuite(),
        persistent_ledger = settings.db_path().is_some(),
        ceremony_auth = settings.auth_token().is_some(),
        "Starting ceremony coordinator"
    );

    let internal_auth = InternalAuth::new(&settings);
    let json_config = routes::json_config(settings.body_limit_bytes());
    let settings_data = web::Data::new(settings);
    let coordinator_data = web::Data::new(coordinator);

    HttpServer::new(move || {
        App::new()
            // Middleware runs in reverse registration order: the last `.wrap`
            // sees a request first.
            // Service token
            .wrap(internal_auth.clone())
            // Default headers
            .wrap(middleware::DefaultHeaders::new().add(("X-Service", "ceremony-coordinator")))
            // Request tracing
            .wrap(TracingLogger::default())
            // Rate limiting (outermost, runs first)
            .wrap(Governor::new(&governor_config))
            // Shared state
            .app_data(settings_data.clone())
            .app_data(coordinator_data.clone())
            .app_data(json_config.clone())
            // Routes
            .configure(routes::health::configure)
            .configure(routes::ceremony::configure)
    })
    .bind(addr)?
    .run()
    .await?;

    // Shutdown tracing
    telemetry::shutdown_tracing();

    Ok(())
}
