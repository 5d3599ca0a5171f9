//! Health check and build info endpoints.
//!
//! These endpoints are public (no authentication required).

use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};

use crate::config::Settings;

const SERVICE_NAME: &str = "ceremony-coordinator";

/// Health check response.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

/// Build information response.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfoResponse {
    pub service: String,
    pub version: String,
    pub git_sha: String,
    pub build_time: String,
    pub ciphersuite: String,
    pub persistent_ledger: bool,
}

/// GET /health
///
/// Returns service health status. Used by load balancers and monitoring.
#[tracing::instrument]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        service: SERVICE_NAME.to_string(),
    })
}

/// GET /build-info
///
/// Returns build metadata for deployment verification.
#[tracing::instrument(skip(settings))]
pub async fn build_info(settings: web::Data<Settings>) -> HttpResponse {
    let response = BuildInfoResponse {
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_sha: env!("GIT_SHA").to_string(),
        build_time: env!("BUILD_TIME").to_string(),
        ciphersuite: settings.ciphersuite().to_string(),
        persistent_ledger: settings.db_path().is_some(),
    };

    HttpResponse::Ok().json(response)
}

/// Configure health routes on the given scope.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/build-info", web::get().to(build_info));
}
