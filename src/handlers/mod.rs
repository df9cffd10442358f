//! # API Handlers
//!
//! HTTP endpoint handlers for the Ainstein API, grouped by resource.

use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::ServiceInfo;
use crate::server::AppState;

pub mod admin;
pub mod api_keys;
pub mod auth;
pub mod generations;
pub mod pages;
pub mod prompts;
pub mod settings;
pub mod tenants;
pub mod types;
pub mod usage;
pub mod users;

/// Probe response body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthStatus {
    #[schema(example = "ok")]
    pub status: String,
}

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/healthz",
    responses((status = 200, description = "Process is alive", body = HealthStatus)),
    tag = "root"
)]
pub async fn healthz() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
    })
}

/// Readiness probe; fails while the database is unreachable
#[utoipa::path(
    get,
    path = "/readyz",
    responses(
        (status = 200, description = "Ready to serve", body = HealthStatus),
        (status = 503, description = "Database unavailable", body = HealthStatus)
    ),
    tag = "root"
)]
pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    match crate::db::health_check(&state.db).await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthStatus {
                status: "ready".to_string(),
            }),
        ),
        Err(err) => {
            tracing::warn!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthStatus {
                    status: "unavailable".to_string(),
                }),
            )
        }
    }
}
