//! Liveness and readiness checks

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{error::AppResult, AppState};

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// `healthy` for liveness, `ready` once the database answers
    pub status: String,
    pub version: String,
    /// Registered cache regions, reported by the readiness check only
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cache_regions: Vec<String>,
}

impl HealthResponse {
    fn new(status: &str, cache_regions: Vec<String>) -> Self {
        Self {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            cache_regions,
        }
    }
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Process is up", body = HealthResponse)
    )
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::new("healthy", Vec::new()))
}

/// Ready when the database answers a query
#[utoipa::path(
    get,
    path = "/ready",
    tag = "health",
    responses(
        (status = 200, description = "Database reachable", body = HealthResponse),
        (status = 500, description = "Database unreachable")
    )
)]
pub async fn readiness_check(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    state.services.repository.ping().await?;
    let regions = state
        .services
        .cache
        .region_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    Ok(Json(HealthResponse::new("ready", regions)))
}
