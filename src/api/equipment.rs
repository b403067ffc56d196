//! Equipment API endpoints
//!
//! `{identifier}` accepts a canonical serial, its URL token, or a token
//! produced by older releases of the front end. Collection actions live
//! under `_/` so that a record whose serial is `stats` or `export` stays
//! reachable through `{identifier}`.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        equipment::{BulkDeleteRequest, EquipmentPage, EquipmentQuery},
        Actor, BulkDeleteReport, DashboardStats, EquipmentInput, EquipmentView,
        RecalculateReport,
    },
};

use super::{parse_regime, AuthenticatedUser};

/// List equipment of a regime in store order
#[utoipa::path(
    get,
    path = "/equipment/{regime}",
    tag = "equipment",
    security(("bearer_auth" = [])),
    params(
        ("regime" = String, Path, description = "ppm or ocm"),
        EquipmentQuery
    ),
    responses(
        (status = 200, description = "Equipment page", body = EquipmentPage),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_equipment(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(regime): Path<String>,
    Query(query): Query<EquipmentQuery>,
) -> AppResult<Json<EquipmentPage>> {
    claims.require_read()?;
    let regime = parse_regime(&regime)?;
    let page = state.services.equipment.list(regime, &query).await?;
    Ok(Json(page))
}

/// Dashboard counters for a regime
#[utoipa::path(
    get,
    path = "/equipment/{regime}/_/stats",
    tag = "equipment",
    security(("bearer_auth" = [])),
    params(("regime" = String, Path, description = "ppm or ocm")),
    responses(
        (status = 200, description = "Dashboard statistics", body = DashboardStats)
    )
)]
pub async fn dashboard(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(regime): Path<String>,
) -> AppResult<Json<Arc<DashboardStats>>> {
    claims.require_read()?;
    let regime = parse_regime(&regime)?;
    let stats = state.services.equipment.dashboard(regime).await?;
    Ok(Json(stats))
}

/// Get one record
#[utoipa::path(
    get,
    path = "/equipment/{regime}/{identifier}",
    tag = "equipment",
    security(("bearer_auth" = [])),
    params(
        ("regime" = String, Path, description = "ppm or ocm"),
        ("identifier" = String, Path, description = "Serial or URL token")
    ),
    responses(
        (status = 200, description = "Equipment record", body = EquipmentView),
        (status = 404, description = "Equipment not found")
    )
)]
pub async fn get_equipment(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path((regime, identifier)): Path<(String, String)>,
) -> AppResult<Json<EquipmentView>> {
    claims.require_read()?;
    let regime = parse_regime(&regime)?;
    let view = state.services.equipment.get(regime, &identifier).await?;
    Ok(Json(view))
}

/// Create a record
#[utoipa::path(
    post,
    path = "/equipment/{regime}",
    tag = "equipment",
    security(("bearer_auth" = [])),
    params(("regime" = String, Path, description = "ppm or ocm")),
    request_body = EquipmentInput,
    responses(
        (status = 201, description = "Equipment created", body = EquipmentView),
        (status = 409, description = "Serial or log number already exists")
    )
)]
pub async fn create_equipment(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(regime): Path<String>,
    Json(input): Json<EquipmentInput>,
) -> AppResult<(StatusCode, Json<EquipmentView>)> {
    claims.require_write()?;
    let regime = parse_regime(&regime)?;
    let view = state
        .services
        .equipment
        .create(regime, input, &Actor::from(&claims))
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Replace a record
#[utoipa::path(
    put,
    path = "/equipment/{regime}/{identifier}",
    tag = "equipment",
    security(("bearer_auth" = [])),
    params(
        ("regime" = String, Path, description = "ppm or ocm"),
        ("identifier" = String, Path, description = "Serial or URL token")
    ),
    request_body = EquipmentInput,
    responses(
        (status = 200, description = "Equipment updated", body = EquipmentView),
        (status = 404, description = "Equipment not found"),
        (status = 409, description = "Serial or log number already exists")
    )
)]
pub async fn update_equipment(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path((regime, identifier)): Path<(String, String)>,
    Json(input): Json<EquipmentInput>,
) -> AppResult<Json<EquipmentView>> {
    claims.require_write()?;
    let regime = parse_regime(&regime)?;
    let view = state
        .services
        .equipment
        .update(regime, &identifier, input, &Actor::from(&claims))
        .await?;
    Ok(Json(view))
}

/// Delete a record with its history
#[utoipa::path(
    delete,
    path = "/equipment/{regime}/{identifier}",
    tag = "equipment",
    security(("bearer_auth" = [])),
    params(
        ("regime" = String, Path, description = "ppm or ocm"),
        ("identifier" = String, Path, description = "Serial or URL token")
    ),
    responses(
        (status = 204, description = "Equipment deleted"),
        (status = 404, description = "Equipment not found")
    )
)]
pub async fn delete_equipment(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path((regime, identifier)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    claims.require_write()?;
    let regime = parse_regime(&regime)?;
    state
        .services
        .equipment
        .delete(regime, &identifier, &Actor::from(&claims))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete several records at once
#[utoipa::path(
    post,
    path = "/equipment/{regime}/_/bulk-delete",
    tag = "equipment",
    security(("bearer_auth" = [])),
    params(("regime" = String, Path, description = "ppm or ocm")),
    request_body = BulkDeleteRequest,
    responses(
        (status = 200, description = "Bulk delete outcome", body = BulkDeleteReport)
    )
)]
pub async fn bulk_delete(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(regime): Path<String>,
    Json(request): Json<BulkDeleteRequest>,
) -> AppResult<Json<BulkDeleteReport>> {
    claims.require_write()?;
    let regime = parse_regime(&regime)?;
    let report = state
        .services
        .equipment
        .bulk_delete(regime, &request.identifiers, &Actor::from(&claims))
        .await?;
    Ok(Json(report))
}

/// Recompute maintenance statuses as of today
#[utoipa::path(
    post,
    path = "/equipment/{regime}/_/recalculate",
    tag = "equipment",
    security(("bearer_auth" = [])),
    params(("regime" = String, Path, description = "ppm or ocm")),
    responses(
        (status = 200, description = "Recalculation outcome", body = RecalculateReport)
    )
)]
pub async fn recalculate_statuses(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(regime): Path<String>,
) -> AppResult<Json<RecalculateReport>> {
    claims.require_write()?;
    let regime = parse_regime(&regime)?;
    let report = state
        .services
        .equipment
        .recalculate_statuses(regime, &Actor::from(&claims))
        .await?;
    Ok(Json(report))
}
