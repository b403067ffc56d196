//! Training record endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        training::{TrainingBulkDeleteRequest, TrainingInput},
        Actor, TrainingBulkDeleteReport, TrainingRecord,
    },
};

use super::AuthenticatedUser;

#[utoipa::path(
    get,
    path = "/training",
    tag = "training",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Training records", body = Vec<TrainingRecord>)
    )
)]
pub async fn list_training(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<TrainingRecord>>> {
    claims.require_read()?;
    let records = state.services.training.list().await?;
    Ok(Json(records))
}

#[utoipa::path(
    get,
    path = "/training/{id}",
    tag = "training",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Training record ID")),
    responses(
        (status = 200, description = "Training record", body = TrainingRecord),
        (status = 404, description = "Training record not found")
    )
)]
pub async fn get_training(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<TrainingRecord>> {
    claims.require_read()?;
    let record = state.services.training.get(id).await?;
    Ok(Json(record))
}

#[utoipa::path(
    post,
    path = "/training",
    tag = "training",
    security(("bearer_auth" = [])),
    request_body = TrainingInput,
    responses(
        (status = 201, description = "Training record created", body = TrainingRecord)
    )
)]
pub async fn create_training(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(input): Json<TrainingInput>,
) -> AppResult<(StatusCode, Json<TrainingRecord>)> {
    claims.require_write()?;
    let record = state
        .services
        .training
        .create(input, &Actor::from(&claims))
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[utoipa::path(
    put,
    path = "/training/{id}",
    tag = "training",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Training record ID")),
    request_body = TrainingInput,
    responses(
        (status = 200, description = "Training record updated", body = TrainingRecord),
        (status = 404, description = "Training record not found")
    )
)]
pub async fn update_training(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<TrainingInput>,
) -> AppResult<Json<TrainingRecord>> {
    claims.require_write()?;
    let record = state
        .services
        .training
        .update(id, input, &Actor::from(&claims))
        .await?;
    Ok(Json(record))
}

#[utoipa::path(
    delete,
    path = "/training/{id}",
    tag = "training",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Training record ID")),
    responses(
        (status = 204, description = "Training record deleted"),
        (status = 404, description = "Training record not found")
    )
)]
pub async fn delete_training(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    claims.require_write()?;
    state
        .services
        .training
        .delete(id, &Actor::from(&claims))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete several training records at once
#[utoipa::path(
    post,
    path = "/training/bulk-delete",
    tag = "training",
    security(("bearer_auth" = [])),
    request_body = TrainingBulkDeleteRequest,
    responses(
        (status = 200, description = "Bulk delete outcome", body = TrainingBulkDeleteReport),
        (status = 400, description = "No training IDs provided")
    )
)]
pub async fn bulk_delete_training(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<TrainingBulkDeleteRequest>,
) -> AppResult<Json<TrainingBulkDeleteReport>> {
    claims.require_write()?;
    let report = state
        .services
        .training
        .bulk_delete(&request.ids, &Actor::from(&claims))
        .await?;
    Ok(Json(report))
}
