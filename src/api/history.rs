//! Maintenance history endpoints

use axum::{
    extract::{FromRequest, Path, Query, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::Multipart;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        history::{CleanupReport, CreateNote, HistoryQuery, UpdateNote},
        HistoryNote,
    },
    services::uploads::UploadedFile,
    AppState,
};

use super::{parse_regime, AuthenticatedUser, MultipartForm};

/// Note text and files from either a JSON or a multipart body
async fn note_body(request: Request, state: &AppState) -> AppResult<(String, Vec<UploadedFile>)> {
    let is_json = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false);

    if is_json {
        let Json(note) = Json::<CreateNote>::from_request(request, state)
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        return Ok((note.note_text, Vec::new()));
    }

    let multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let form = MultipartForm::read(multipart).await?;
    let text = form
        .field("note_text")
        .ok_or_else(|| AppError::Validation("note_text is required".to_string()))?
        .to_string();
    Ok((text, form.files))
}

/// History of one record, newest first
#[utoipa::path(
    get,
    path = "/equipment/{regime}/{identifier}/history",
    tag = "history",
    security(("bearer_auth" = [])),
    params(
        ("regime" = String, Path, description = "ppm or ocm"),
        ("identifier" = String, Path, description = "Serial or URL token")
    ),
    responses(
        (status = 200, description = "History notes", body = Vec<HistoryNote>),
        (status = 404, description = "Equipment not found")
    )
)]
pub async fn list_equipment_history(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path((regime, identifier)): Path<(String, String)>,
) -> AppResult<Json<Vec<HistoryNote>>> {
    claims.require_read()?;
    let regime = parse_regime(&regime)?;
    let notes = state.services.history.list_for(regime, &identifier).await?;
    Ok(Json(notes))
}

/// Add a note, optionally with attachments (multipart `note_text` + files)
#[utoipa::path(
    post,
    path = "/equipment/{regime}/{identifier}/history",
    tag = "history",
    security(("bearer_auth" = [])),
    params(
        ("regime" = String, Path, description = "ppm or ocm"),
        ("identifier" = String, Path, description = "Serial or URL token")
    ),
    request_body = CreateNote,
    responses(
        (status = 201, description = "Note created", body = HistoryNote),
        (status = 404, description = "Equipment not found"),
        (status = 422, description = "Attachment rejected")
    )
)]
pub async fn add_note(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path((regime, identifier)): Path<(String, String)>,
    request: Request,
) -> AppResult<(StatusCode, Json<HistoryNote>)> {
    claims.require_write()?;
    let regime = parse_regime(&regime)?;
    let (note_text, files) = note_body(request, &state).await?;
    let note = state
        .services
        .history
        .add_note(regime, &identifier, &note_text, &claims, &files)
        .await?;
    Ok((StatusCode::CREATED, Json(note)))
}

#[utoipa::path(
    get,
    path = "/history/{note_id}",
    tag = "history",
    security(("bearer_auth" = [])),
    params(("note_id" = Uuid, Path, description = "Note ID")),
    responses(
        (status = 200, description = "History note", body = HistoryNote),
        (status = 404, description = "Note not found")
    )
)]
pub async fn get_note(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(note_id): Path<Uuid>,
) -> AppResult<Json<HistoryNote>> {
    claims.require_read()?;
    let note = state.services.history.get_note(note_id).await?;
    Ok(Json(note))
}

/// Edit a note's text
#[utoipa::path(
    put,
    path = "/history/{note_id}",
    tag = "history",
    security(("bearer_auth" = [])),
    params(("note_id" = Uuid, Path, description = "Note ID")),
    request_body = UpdateNote,
    responses(
        (status = 200, description = "Note updated", body = HistoryNote),
        (status = 403, description = "Not the author, last editor or an admin"),
        (status = 404, description = "Note not found")
    )
)]
pub async fn update_note(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(note_id): Path<Uuid>,
    Json(data): Json<UpdateNote>,
) -> AppResult<Json<HistoryNote>> {
    claims.require_write()?;
    let note = state
        .services
        .history
        .update_note(note_id, &data.note_text, &claims)
        .await?;
    Ok(Json(note))
}

#[utoipa::path(
    delete,
    path = "/history/{note_id}",
    tag = "history",
    security(("bearer_auth" = [])),
    params(("note_id" = Uuid, Path, description = "Note ID")),
    responses(
        (status = 204, description = "Note deleted"),
        (status = 403, description = "Not the author, last editor or an admin"),
        (status = 404, description = "Note not found")
    )
)]
pub async fn delete_note(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(note_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    claims.require_write()?;
    state.services.history.delete_note(note_id, &claims).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Add files to an existing note
#[utoipa::path(
    post,
    path = "/history/{note_id}/attachments",
    tag = "history",
    security(("bearer_auth" = [])),
    params(("note_id" = Uuid, Path, description = "Note ID")),
    responses(
        (status = 200, description = "Note with its attachments", body = HistoryNote),
        (status = 422, description = "Attachment rejected")
    )
)]
pub async fn add_attachments(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(note_id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<Json<HistoryNote>> {
    claims.require_write()?;
    let form = MultipartForm::read(multipart).await?;
    let note = state
        .services
        .history
        .add_attachments(note_id, &form.files, &claims)
        .await?;
    Ok(Json(note))
}

/// Download an attachment
#[utoipa::path(
    get,
    path = "/history/{note_id}/attachments/{attachment_id}",
    tag = "history",
    security(("bearer_auth" = [])),
    params(
        ("note_id" = Uuid, Path, description = "Note ID"),
        ("attachment_id" = Uuid, Path, description = "Attachment ID")
    ),
    responses(
        (status = 200, description = "File content"),
        (status = 404, description = "Attachment not found")
    )
)]
pub async fn download_attachment(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path((note_id, attachment_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Response> {
    claims.require_read()?;
    let (attachment, bytes) = state
        .services
        .history
        .get_attachment(note_id, attachment_id)
        .await?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        attachment.original_filename.replace(['"', '\\'], "_")
    );
    let mut response = bytes.into_response();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&attachment.mime_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

#[utoipa::path(
    delete,
    path = "/history/{note_id}/attachments/{attachment_id}",
    tag = "history",
    security(("bearer_auth" = [])),
    params(
        ("note_id" = Uuid, Path, description = "Note ID"),
        ("attachment_id" = Uuid, Path, description = "Attachment ID")
    ),
    responses(
        (status = 204, description = "Attachment deleted"),
        (status = 404, description = "Attachment not found")
    )
)]
pub async fn delete_attachment(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path((note_id, attachment_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    claims.require_write()?;
    state
        .services
        .history
        .delete_attachment(note_id, attachment_id, &claims)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Search notes across all equipment
#[utoipa::path(
    get,
    path = "/history/search",
    tag = "history",
    security(("bearer_auth" = [])),
    params(HistoryQuery),
    responses(
        (status = 200, description = "Matching notes, newest first", body = Vec<HistoryNote>)
    )
)]
pub async fn search(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<HistoryNote>>> {
    claims.require_read()?;
    let notes = state.services.history.search(&query).await?;
    Ok(Json(notes))
}

/// Remove upload files no attachment refers to (admin only)
#[utoipa::path(
    post,
    path = "/admin/uploads/cleanup",
    tag = "history",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Cleanup outcome", body = CleanupReport),
        (status = 403, description = "Admin privileges required")
    )
)]
pub async fn cleanup_orphans(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<CleanupReport>> {
    claims.require_admin()?;
    let report = state.services.history.cleanup_orphans().await?;
    Ok(Json(report))
}
