//! CSV import and export endpoints

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::Multipart;

use crate::{
    error::{AppError, AppResult},
    models::{Actor, AutoImportReport, ImportReport},
    services::uploads::UploadedFile,
};

use super::{parse_regime, AuthenticatedUser, MultipartForm};

/// First file part of the form, which must be a `.csv`
fn csv_upload(form: &MultipartForm) -> AppResult<&UploadedFile> {
    let file = form
        .files
        .first()
        .ok_or_else(|| AppError::BadRequest("No file was uploaded".to_string()))?;
    if !file.original_filename.to_lowercase().ends_with(".csv") {
        return Err(AppError::FileRejected(format!(
            "{} is not a CSV file",
            file.original_filename
        )));
    }
    Ok(file)
}

/// CSV body served as a download named `{prefix}_YYYYMMDD.csv`
pub(crate) fn csv_download(csv: String, prefix: &str) -> Response {
    let filename = format!("{}_{}.csv", prefix, chrono::Utc::now().format("%Y%m%d"));
    let mut response = csv.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/csv; charset=utf-8"),
    );
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

/// Import a CSV file (multipart, first file part)
#[utoipa::path(
    post,
    path = "/equipment/{regime}/_/import",
    tag = "import-export",
    security(("bearer_auth" = [])),
    params(("regime" = String, Path, description = "ppm or ocm")),
    responses(
        (status = 200, description = "Import outcome", body = ImportReport),
        (status = 400, description = "No file, unreadable file or required columns missing"),
        (status = 422, description = "File is not a CSV")
    )
)]
pub async fn import_csv(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(regime): Path<String>,
    multipart: Multipart,
) -> AppResult<Json<ImportReport>> {
    claims.require_write()?;
    let regime = parse_regime(&regime)?;
    let form = MultipartForm::read(multipart).await?;
    let file = csv_upload(&form)?;
    let report = state
        .services
        .import_export
        .import_csv(regime, &file.bytes, &Actor::from(&claims))
        .await?;
    Ok(Json(report))
}

/// Export a regime as CSV
#[utoipa::path(
    get,
    path = "/equipment/{regime}/_/export",
    tag = "import-export",
    security(("bearer_auth" = [])),
    params(("regime" = String, Path, description = "ppm or ocm")),
    responses(
        (status = 200, description = "CSV file", content_type = "text/csv")
    )
)]
pub async fn export_csv(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(regime): Path<String>,
) -> AppResult<Response> {
    claims.require_read()?;
    let regime = parse_regime(&regime)?;
    let csv = state
        .services
        .import_export
        .export_csv(regime, &Actor::from(&claims))
        .await?;
    Ok(csv_download(csv, &format!("{}_export", regime.as_str())))
}

/// Import training records, updating those whose `id` already exists
#[utoipa::path(
    post,
    path = "/training/import",
    tag = "import-export",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Import outcome", body = ImportReport),
        (status = 400, description = "No file, unreadable file or required columns missing"),
        (status = 422, description = "File is not a CSV")
    )
)]
pub async fn import_training_csv(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    multipart: Multipart,
) -> AppResult<Json<ImportReport>> {
    claims.require_write()?;
    let form = MultipartForm::read(multipart).await?;
    let file = csv_upload(&form)?;
    let report = state
        .services
        .import_export
        .import_training_csv(&file.bytes, &Actor::from(&claims))
        .await?;
    Ok(Json(report))
}

/// Export training records as CSV
#[utoipa::path(
    get,
    path = "/training/export",
    tag = "import-export",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "CSV file", content_type = "text/csv")
    )
)]
pub async fn export_training_csv(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Response> {
    claims.require_read()?;
    let csv = state
        .services
        .import_export
        .export_training_csv(&Actor::from(&claims))
        .await?;
    Ok(csv_download(csv, "training_export"))
}

/// Import a CSV file whose kind (PPM, OCM or training) is told from its header
#[utoipa::path(
    post,
    path = "/import/auto",
    tag = "import-export",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Detected kind and import outcome", body = AutoImportReport),
        (status = 400, description = "No file, or the header matches no known kind"),
        (status = 422, description = "File is not a CSV")
    )
)]
pub async fn import_auto(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    multipart: Multipart,
) -> AppResult<Json<AutoImportReport>> {
    claims.require_write()?;
    let form = MultipartForm::read(multipart).await?;
    let file = csv_upload(&form)?;
    let report = state
        .services
        .import_export
        .import_auto(&file.bytes, &Actor::from(&claims))
        .await?;
    Ok(Json(report))
}
