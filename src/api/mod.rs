//! API handlers for MedTrack REST endpoints

pub mod audit;
pub mod auth;
pub mod equipment;
pub mod health;
pub mod history;
pub mod import_export;
pub mod openapi;
pub mod training;
pub mod users;

use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
    routing::{delete, get, post, put},
    Router,
};
use axum_extra::extract::Multipart;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    error::{AppError, AppResult},
    models::{user::UserClaims, Regime},
    services::uploads::UploadedFile,
    AppState,
};

/// Extractor for authenticated user from JWT token
pub struct AuthenticatedUser(pub UserClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // Get the Authorization header
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()))?;

        let claims = UserClaims::from_token(token, &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        Ok(AuthenticatedUser(claims))
    }
}

/// Parse the `{regime}` path segment.
pub(crate) fn parse_regime(raw: &str) -> AppResult<Regime> {
    raw.parse().map_err(AppError::BadRequest)
}

/// Text fields and files of a multipart form
#[derive(Debug, Default)]
pub(crate) struct MultipartForm {
    pub fields: Vec<(String, String)>,
    pub files: Vec<UploadedFile>,
}

impl MultipartForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = MultipartForm::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(original_filename) => {
                    let mime_type = field.content_type().map(str::to_string);
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?;
                    // Browsers send an empty part when no file was picked
                    if original_filename.is_empty() && bytes.is_empty() {
                        continue;
                    }
                    form.files.push(UploadedFile {
                        original_filename,
                        mime_type,
                        bytes: bytes.to_vec(),
                    });
                }
                None => {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(format!("Failed to read field: {}", e)))?;
                    form.fields.push((name, value));
                }
            }
        }
        Ok(form)
    }
}

/// Create the application router with all routes
pub fn router(state: AppState) -> Router {
    // Room for several attachments plus form overhead
    let upload_limit = (state.config.uploads.max_file_size_bytes as usize)
        .saturating_mul(5)
        .saturating_add(1024 * 1024);

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let uploads = Router::new()
        .route(
            "/equipment/:regime/:identifier/history",
            get(history::list_equipment_history).post(history::add_note),
        )
        .route("/equipment/:regime/_/import", post(import_export::import_csv))
        .route("/training/import", post(import_export::import_training_csv))
        .route("/import/auto", post(import_export::import_auto))
        .route(
            "/history/:note_id/attachments",
            post(history::add_attachments),
        )
        .layer(DefaultBodyLimit::max(upload_limit));

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Authentication
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        // Users
        .route("/users", get(users::list_users))
        .route("/users", post(users::create_user))
        .route("/users/:id", get(users::get_user))
        .route("/users/:id", delete(users::delete_user))
        .route("/users/:id/role", put(users::update_role))
        // Equipment
        .route("/equipment/:regime", get(equipment::list_equipment))
        .route("/equipment/:regime", post(equipment::create_equipment))
        .route("/equipment/:regime/_/stats", get(equipment::dashboard))
        .route("/equipment/:regime/_/bulk-delete", post(equipment::bulk_delete))
        .route("/equipment/:regime/_/recalculate", post(equipment::recalculate_statuses))
        .route("/equipment/:regime/_/export", get(import_export::export_csv))
        .route("/equipment/:regime/:identifier", get(equipment::get_equipment))
        .route("/equipment/:regime/:identifier", put(equipment::update_equipment))
        .route("/equipment/:regime/:identifier", delete(equipment::delete_equipment))
        // History
        .route("/history/search", get(history::search))
        .route("/history/:note_id", get(history::get_note))
        .route("/history/:note_id", put(history::update_note))
        .route("/history/:note_id", delete(history::delete_note))
        .route(
            "/history/:note_id/attachments/:attachment_id",
            get(history::download_attachment).delete(history::delete_attachment),
        )
        .route("/admin/uploads/cleanup", post(history::cleanup_orphans))
        // Training
        .route("/training", get(training::list_training))
        .route("/training", post(training::create_training))
        .route("/training/bulk-delete", post(training::bulk_delete_training))
        .route("/training/export", get(import_export::export_training_csv))
        .route("/training/:id", get(training::get_training))
        .route("/training/:id", put(training::update_training))
        .route("/training/:id", delete(training::delete_training))
        // Audit trail
        .route("/audit", get(audit::list_audit))
        .route("/audit/export", get(audit::export_audit))
        .merge(uploads)
        .with_state(state);

    // OpenAPI documentation
    let openapi = openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
