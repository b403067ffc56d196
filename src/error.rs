//! Error types for MedTrack server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Numeric error codes clients can switch on. Values are part of the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NoSuchEquipment = 5,
    NoSuchResource = 6,
    Duplicate = 8,
    BadValue = 18,
    CacheFailure = 22,
    FileRejected = 23,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    /// Notes, attachments, users and training records
    #[error("Not found: {0}")]
    NotFound(String),

    /// The identifier did not resolve to a record; carries the identifier as received
    #[error("Equipment not found: {0}")]
    EquipmentNotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Duplicate serial, log number or username; last administrator protection
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Attachment or import file refused by type or size
    #[error("File rejected: {0}")]
    FileRejected(String),

    /// One or more cache regions could not be cleared; the enclosing write was rolled back.
    #[error("Cache invalidation incomplete: {0}")]
    CacheInvalidation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) | AppError::EquipmentNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::FileRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::CacheInvalidation(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) | AppError::Io(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Authentication(_) | AppError::Authorization(_) => ErrorCode::NotAuthorized,
            AppError::NotFound(_) => ErrorCode::NoSuchResource,
            AppError::EquipmentNotFound(_) => ErrorCode::NoSuchEquipment,
            AppError::Validation(_) | AppError::BadRequest(_) => ErrorCode::BadValue,
            AppError::Conflict(_) => ErrorCode::Duplicate,
            AppError::FileRejected(_) => ErrorCode::FileRejected,
            AppError::CacheInvalidation(_) => ErrorCode::CacheFailure,
            AppError::Database(_) => ErrorCode::DbFailure,
            AppError::Io(_) | AppError::Internal(_) => ErrorCode::Failure,
        }
    }

    /// Message shown to clients. Server-side failures are logged here and
    /// replaced by a generic text.
    fn public_message(&self) -> String {
        match self {
            AppError::Authentication(msg)
            | AppError::Authorization(msg)
            | AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::Conflict(msg)
            | AppError::BadRequest(msg)
            | AppError::FileRejected(msg) => msg.clone(),
            AppError::EquipmentNotFound(identifier) => {
                tracing::debug!("Equipment lookup failed for {:?}", identifier);
                "Equipment not found".to_string()
            }
            AppError::CacheInvalidation(msg) => {
                tracing::error!("Cache invalidation failed, write rolled back: {}", msg);
                "Could not complete the update, please retry".to_string()
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Io(e) => {
                tracing::error!("I/O error: {:?}", e);
                "Internal server error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
        }
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message: self.public_message(),
        });
        (self.status(), body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
