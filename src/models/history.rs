//! History notes and their attachments

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::enums::Regime;
use super::user::UserClaims;
use crate::error::{AppError, AppResult};

pub const NOTE_MIN_CHARS: usize = 10;
pub const NOTE_MAX_CHARS: usize = 5000;

/// Trim and length-check note text.
pub fn normalize_note_text(raw: &str) -> AppResult<String> {
    let text = raw.trim();
    let len = text.chars().count();
    if len < NOTE_MIN_CHARS {
        return Err(AppError::Validation(format!(
            "Note must be at least {} characters",
            NOTE_MIN_CHARS
        )));
    }
    if len > NOTE_MAX_CHARS {
        return Err(AppError::Validation(format!(
            "Note must be at most {} characters",
            NOTE_MAX_CHARS
        )));
    }
    Ok(text.to_string())
}

/// Internal row structure for note queries
#[derive(Debug, Clone, FromRow)]
pub struct HistoryNoteRow {
    pub id: Uuid,
    pub regime: String,
    pub equipment_serial: String,
    pub author_id: i64,
    pub author_name: String,
    pub note_text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_modified_by: Option<i64>,
    pub last_modified_by_name: Option<String>,
}

impl HistoryNoteRow {
    pub fn into_note(self, attachments: Vec<HistoryAttachment>) -> HistoryNote {
        HistoryNote {
            id: self.id,
            regime: self.regime.parse().unwrap_or(Regime::Ppm),
            equipment_serial: self.equipment_serial,
            author_id: self.author_id,
            author_name: self.author_name,
            note_text: self.note_text,
            created_at: self.created_at,
            is_edited: self.updated_at.is_some(),
            updated_at: self.updated_at,
            last_modified_by: self.last_modified_by,
            last_modified_by_name: self.last_modified_by_name,
            attachments,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HistoryNote {
    pub id: Uuid,
    pub regime: Regime,
    /// Canonical serial of the owning record, never a URL token
    pub equipment_serial: String,
    pub author_id: i64,
    pub author_name: String,
    pub note_text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_modified_by: Option<i64>,
    pub last_modified_by_name: Option<String>,
    pub is_edited: bool,
    pub attachments: Vec<HistoryAttachment>,
}

impl HistoryNote {
    /// Admins, the author, and the last modifier may edit or delete a note.
    pub fn can_modify(&self, claims: &UserClaims) -> bool {
        claims.is_admin()
            || self.author_id == claims.user_id
            || self.last_modified_by == Some(claims.user_id)
    }

    pub fn require_modify(&self, claims: &UserClaims) -> AppResult<()> {
        if self.can_modify(claims) {
            Ok(())
        } else {
            Err(AppError::Authorization(
                "Only the author, the last editor or an administrator may change this note"
                    .to_string(),
            ))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct HistoryAttachment {
    pub id: Uuid,
    pub note_id: Uuid,
    pub original_filename: String,
    /// UUID plus the original extension
    pub stored_filename: String,
    #[serde(skip_serializing)]
    pub file_path: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub upload_date: DateTime<Utc>,
}

/// Create note request
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateNote {
    pub note_text: String,
}

/// Update note request
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateNote {
    pub note_text: String,
}

/// History search parameters
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct HistoryQuery {
    pub regime: Option<Regime>,
    /// Canonical serial or URL token; resolved through the record locator
    pub serial: Option<String>,
    pub author_id: Option<i64>,
    /// Inclusive lower bound on creation date
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound on creation date
    pub to: Option<NaiveDate>,
    /// Case-insensitive match on note text or author name
    pub q: Option<String>,
    pub limit: Option<i64>,
}

/// Orphan cleanup outcome
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct CleanupReport {
    pub scanned: usize,
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}
