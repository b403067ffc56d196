//! Audit trail entries
//!
//! Entries are append-only: there is no update path and no `updated_at`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{types::Json, FromRow};
use utoipa::{IntoParams, ToSchema};

use super::user::UserClaims;
use crate::error::AppResult;

// ---------------------------------------------------------------------------
// Event types and outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    EquipmentAdded,
    EquipmentUpdated,
    EquipmentDeleted,
    BulkImport,
    BulkDelete,
    DataExport,
    StatusRecalculated,
    TrainingAdded,
    TrainingUpdated,
    TrainingDeleted,
    HistoryAdded,
    HistoryUpdated,
    HistoryDeleted,
    HistoryAttachmentAdded,
    HistoryAttachmentDeleted,
    UserCreated,
    UserUpdated,
    UserDeleted,
    SystemStartup,
}

impl AuditEventType {
    pub const ALL: [AuditEventType; 19] = [
        AuditEventType::EquipmentAdded,
        AuditEventType::EquipmentUpdated,
        AuditEventType::EquipmentDeleted,
        AuditEventType::BulkImport,
        AuditEventType::BulkDelete,
        AuditEventType::DataExport,
        AuditEventType::StatusRecalculated,
        AuditEventType::TrainingAdded,
        AuditEventType::TrainingUpdated,
        AuditEventType::TrainingDeleted,
        AuditEventType::HistoryAdded,
        AuditEventType::HistoryUpdated,
        AuditEventType::HistoryDeleted,
        AuditEventType::HistoryAttachmentAdded,
        AuditEventType::HistoryAttachmentDeleted,
        AuditEventType::UserCreated,
        AuditEventType::UserUpdated,
        AuditEventType::UserDeleted,
        AuditEventType::SystemStartup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::EquipmentAdded => "equipment_added",
            AuditEventType::EquipmentUpdated => "equipment_updated",
            AuditEventType::EquipmentDeleted => "equipment_deleted",
            AuditEventType::BulkImport => "bulk_import",
            AuditEventType::BulkDelete => "bulk_delete",
            AuditEventType::DataExport => "data_export",
            AuditEventType::StatusRecalculated => "status_recalculated",
            AuditEventType::TrainingAdded => "training_added",
            AuditEventType::TrainingUpdated => "training_updated",
            AuditEventType::TrainingDeleted => "training_deleted",
            AuditEventType::HistoryAdded => "history_added",
            AuditEventType::HistoryUpdated => "history_updated",
            AuditEventType::HistoryDeleted => "history_deleted",
            AuditEventType::HistoryAttachmentAdded => "history_attachment_added",
            AuditEventType::HistoryAttachmentDeleted => "history_attachment_deleted",
            AuditEventType::UserCreated => "user_created",
            AuditEventType::UserUpdated => "user_updated",
            AuditEventType::UserDeleted => "user_deleted",
            AuditEventType::SystemStartup => "system_startup",
        }
    }

    /// Human-readable name used in exports
    pub fn label(&self) -> &'static str {
        match self {
            AuditEventType::EquipmentAdded => "Equipment Added",
            AuditEventType::EquipmentUpdated => "Equipment Updated",
            AuditEventType::EquipmentDeleted => "Equipment Deleted",
            AuditEventType::BulkImport => "Bulk Import",
            AuditEventType::BulkDelete => "Bulk Delete",
            AuditEventType::DataExport => "Data Export",
            AuditEventType::StatusRecalculated => "Status Recalculated",
            AuditEventType::TrainingAdded => "Training Added",
            AuditEventType::TrainingUpdated => "Training Updated",
            AuditEventType::TrainingDeleted => "Training Deleted",
            AuditEventType::HistoryAdded => "Equipment History Added",
            AuditEventType::HistoryUpdated => "Equipment History Updated",
            AuditEventType::HistoryDeleted => "Equipment History Deleted",
            AuditEventType::HistoryAttachmentAdded => "History Attachment Added",
            AuditEventType::HistoryAttachmentDeleted => "History Attachment Deleted",
            AuditEventType::UserCreated => "User Created",
            AuditEventType::UserUpdated => "User Updated",
            AuditEventType::UserDeleted => "User Deleted",
            AuditEventType::SystemStartup => "System Startup",
        }
    }
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AuditEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        AuditEventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s || t.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Invalid audit event type: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Failed,
    Warning,
    Info,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "success",
            AuditStatus::Failed => "failed",
            AuditStatus::Warning => "warning",
            AuditStatus::Info => "info",
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AuditStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "success" => Ok(AuditStatus::Success),
            "failed" => Ok(AuditStatus::Failed),
            "warning" => Ok(AuditStatus::Warning),
            "info" => Ok(AuditStatus::Info),
            _ => Err(format!("Invalid audit status: {}", s)),
        }
    }
}

// ---------------------------------------------------------------------------
// Who performed an action
// ---------------------------------------------------------------------------

/// The user behind a mutation, or the server itself for startup tasks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Option<i64>,
    pub name: String,
}

impl Actor {
    pub fn system() -> Self {
        Self {
            user_id: None,
            name: "System".to_string(),
        }
    }
}

impl From<&UserClaims> for Actor {
    fn from(claims: &UserClaims) -> Self {
        Self {
            user_id: Some(claims.user_id),
            name: claims.username.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Events about to be written
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub actor: Actor,
    pub description: String,
    pub status: AuditStatus,
    pub details: Map<String, Value>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, actor: &Actor, description: impl Into<String>) -> Self {
        Self {
            event_type,
            actor: actor.clone(),
            description: description.into(),
            status: AuditStatus::Success,
            details: Map::new(),
        }
    }

    pub fn detail(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.details.insert(key.to_string(), value);
        self
    }

    pub fn status(mut self, status: AuditStatus) -> Self {
        self.status = status;
        self
    }

    /// Mark the event failed, with the error message, when `result` is an error.
    pub fn outcome<T>(self, result: &AppResult<T>) -> Self {
        match result {
            Ok(_) => self,
            Err(e) => self.status(AuditStatus::Failed).detail("error", e.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Stored entries
// ---------------------------------------------------------------------------

/// Internal row structure for audit queries
#[derive(Debug, Clone, FromRow)]
pub struct AuditRow {
    id: i64,
    created_at: DateTime<Utc>,
    event_type: String,
    user_id: Option<i64>,
    performed_by: String,
    description: String,
    status: String,
    details: Json<Value>,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = String;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        Ok(AuditEntry {
            id: row.id,
            created_at: row.created_at,
            event_type: row.event_type.parse()?,
            user_id: row.user_id,
            performed_by: row.performed_by,
            description: row.description,
            status: row.status.parse()?,
            details: row.details.0,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEntry {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub user_id: Option<i64>,
    pub performed_by: String,
    pub description: String,
    pub status: AuditStatus,
    #[schema(value_type = Object)]
    pub details: Value,
}

/// Audit search parameters
#[derive(Debug, Default, Clone, Deserialize, IntoParams)]
pub struct AuditQuery {
    pub event_type: Option<AuditEventType>,
    pub status: Option<AuditStatus>,
    pub user_id: Option<i64>,
    /// Exact display name of the actor, `System` for startup tasks
    pub performed_by: Option<String>,
    /// Inclusive lower bound on the entry date
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound on the entry date
    pub to: Option<NaiveDate>,
    /// Case-insensitive match on description, event type or actor
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditPage {
    pub items: Vec<AuditEntry>,
    pub total: i64,
}
