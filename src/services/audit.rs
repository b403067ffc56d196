//! Audit trail of mutations and system events
//!
//! Recording is best effort: a failed write is logged and never fails the
//! operation being audited.

use crate::{
    config::AuditConfig,
    error::{AppError, AppResult},
    models::audit::{Actor, AuditEvent, AuditEventType, AuditPage, AuditQuery},
    repository::Repository,
};

/// Most rows a single export returns
const EXPORT_LIMIT: i64 = 1000;

#[derive(Clone)]
pub struct AuditService {
    repository: Repository,
    max_entries: u32,
}

impl AuditService {
    pub fn new(repository: Repository, config: &AuditConfig) -> Self {
        Self {
            repository,
            max_entries: config.max_entries,
        }
    }

    pub async fn record(&self, event: AuditEvent) {
        match self.repository.audit_insert(&event, self.max_entries).await {
            Ok(id) => tracing::debug!(
                "Audit {} {} by {}: {}",
                id,
                event.event_type,
                event.actor.name,
                event.status
            ),
            Err(e) => tracing::warn!(
                "Failed to record audit event {} by {}: {}",
                event.event_type,
                event.actor.name,
                e
            ),
        }
    }

    pub async fn search(&self, query: &AuditQuery) -> AppResult<AuditPage> {
        let items = self.repository.audit_search(query).await?;
        let total = self.repository.audit_count(query).await?;
        Ok(AuditPage { items, total })
    }

    /// Matching entries as CSV, newest first. The export itself is audited.
    pub async fn export_csv(&self, query: &AuditQuery, actor: &Actor) -> AppResult<String> {
        let query = AuditQuery {
            limit: Some(query.limit.unwrap_or(EXPORT_LIMIT)),
            ..query.clone()
        };
        let entries = self.repository.audit_search(&query).await?;

        let write_error = |e: csv::Error| AppError::Internal(format!("CSV write failed: {}", e));
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record([
                "ID",
                "Timestamp",
                "Event Type",
                "Performed By",
                "Description",
                "Status",
                "Details",
            ])
            .map_err(write_error)?;
        for entry in &entries {
            writer
                .write_record([
                    entry.id.to_string(),
                    entry.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    entry.event_type.label().to_string(),
                    entry.performed_by.clone(),
                    entry.description.clone(),
                    entry.status.to_string(),
                    entry.details.to_string(),
                ])
                .map_err(write_error)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| AppError::Internal(format!("CSV write failed: {}", e)))?;
        let csv = String::from_utf8(bytes)
            .map_err(|e| AppError::Internal(format!("CSV is not UTF-8: {}", e)))?;

        self.record(
            AuditEvent::new(
                AuditEventType::DataExport,
                actor,
                format!("Exported {} audit log entries", entries.len()),
            )
            .detail("data_type", "audit_log")
            .detail("rows", entries.len()),
        )
        .await;
        Ok(csv)
    }
}
