//! Staff training records

use std::collections::HashSet;

use crate::{
    error::{AppError, AppResult},
    models::{
        audit::{Actor, AuditEvent, AuditEventType, AuditStatus},
        training::TrainingInput,
        TrainingBulkDeleteReport, TrainingRecord,
    },
    repository::Repository,
};

use super::audit::AuditService;

#[derive(Clone)]
pub struct TrainingService {
    repository: Repository,
    audit: AuditService,
}

impl TrainingService {
    pub fn new(repository: Repository, audit: AuditService) -> Self {
        Self { repository, audit }
    }

    pub async fn list(&self) -> AppResult<Vec<TrainingRecord>> {
        self.repository.training_list().await
    }

    pub async fn get(&self, id: i64) -> AppResult<TrainingRecord> {
        self.repository.training_get(id).await
    }

    pub async fn create(&self, input: TrainingInput, actor: &Actor) -> AppResult<TrainingRecord> {
        let employee_id = input.employee_id.trim().to_string();
        let result = async {
            let fields = input.into_fields()?;
            self.repository.training_create(&fields).await
        }
        .await;
        let mut event = AuditEvent::new(
            AuditEventType::TrainingAdded,
            actor,
            format!("Added training record for employee {}", employee_id),
        )
        .detail("employee_id", &employee_id);
        if let Ok(record) = &result {
            tracing::info!("Created training record {} for {}", record.id, record.employee_id);
            event = event.detail("training_id", record.id);
        }
        self.audit.record(event.outcome(&result)).await;
        result
    }

    pub async fn update(
        &self,
        id: i64,
        input: TrainingInput,
        actor: &Actor,
    ) -> AppResult<TrainingRecord> {
        let result = async {
            let fields = input.into_fields()?;
            self.repository.training_update(id, &fields).await
        }
        .await;
        let mut event = AuditEvent::new(
            AuditEventType::TrainingUpdated,
            actor,
            format!("Updated training record {}", id),
        )
        .detail("training_id", id);
        if let Ok(record) = &result {
            event = event.detail("employee_id", &record.employee_id);
        }
        self.audit.record(event.outcome(&result)).await;
        result
    }

    pub async fn delete(&self, id: i64, actor: &Actor) -> AppResult<()> {
        let result = self.repository.training_delete(id).await;
        if result.is_ok() {
            tracing::info!("Deleted training record {}", id);
        }
        self.audit
            .record(
                AuditEvent::new(
                    AuditEventType::TrainingDeleted,
                    actor,
                    format!("Deleted training record {}", id),
                )
                .detail("training_id", id)
                .outcome(&result),
            )
            .await;
        result
    }

    /// Delete several records in one transaction. Unknown ids are reported,
    /// not treated as errors.
    pub async fn bulk_delete(
        &self,
        ids: &[i64],
        actor: &Actor,
    ) -> AppResult<TrainingBulkDeleteReport> {
        if ids.is_empty() {
            return Err(AppError::BadRequest("No training IDs provided".to_string()));
        }
        let result = self.remove_many(ids).await;
        let mut event = AuditEvent::new(
            AuditEventType::BulkDelete,
            actor,
            format!("Bulk delete of {} training record(s)", ids.len()),
        )
        .detail("data_type", "training")
        .detail("requested", ids.len());
        if let Ok(report) = &result {
            event = event
                .detail("deleted_count", report.deleted_count)
                .detail("not_found", &report.not_found);
            if !report.not_found.is_empty() {
                event = event.status(AuditStatus::Warning);
            }
        }
        self.audit.record(event.outcome(&result)).await;
        result
    }

    async fn remove_many(&self, ids: &[i64]) -> AppResult<TrainingBulkDeleteReport> {
        let mut report = TrainingBulkDeleteReport::default();
        let mut seen = HashSet::new();
        let mut tx = self.repository.begin().await?;
        for &id in ids.iter().filter(|id| seen.insert(**id)) {
            if self.repository.training_remove(&mut tx, id).await? {
                report.deleted_count += 1;
            } else {
                report.not_found.push(id);
            }
        }
        tx.commit().await?;

        tracing::info!(
            "Bulk deleted {} training record(s), {} not found",
            report.deleted_count,
            report.not_found.len()
        );
        Ok(report)
    }
}
