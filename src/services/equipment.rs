//! Equipment service: listing, lookup and every record mutation
//!
//! Mutations follow one shape: take the cache write gate, open a transaction,
//! load the regime's records inside it, resolve the identifier, write, then
//! clear the caches and commit. Attachment files are removed only after the
//! commit. Every mutation is audited with its outcome.

use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    cache::{CacheCoordinator, Scope},
    error::{AppError, AppResult},
    identifier,
    models::{
        audit::{Actor, AuditEvent, AuditEventType, AuditStatus},
        equipment::{EquipmentPage, EquipmentQuery},
        BulkDeleteReport, DashboardStats, EquipmentInput, EquipmentRecord, EquipmentView,
        RecalculateReport, Regime,
    },
    repository::{Placement, Repository},
};

use super::{audit::AuditService, commit_invalidated, today, uploads::UploadStore};

/// Reject a record whose serial or log number is taken by another record.
/// `current_serial` names the record being replaced, if any.
pub(crate) fn ensure_unique(
    records: &[EquipmentRecord],
    record: &EquipmentRecord,
    current_serial: Option<&str>,
) -> AppResult<()> {
    for other in records {
        if Some(other.serial.as_str()) == current_serial {
            continue;
        }
        if other.serial == record.serial {
            return Err(AppError::Conflict(format!(
                "Serial number '{}' already exists in {}",
                record.serial,
                record.regime.label()
            )));
        }
        if other.log_number == record.log_number {
            return Err(AppError::Conflict(format!(
                "Log number '{}' already exists in {}",
                record.log_number,
                record.regime.label()
            )));
        }
    }
    Ok(())
}

#[derive(Clone)]
pub struct EquipmentService {
    repository: Repository,
    cache: Arc<CacheCoordinator>,
    uploads: UploadStore,
    audit: AuditService,
}

impl EquipmentService {
    pub fn new(
        repository: Repository,
        cache: Arc<CacheCoordinator>,
        uploads: UploadStore,
        audit: AuditService,
    ) -> Self {
        Self {
            repository,
            cache,
            uploads,
            audit,
        }
    }

    /// Filtered, paginated page of the cached listing
    pub async fn list(&self, regime: Regime, query: &EquipmentQuery) -> AppResult<EquipmentPage> {
        let listing = self.cache.listing(regime).await?;
        let rows = listing
            .rows
            .iter()
            .filter(|row| query.matches(row))
            .cloned()
            .collect();
        Ok(EquipmentPage::paginate(rows, query.page, query.per_page))
    }

    pub async fn dashboard(&self, regime: Regime) -> AppResult<Arc<DashboardStats>> {
        self.cache.dashboard(regime).await
    }

    /// All rows in store order, for export
    pub async fn all_rows(&self, regime: Regime) -> AppResult<Vec<EquipmentView>> {
        Ok(self.cache.listing(regime).await?.rows.clone())
    }

    pub async fn get(&self, regime: Regime, identifier: &str) -> AppResult<EquipmentView> {
        let listing = self.cache.listing(regime).await?;
        let located = identifier::find(identifier, &listing.rows)?;
        Ok(located.record.clone())
    }

    /// Create a record; manual creations are placed first in store order.
    pub async fn create(
        &self,
        regime: Regime,
        input: EquipmentInput,
        actor: &Actor,
    ) -> AppResult<EquipmentView> {
        let serial = input.serial.trim().to_string();
        let result = self.insert(regime, input).await;
        self.audit
            .record(
                AuditEvent::new(
                    AuditEventType::EquipmentAdded,
                    actor,
                    format!("Added {} equipment {}", regime.label(), serial),
                )
                .detail("regime", regime)
                .detail("serial", &serial)
                .outcome(&result),
            )
            .await;
        result
    }

    async fn insert(&self, regime: Regime, input: EquipmentInput) -> AppResult<EquipmentView> {
        let record = input.into_record(regime, today())?;

        let gate = self.cache.begin_write().await;
        let mut tx = self.repository.begin().await?;
        let records = self.repository.equipment_load(&mut tx, regime).await?;
        ensure_unique(&records, &record, None)?;
        self.repository
            .equipment_insert(&mut tx, &record, Placement::Top)
            .await?;
        commit_invalidated(&gate, tx, Scope::Regime(regime)).await?;
        drop(gate);

        tracing::info!("Created {} equipment {:?}", regime.label(), record.serial);
        Ok(EquipmentView::new(record, None))
    }

    /// Replace the record `identifier` resolves to. A serial change re-points
    /// the record's history notes in the same transaction.
    pub async fn update(
        &self,
        regime: Regime,
        identifier: &str,
        input: EquipmentInput,
        actor: &Actor,
    ) -> AppResult<EquipmentView> {
        let result = self.replace(regime, identifier, input).await;
        let mut event = AuditEvent::new(
            AuditEventType::EquipmentUpdated,
            actor,
            format!("Updated {} equipment {}", regime.label(), identifier),
        )
        .detail("regime", regime)
        .detail("identifier", identifier);
        if let Ok((view, previous)) = &result {
            event = event.detail("serial", &view.record.serial);
            if *previous != view.record.serial {
                event = event.detail("previous_serial", previous);
            }
        }
        self.audit.record(event.outcome(&result)).await;
        result.map(|(view, _)| view)
    }

    /// Returns the new view and the serial the record had before.
    async fn replace(
        &self,
        regime: Regime,
        identifier: &str,
        input: EquipmentInput,
    ) -> AppResult<(EquipmentView, String)> {
        let mut record = input.into_record(regime, today())?;

        let gate = self.cache.begin_write().await;
        let mut tx = self.repository.begin().await?;
        let records = self.repository.equipment_load(&mut tx, regime).await?;
        let current = identifier::find(identifier, &records)?.record;
        ensure_unique(&records, &record, Some(&current.serial))?;

        self.repository
            .equipment_update(&mut tx, &current.serial, &record)
            .await?;
        if record.serial != current.serial {
            let moved = self
                .repository
                .history_repoint(&mut tx, regime, &current.serial, &record.serial)
                .await?;
            tracing::info!(
                "Serial {:?} renamed to {:?}, {} history note(s) re-pointed",
                current.serial,
                record.serial,
                moved
            );
        }
        record.has_history = current.has_history;
        commit_invalidated(&gate, tx, Scope::Regime(regime)).await?;
        drop(gate);

        tracing::info!("Updated {} equipment {:?}", regime.label(), record.serial);
        Ok((EquipmentView::new(record, None), current.serial.clone()))
    }

    /// Delete a record together with its history notes and attachments.
    pub async fn delete(&self, regime: Regime, identifier: &str, actor: &Actor) -> AppResult<()> {
        let result = self.remove(regime, identifier).await;
        let mut event = AuditEvent::new(
            AuditEventType::EquipmentDeleted,
            actor,
            format!("Deleted {} equipment {}", regime.label(), identifier),
        )
        .detail("regime", regime)
        .detail("identifier", identifier);
        if let Ok((serial, notes)) = &result {
            event = event.detail("serial", serial).detail("attachments_removed", notes);
        }
        self.audit.record(event.outcome(&result)).await;
        result.map(|_| ())
    }

    /// Returns the deleted serial and how many attachment files went with it.
    async fn remove(&self, regime: Regime, identifier: &str) -> AppResult<(String, usize)> {
        let gate = self.cache.begin_write().await;
        let mut tx = self.repository.begin().await?;
        let records = self.repository.equipment_load(&mut tx, regime).await?;
        let serial = identifier::find(identifier, &records)?.record.serial.clone();

        let attachments = self
            .repository
            .history_delete_for_equipment(&mut tx, regime, &serial)
            .await?;
        self.repository
            .equipment_delete(&mut tx, regime, &serial)
            .await?;
        commit_invalidated(&gate, tx, Scope::Regime(regime)).await?;
        drop(gate);

        self.uploads.remove(&attachments).await;
        tracing::info!("Deleted {} equipment {:?}", regime.label(), serial);
        Ok((serial, attachments.len()))
    }

    /// Delete several records in one transaction, then rebuild the caches.
    pub async fn bulk_delete(
        &self,
        regime: Regime,
        identifiers: &[String],
        actor: &Actor,
    ) -> AppResult<BulkDeleteReport> {
        let result = self.remove_many(regime, identifiers).await;
        let mut event = AuditEvent::new(
            AuditEventType::BulkDelete,
            actor,
            format!(
                "Bulk delete of {} {} identifier(s)",
                identifiers.len(),
                regime.label()
            ),
        )
        .detail("regime", regime)
        .detail("requested", identifiers.len());
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

    async fn remove_many(
        &self,
        regime: Regime,
        identifiers: &[String],
    ) -> AppResult<BulkDeleteReport> {
        let mut report = BulkDeleteReport::default();
        let mut attachments = Vec::new();

        let gate = self.cache.begin_write().await;
        let mut tx = self.repository.begin().await?;
        let records = self.repository.equipment_load(&mut tx, regime).await?;
        let mut deleted: HashSet<String> = HashSet::new();

        for identifier in identifiers {
            let Some(located) = identifier::locate(identifier, &records) else {
                report.not_found.push(identifier.clone());
                continue;
            };
            let serial = &located.record.serial;
            if !deleted.insert(serial.clone()) {
                continue;
            }
            attachments.extend(
                self.repository
                    .history_delete_for_equipment(&mut tx, regime, serial)
                    .await?,
            );
            self.repository
                .equipment_delete(&mut tx, regime, serial)
                .await?;
        }
        report.deleted_count = deleted.len();

        if report.deleted_count > 0 {
            commit_invalidated(&gate, tx, Scope::Regime(regime)).await?;
        } else {
            tx.rollback().await?;
        }
        drop(gate);

        self.uploads.remove(&attachments).await;
        if report.deleted_count > 0 {
            if let Err(e) = self.cache.warm(regime).await {
                tracing::warn!("Cache warm after bulk delete failed: {}", e);
            }
        }
        tracing::info!(
            "Bulk deleted {} {} record(s), {} not found",
            report.deleted_count,
            regime.label(),
            report.not_found.len()
        );
        Ok(report)
    }

    /// Recompute every record's status as of today and persist the changes.
    pub async fn recalculate_statuses(
        &self,
        regime: Regime,
        actor: &Actor,
    ) -> AppResult<RecalculateReport> {
        let result = self.refresh_statuses(regime).await;
        let mut event = AuditEvent::new(
            AuditEventType::StatusRecalculated,
            actor,
            format!("Recalculated {} maintenance statuses", regime.label()),
        )
        .detail("regime", regime);
        if let Ok(report) = &result {
            event = event
                .detail("checked", report.checked)
                .detail("changed", report.changed);
        }
        self.audit.record(event.outcome(&result)).await;
        result
    }

    async fn refresh_statuses(&self, regime: Regime) -> AppResult<RecalculateReport> {
        let today = today();
        let gate = self.cache.begin_write().await;
        let mut tx = self.repository.begin().await?;
        let records = self.repository.equipment_load(&mut tx, regime).await?;

        let mut report = RecalculateReport {
            checked: records.len(),
            changed: 0,
        };
        for mut record in records {
            if record.refresh_status(today) {
                self.repository
                    .equipment_update(&mut tx, &record.serial, &record)
                    .await?;
                report.changed += 1;
            }
        }

        if report.changed > 0 {
            commit_invalidated(&gate, tx, Scope::Regime(regime)).await?;
        } else {
            tx.rollback().await?;
        }
        tracing::info!(
            "Recalculated {} statuses: {} of {} changed",
            regime.label(),
            report.changed,
            report.checked
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Maintenance, MaintenanceStatus};

    fn record(serial: &str, log: &str) -> EquipmentRecord {
        EquipmentRecord {
            serial: serial.to_string(),
            regime: Regime::Ocm,
            name: None,
            department: "ICU".to_string(),
            model: "M".to_string(),
            manufacturer: "X".to_string(),
            log_number: log.to_string(),
            installation_date: None,
            warranty_end: None,
            maintenance: Maintenance::Ocm {
                service_date: None,
                next_maintenance: None,
                engineer: None,
            },
            status: MaintenanceStatus::Upcoming,
            has_history: false,
        }
    }

    #[test]
    fn test_ensure_unique() {
        let existing = vec![record("A", "L1"), record("B", "L2")];
        assert!(ensure_unique(&existing, &record("C", "L3"), None).is_ok());
        assert!(matches!(
            ensure_unique(&existing, &record("A", "L9"), None),
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            ensure_unique(&existing, &record("C", "L2"), None),
            Err(AppError::Conflict(_))
        ));
        // Replacing A with itself is fine, taking B's log number is not
        assert!(ensure_unique(&existing, &record("A", "L1"), Some("A")).is_ok());
        assert!(ensure_unique(&existing, &record("A2", "L2"), Some("A")).is_err());
    }
}
