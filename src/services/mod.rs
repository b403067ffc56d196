//! Business logic services

pub mod audit;
pub mod equipment;
pub mod history;
pub mod import_export;
pub mod legacy;
pub mod redis;
pub mod training;
pub mod uploads;
pub mod users;

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use sqlx::{Sqlite, Transaction};

use crate::{
    cache::{CacheCoordinator, Scope, WriteGate},
    config::AppConfig,
    error::AppResult,
    repository::Repository,
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub repository: Repository,
    pub cache: Arc<CacheCoordinator>,
    pub audit: audit::AuditService,
    pub equipment: equipment::EquipmentService,
    pub history: history::HistoryService,
    pub import_export: import_export::ImportExportService,
    pub training: training::TrainingService,
    pub uploads: uploads::UploadStore,
    pub users: users::UsersService,
}

impl Services {
    /// Create all services with the given repository and cache coordinator
    pub fn new(repository: Repository, cache: Arc<CacheCoordinator>, config: &AppConfig) -> Self {
        let uploads = uploads::UploadStore::new(&config.uploads);
        let audit = audit::AuditService::new(repository.clone(), &config.audit);
        Self {
            equipment: equipment::EquipmentService::new(
                repository.clone(),
                cache.clone(),
                uploads.clone(),
                audit.clone(),
            ),
            history: history::HistoryService::new(
                repository.clone(),
                cache.clone(),
                uploads.clone(),
                audit.clone(),
            ),
            import_export: import_export::ImportExportService::new(
                repository.clone(),
                cache.clone(),
                audit.clone(),
            ),
            training: training::TrainingService::new(repository.clone(), audit.clone()),
            users: users::UsersService::new(repository.clone(), config.auth.clone(), audit.clone()),
            audit,
            uploads,
            cache,
            repository,
        }
    }
}

/// Clear `scope` from every cache region, then commit. When the caches cannot
/// be cleared the transaction is rolled back and the error returned.
pub(crate) async fn commit_invalidated(
    gate: &WriteGate<'_>,
    tx: Transaction<'static, Sqlite>,
    scope: Scope,
) -> AppResult<()> {
    if let Err(e) = gate.invalidate(scope).await {
        tx.rollback().await?;
        return Err(e);
    }
    tx.commit().await?;
    Ok(())
}

pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}
