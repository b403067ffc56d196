//! MedTrack - Hospital Equipment Maintenance Tracking
//!
//! REST JSON API for PPM (planned preventive maintenance) and OCM (on-call
//! maintenance) equipment records, their maintenance history, and staff
//! training records.

use std::sync::Arc;

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod identifier;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

use cache::{CacheCoordinator, MemoryRegion, ViewKind};
use models::audit::{Actor, AuditEvent, AuditEventType, AuditStatus};
use repository::Repository;
use services::{
    legacy::LegacyImporter,
    redis::{RedisRegion, RedisService},
    Services,
};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

impl AppState {
    /// Connect the database, register cache regions, create services and run
    /// the startup tasks: bootstrap admin, then the legacy JSON import.
    pub async fn build(config: AppConfig) -> AppResult<Self> {
        let pool = Repository::connect(&config.database).await?;
        tracing::info!("Connected to database");
        let repository = Repository::new(pool);

        let mut coordinator = CacheCoordinator::new(Arc::new(repository.clone()))
            .with_region(Arc::new(MemoryRegion::new(
                "listing",
                ViewKind::Listing,
                config.cache.listing_ttl(),
            )))
            .with_region(Arc::new(MemoryRegion::new(
                "dashboard",
                ViewKind::Dashboard,
                config.cache.dashboard_ttl(),
            )));
        if let Some(url) = &config.cache.redis_url {
            let redis = RedisService::new(url).await?;
            tracing::info!("Connected to Redis");
            coordinator = coordinator
                .with_region(Arc::new(RedisRegion::new(
                    redis.clone(),
                    "listing",
                    ViewKind::Listing,
                    config.cache.listing_ttl(),
                )))
                .with_region(Arc::new(RedisRegion::new(
                    redis,
                    "dashboard",
                    ViewKind::Dashboard,
                    config.cache.dashboard_ttl(),
                )));
        }
        let regions: Vec<String> = coordinator
            .region_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        tracing::info!("Cache regions: {:?}", regions);

        let services = Services::new(repository, Arc::new(coordinator), &config);

        if let Some(password) = services.users.ensure_bootstrap_admin().await? {
            tracing::warn!(
                "Generated password for administrator {}: {} (change it after first login)",
                config.auth.bootstrap_admin_username,
                password
            );
        }

        if let Some(dir) = &config.legacy.json_dir {
            LegacyImporter::new(&services).import_if_empty(dir).await?;
        }

        services
            .audit
            .record(
                AuditEvent::new(
                    AuditEventType::SystemStartup,
                    &Actor::system(),
                    format!("MedTrack {} started", env!("CARGO_PKG_VERSION")),
                )
                .detail("version", env!("CARGO_PKG_VERSION"))
                .detail("cache_regions", &regions)
                .status(AuditStatus::Info),
            )
            .await;

        Ok(Self {
            config: Arc::new(config),
            services: Arc::new(services),
        })
    }
}
