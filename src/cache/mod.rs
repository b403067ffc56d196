//! Derived read caches and their coordinator
//!
//! Listings and dashboard statistics are projections of the equipment table.
//! They live in named regions (in-process, optionally Redis) and are never
//! authoritative. Every mutation clears them through the coordinator before it
//! commits; a failed clear aborts the mutation.
//!
//! Mutations hold the coordinator's write gate from their first read until
//! commit. Cache misses reload under the read gate, so a reload cannot slip in
//! between a mutation's invalidation and its commit.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, RwLockWriteGuard};

use crate::error::{AppError, AppResult};
use crate::models::{DashboardStats, EquipmentListing, EquipmentRecord, Regime};

pub use memory::MemoryRegion;

/// What an invalidation clears
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Regime(Regime),
    All,
}

impl Scope {
    pub fn covers(&self, regime: Regime) -> bool {
        match self {
            Scope::Regime(r) => *r == regime,
            Scope::All => true,
        }
    }

    pub fn regimes(&self) -> Vec<Regime> {
        match self {
            Scope::Regime(r) => vec![*r],
            Scope::All => Regime::ALL.to_vec(),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Regime(r) => write!(f, "{}", r),
            Scope::All => write!(f, "all"),
        }
    }
}

/// Which projection a region holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Listing,
    Dashboard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "view", content = "data", rename_all = "snake_case")]
pub enum CachedView {
    Listing(Arc<EquipmentListing>),
    Dashboard(Arc<DashboardStats>),
}

impl CachedView {
    pub fn kind(&self) -> ViewKind {
        match self {
            CachedView::Listing(_) => ViewKind::Listing,
            CachedView::Dashboard(_) => ViewKind::Dashboard,
        }
    }
}

/// A named cache region keyed by regime
#[async_trait]
pub trait CacheRegion: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> ViewKind;

    /// Non-expired entry, if any
    async fn get(&self, regime: Regime) -> AppResult<Option<CachedView>>;

    async fn put(&self, regime: Regime, view: CachedView) -> AppResult<()>;

    async fn evict(&self, scope: Scope) -> AppResult<()>;
}

/// Authoritative store the caches are derived from
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// All records of a regime in store order, with `has_history` filled in
    async fn load_regime(&self, regime: Regime) -> AppResult<Vec<EquipmentRecord>>;
}

/// Freshly derived projections for one regime
#[derive(Debug, Clone)]
pub struct Warmed {
    pub listing: Arc<EquipmentListing>,
    pub dashboard: Arc<DashboardStats>,
}

pub struct CacheCoordinator {
    source: Arc<dyn RecordSource>,
    regions: Vec<Arc<dyn CacheRegion>>,
    gate: RwLock<()>,
}

/// Exclusive hold on the coordinator for the span of one mutation
pub struct WriteGate<'a> {
    coordinator: &'a CacheCoordinator,
    _guard: RwLockWriteGuard<'a, ()>,
}

impl WriteGate<'_> {
    /// Clear `scope` from every region. Must succeed before the mutation commits.
    pub async fn invalidate(&self, scope: Scope) -> AppResult<()> {
        self.coordinator.evict_all(scope).await
    }
}

impl CacheCoordinator {
    pub fn new(source: Arc<dyn RecordSource>) -> Self {
        Self {
            source,
            regions: Vec::new(),
            gate: RwLock::new(()),
        }
    }

    pub fn with_region(mut self, region: Arc<dyn CacheRegion>) -> Self {
        self.regions.push(region);
        self
    }

    pub fn region_names(&self) -> Vec<&str> {
        self.regions.iter().map(|r| r.name()).collect()
    }

    /// Acquire the write gate. Do not call [`Self::listing`], [`Self::dashboard`]
    /// or [`Self::warm`] while holding it.
    pub async fn begin_write(&self) -> WriteGate<'_> {
        WriteGate {
            coordinator: self,
            _guard: self.gate.write().await,
        }
    }

    /// Stand-alone invalidation for callers outside a mutation.
    pub async fn invalidate(&self, scope: Scope) -> AppResult<()> {
        self.begin_write().await.invalidate(scope).await
    }

    async fn evict_all(&self, scope: Scope) -> AppResult<()> {
        let mut failures = Vec::new();
        for region in &self.regions {
            if let Err(e) = region.evict(scope).await {
                tracing::warn!("Cache region {} failed to evict {}: {}", region.name(), scope, e);
                failures.push(format!("{}: {}", region.name(), e));
            }
        }
        if failures.is_empty() {
            tracing::debug!("Invalidated {} cache(s) for {}", self.regions.len(), scope);
            Ok(())
        } else {
            Err(AppError::CacheInvalidation(failures.join("; ")))
        }
    }

    /// Reload `regime` from the store and populate every region.
    pub async fn warm(&self, regime: Regime) -> AppResult<Warmed> {
        let _read = self.gate.read().await;

        let records = self.source.load_regime(regime).await?;
        let dashboard = Arc::new(DashboardStats::from_records(regime, &records));
        let listing = Arc::new(EquipmentListing::build(regime, records));
        tracing::info!("Warmed {} cache with {} records", regime.label(), listing.rows.len());

        for region in &self.regions {
            let view = match region.kind() {
                ViewKind::Listing => CachedView::Listing(listing.clone()),
                ViewKind::Dashboard => CachedView::Dashboard(dashboard.clone()),
            };
            if let Err(e) = region.put(regime, view).await {
                tracing::warn!("Cache region {} failed to store {}: {}", region.name(), regime, e);
            }
        }

        Ok(Warmed { listing, dashboard })
    }

    async fn lookup(&self, kind: ViewKind, regime: Regime) -> Option<CachedView> {
        for region in self.regions.iter().filter(|r| r.kind() == kind) {
            match region.get(regime).await {
                Ok(Some(view)) if view.kind() == kind => {
                    tracing::debug!("Cache hit in {} for {}", region.name(), regime);
                    return Some(view);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Cache region {} read failed for {}: {}", region.name(), regime, e);
                }
            }
        }
        None
    }

    /// Cached listing, or a fresh one when every listing region misses.
    pub async fn listing(&self, regime: Regime) -> AppResult<Arc<EquipmentListing>> {
        if let Some(CachedView::Listing(listing)) = self.lookup(ViewKind::Listing, regime).await {
            return Ok(listing);
        }
        Ok(self.warm(regime).await?.listing)
    }

    pub async fn dashboard(&self, regime: Regime) -> AppResult<Arc<DashboardStats>> {
        if let Some(CachedView::Dashboard(stats)) = self.lookup(ViewKind::Dashboard, regime).await {
            return Ok(stats);
        }
        Ok(self.warm(regime).await?.dashboard)
    }
}
