//! In-process cache region with passive TTL expiry

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CacheRegion, CachedView, Scope, ViewKind};
use crate::error::AppResult;
use crate::models::Regime;

pub struct MemoryRegion {
    name: String,
    kind: ViewKind,
    ttl: Duration,
    entries: RwLock<HashMap<Regime, (CachedView, Instant)>>,
}

impl MemoryRegion {
    pub fn new(name: impl Into<String>, kind: ViewKind, ttl: Duration) -> Self {
        Self {
            name: name.into(),
            kind,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl CacheRegion for MemoryRegion {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ViewKind {
        self.kind
    }

    async fn get(&self, regime: Regime) -> AppResult<Option<CachedView>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(&regime)
            .filter(|(_, stored_at)| stored_at.elapsed() < self.ttl)
            .map(|(view, _)| view.clone()))
    }

    async fn put(&self, regime: Regime, view: CachedView) -> AppResult<()> {
        self.entries
            .write()
            .await
            .insert(regime, (view, Instant::now()));
        Ok(())
    }

    async fn evict(&self, scope: Scope) -> AppResult<()> {
        let mut entries = self.entries.write().await;
        entries.retain(|regime, _| !scope.covers(*regime));
        Ok(())
    }
}
