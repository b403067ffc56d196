//! Redis-backed cache regions
//!
//! Optional second tier next to the in-process regions, for deployments that
//! run several server processes against one database.

use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client};

use crate::{
    cache::{CacheRegion, CachedView, Scope, ViewKind},
    error::{AppError, AppResult},
    models::Regime,
};

#[derive(Clone)]
pub struct RedisService {
    client: Client,
}

impl RedisService {
    /// Create a new Redis service
    pub async fn new(url: &str) -> AppResult<Self> {
        let client = Client::open(url)
            .map_err(|e| AppError::Internal(format!("Failed to create Redis client: {}", e)))?;

        // Test connection
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to connect to Redis: {}", e)))?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Redis connection test failed: {}", e)))?;

        Ok(Self { client })
    }

    /// Get a Redis connection
    pub async fn get_connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get Redis connection: {}", e)))
    }
}

/// One cache region stored as JSON under `medtrack:cache:{name}:{regime}`
pub struct RedisRegion {
    redis: RedisService,
    name: String,
    kind: ViewKind,
    ttl: Duration,
}

impl RedisRegion {
    pub fn new(redis: RedisService, name: impl Into<String>, kind: ViewKind, ttl: Duration) -> Self {
        Self {
            redis,
            name: name.into(),
            kind,
            ttl,
        }
    }

    fn key(&self, regime: Regime) -> String {
        format!("medtrack:cache:{}:{}", self.name, regime.as_str())
    }
}

#[async_trait]
impl CacheRegion for RedisRegion {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ViewKind {
        self.kind
    }

    async fn get(&self, regime: Regime) -> AppResult<Option<CachedView>> {
        let mut conn = self.redis.get_connection().await?;
        let stored: Option<String> = conn
            .get(self.key(regime))
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read cache from Redis: {}", e)))?;

        match stored {
            Some(json) => match serde_json::from_str::<CachedView>(&json) {
                Ok(view) if view.kind() == self.kind => Ok(Some(view)),
                Ok(_) => Ok(None),
                Err(e) => {
                    tracing::warn!("Discarding unreadable cache entry {}: {}", self.key(regime), e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn put(&self, regime: Regime, view: CachedView) -> AppResult<()> {
        if self.ttl.is_zero() {
            return Ok(());
        }
        let json = serde_json::to_string(&view)
            .map_err(|e| AppError::Internal(format!("Failed to serialize cache entry: {}", e)))?;
        let mut conn = self.redis.get_connection().await?;
        conn.set_ex::<_, _, ()>(self.key(regime), json, self.ttl.as_secs().max(1))
            .await
            .map_err(|e| AppError::Internal(format!("Failed to store cache in Redis: {}", e)))?;
        Ok(())
    }

    async fn evict(&self, scope: Scope) -> AppResult<()> {
        let keys: Vec<String> = scope.regimes().into_iter().map(|r| self.key(r)).collect();
        let mut conn = self.redis.get_connection().await?;
        conn.del::<_, ()>(keys)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to evict cache in Redis: {}", e)))?;
        Ok(())
    }
}
