//! Read-through cache for petitions and listings
//!
//! The cache is strictly best-effort: every call runs under a deadline and any
//! failure degrades to a store read. [`PetitionCache`] owns the key scheme and
//! TTL policy; [`CacheClient`] is the raw key/value backend.

pub mod memory;
pub mod redis;

pub use self::memory::MemoryCacheClient;
pub use self::redis::RedisCacheClient;

use async_trait::async_trait;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::CacheConfig;

/// Cache TTL constants (in seconds)
pub mod ttl {
    pub const PETITION: u64 = 600; // 10 minutes
    pub const PAGE: u64 = 300; // 5 minutes
    pub const LISTING_MIN: u64 = 1500; // 25 minutes
    pub const LISTING_MAX: u64 = 1800; // 30 minutes
}

/// Cache keys
pub mod keys {
    use uuid::Uuid;

    /// Unpaged listing; also the prefix of every listing key
    pub const LISTING: &str = "petitions";

    pub fn petition(id: Uuid) -> String {
        format!("petition:{}", id)
    }

    pub fn page(page: i64, limit: i64) -> String {
        format!("{}:page:{}:limit:{}", LISTING, page, limit)
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait CacheClient: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Every key starting with `prefix`, gathered with a cursor scan
    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, CacheError>;

    /// Returns the number of keys removed
    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError>;
}

/// Outcome of a cache read
#[derive(Debug)]
pub enum CacheLookup<T> {
    Hit(T),
    Miss,
    Error(CacheError),
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub sets: u64,
    pub deletes: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64) / (total as f64) * 100.0
        }
    }
}

#[derive(Clone)]
pub struct PetitionCache {
    client: Arc<dyn CacheClient>,
    config: CacheConfig,
    metrics: Arc<RwLock<CacheMetrics>>,
}

impl PetitionCache {
    pub fn new(client: Arc<dyn CacheClient>, config: CacheConfig) -> Self {
        PetitionCache {
            client,
            config,
            metrics: Arc::new(RwLock::new(CacheMetrics::default())),
        }
    }

    pub fn petition_ttl(&self) -> Duration {
        Duration::from_secs(self.config.petition_ttl_secs)
    }

    pub fn page_ttl(&self) -> Duration {
        Duration::from_secs(self.config.page_ttl_secs)
    }

    /// Jittered TTL for the unpaged listing so replicas don't expire together
    pub fn listing_ttl(&self) -> Duration {
        let min = self.config.listing_ttl_min_secs;
        let max = self.config.listing_ttl_max_secs.max(min);
        Duration::from_secs(rand::thread_rng().gen_range(min..=max))
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        let deadline = self.config.op_timeout();
        match tokio::time::timeout(deadline, op).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(deadline)),
        }
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub async fn lookup<T: DeserializeOwned>(&self, key: &str) -> CacheLookup<T> {
        match self.bounded(self.client.get(key)).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(value) => {
                    self.record(|m| m.hits += 1).await;
                    CacheLookup::Hit(value)
                }
                Err(e) => {
                    warn!("Discarding undecodable cache entry {}: {}", key, e);
                    self.record(|m| m.misses += 1).await;
                    CacheLookup::Miss
                }
            },
            Ok(None) => {
                self.record(|m| m.misses += 1).await;
                CacheLookup::Miss
            }
            Err(e) => {
                self.record(|m| m.errors += 1).await;
                CacheLookup::Error(e)
            }
        }
    }

    /// Best-effort write; failures are logged and dropped
    pub async fn store<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize cache entry {}: {}", key, e);
                return;
            }
        };

        match self.bounded(self.client.set(key, &json, ttl)).await {
            Ok(()) => self.record(|m| m.sets += 1).await,
            Err(e) => {
                self.record(|m| m.errors += 1).await;
                warn!("Cache write for {} failed: {}", key, e);
            }
        }
    }

    /// Serve `key` from cache, or run `loader` and populate the entry
    ///
    /// Loader errors are returned unchanged and nothing is cached.
    pub async fn get_or_load<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        loader: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.lookup(key).await {
            CacheLookup::Hit(value) => {
                debug!("Cache hit for {}", key);
                return Ok(value);
            }
            CacheLookup::Miss => debug!("Cache miss for {}", key),
            CacheLookup::Error(e) => warn!("Cache read for {} failed, using store: {}", key, e),
        }

        let value = loader().await?;
        self.store(key, &value, ttl).await;
        Ok(value)
    }

    // =========================================================================
    // INVALIDATION
    // =========================================================================

    pub async fn invalidate_petition(&self, id: Uuid) -> Result<(), CacheError> {
        let removed = self.bounded(self.client.delete(&[keys::petition(id)])).await?;
        self.record(|m| m.deletes += removed).await;
        debug!("Invalidated petition {}", id);
        Ok(())
    }

    /// Drop the unpaged listing and every page
    pub async fn invalidate_all_listings(&self) -> Result<u64, CacheError> {
        let found = self.bounded(self.client.scan_keys(keys::LISTING)).await?;
        if found.is_empty() {
            return Ok(0);
        }

        let removed = self.bounded(self.client.delete(&found)).await?;
        self.record(|m| m.deletes += removed).await;
        debug!("Invalidated {} listing entries", removed);
        Ok(removed)
    }

    // =========================================================================
    // METRICS
    // =========================================================================

    async fn record(&self, update: impl FnOnce(&mut CacheMetrics)) {
        let mut metrics = self.metrics.write().await;
        update(&mut metrics);
    }

    /// Get current cache metrics
    pub async fn get_metrics(&self) -> CacheMetrics {
        *self.metrics.read().await
    }
}
