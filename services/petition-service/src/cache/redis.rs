use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::info;

use super::{CacheClient, CacheError};

/// Redis backend over a multiplexed, auto-reconnecting connection
#[derive(Clone)]
pub struct RedisCacheClient {
    redis: ConnectionManager,
}

impl RedisCacheClient {
    pub fn new(redis: ConnectionManager) -> Self {
        RedisCacheClient { redis }
    }

    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        info!("Connected to Redis");
        Ok(Self::new(manager))
    }
}

#[async_trait]
impl CacheClient for RedisCacheClient {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.redis.clone().get::<_, Option<String>>(key).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let seconds = ttl.as_secs().max(1);
        let _: () = self.redis.clone().set_ex(key, value, seconds).await?;
        Ok(())
    }

    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        // Cursor scan; never KEYS
        let pattern = format!("{}*", prefix);
        let mut conn = self.redis.clone();
        let mut iter = conn.scan_match::<_, String>(pattern).await?;

        let mut keys = Vec::new();
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let removed: u64 = self.redis.clone().del(keys).await?;
        Ok(removed)
    }
}
