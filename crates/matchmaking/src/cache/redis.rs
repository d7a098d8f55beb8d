//! Redis cache

use async_trait::async_trait;
use redis::AsyncCommands;
use std::sync::Arc;
use tracing::info;

use config::RedisConfig;

use crate::cache::traits::{CacheError, CacheResult, CacheStore};

fn redis_err(e: redis::RedisError) -> CacheError {
    CacheError::Connection(e.to_string())
}

/// Redis-backed cache
pub struct RedisCache {
    /// Connection manager (wrapped in Mutex for mutable access)
    redis: Arc<tokio::sync::Mutex<redis::aio::ConnectionManager>>,
}

impl RedisCache {
    /// Connect to Redis
    pub async fn connect(config: &RedisConfig) -> CacheResult<Self> {
        info!(host = %config.host, port = config.port, db = config.db_index, "Connecting to Redis");

        let client = redis::Client::open(config.connection_url().as_str()).map_err(redis_err)?;
        let manager = client.get_connection_manager().await.map_err(redis_err)?;

        Ok(Self {
            redis: Arc::new(tokio::sync::Mutex::new(manager)),
        })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut redis = self.redis.lock().await;
        redis.get::<_, Option<String>>(key).await.map_err(redis_err)
    }

    async fn set(&self, key: &str, value: String) -> CacheResult<()> {
        let mut redis = self.redis.lock().await;
        redis.set::<_, _, ()>(key, value).await.map_err(redis_err)
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut redis = self.redis.lock().await;
        redis.del::<_, ()>(key).await.map_err(redis_err)
    }
}
