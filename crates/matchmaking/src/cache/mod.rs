//! Cache layer
//!
//! A key/value cache in front of the durable store. Cache failures are never
//! fatal: readers fall back to the store and writers evict on doubt.

pub mod keys;
mod memory;
#[cfg(feature = "redis")]
mod redis;
mod traits;

pub use memory::InMemoryCache;
#[cfg(feature = "redis")]
pub use self::redis::RedisCache;
pub use traits::*;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Read and decode a JSON value
pub async fn get_json<T: DeserializeOwned>(
    cache: &dyn CacheStore,
    key: &str,
) -> CacheResult<Option<T>> {
    match cache.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| CacheError::Serialization(e.to_string())),
        None => Ok(None),
    }
}

/// Encode and write a JSON value
pub async fn set_json<T: Serialize + ?Sized>(
    cache: &dyn CacheStore,
    key: &str,
    value: &T,
) -> CacheResult<()> {
    let raw = serde_json::to_string(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
    cache.set(key, raw).await
}

/// Create the cache from configuration
pub async fn create_cache(config: &config::CacheConfig) -> CacheResult<Arc<dyn CacheStore>> {
    match config.cache_type.to_lowercase().as_str() {
        "memory" | "inmemory" | "in_memory" => {
            info!("Creating in-memory cache");
            Ok(Arc::new(InMemoryCache::new()))
        }
        #[cfg(feature = "redis")]
        "redis" => {
            let redis = config
                .redis
                .as_ref()
                .ok_or_else(|| CacheError::Connection("redis config required".to_string()))?;
            info!("Creating Redis cache");
            Ok(Arc::new(RedisCache::connect(redis).await?))
        }
        other => Err(CacheError::Connection(format!(
            "unsupported cache type '{}'",
            other
        ))),
    }
}
