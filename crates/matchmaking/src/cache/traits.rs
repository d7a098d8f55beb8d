//! Cache store trait

use async_trait::async_trait;

use crate::error::MatchingError;

/// Errors that can occur in the cache
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("Cache connection error: {0}")]
    Connection(String),

    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

impl From<CacheError> for MatchingError {
    fn from(err: CacheError) -> Self {
        MatchingError::CacheUnavailable(err.to_string())
    }
}

/// Key/value cache in front of the durable store
///
/// Values are JSON strings. Entries never expire; they are removed only by
/// explicit invalidation.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set(&self, key: &str, value: String) -> CacheResult<()>;

    /// Delete a key; deleting an absent key succeeds
    async fn delete(&self, key: &str) -> CacheResult<()>;
}
