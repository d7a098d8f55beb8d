//! Durable store for matchmaking
//!
//! This module provides the store trait and implementations.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod traits;

pub use memory::{InMemoryStore, StoreOp};
#[cfg(feature = "postgres")]
pub use postgres::PostgresMatchmakingStore;
pub use traits::*;

use std::sync::Arc;
use tracing::info;

/// Store type selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreType {
    /// In-memory store (fast, non-persistent)
    InMemory,
    /// PostgreSQL store (persistent)
    Postgres,
}

impl StoreType {
    /// Parse store type from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "inmemory" | "in_memory" | "memory" => Some(StoreType::InMemory),
            "postgres" | "postgresql" => Some(StoreType::Postgres),
            _ => None,
        }
    }
}

/// Create the durable store from configuration
pub async fn create_store(config: &config::StoreConfig) -> StoreResult<Arc<dyn MatchmakingStore>> {
    let store_type = StoreType::parse(&config.store_type).ok_or_else(|| {
        StoreError::Other(format!("unknown store type '{}'", config.store_type))
    })?;

    match store_type {
        StoreType::InMemory => {
            info!("Creating in-memory store");
            Ok(Arc::new(InMemoryStore::new()))
        }
        #[cfg(feature = "postgres")]
        StoreType::Postgres => {
            let pg = config
                .postgres
                .as_ref()
                .ok_or_else(|| StoreError::Other("postgres config required".to_string()))?;
            info!("Creating PostgreSQL store");
            let store = PostgresMatchmakingStore::connect(pg).await?;
            store.ensure_schema().await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "postgres"))]
        StoreType::Postgres => Err(StoreError::Other(
            "postgres store requires the 'postgres' feature".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_type_parse() {
        assert_eq!(StoreType::parse("memory"), Some(StoreType::InMemory));
        assert_eq!(StoreType::parse("Postgres"), Some(StoreType::Postgres));
        assert_eq!(StoreType::parse("mongo"), None);
    }

    #[tokio::test]
    async fn test_create_memory_store() {
        let store = create_store(&config::StoreConfig::default()).await.unwrap();
        assert!(store.queue_members().await.unwrap().is_empty());
    }
}
