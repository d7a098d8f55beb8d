//! Matchmaking core for PeerMatch
//!
//! Pairs users waiting in a queue by difficulty and turns each pair into an
//! active match with a provisioned collaboration workspace.
//!
//! # Features
//!
//! - Write-through preference storage with cache fallback
//! - Ordered queue with per-user exclusivity
//! - Single-pair pairing passes behind a mutual-exclusion gate
//! - Match creation saga with compensation
//! - Best-effort `MATCH_FOUND` notifications
//! - Interval-driven queue worker
//!
//! # Feature Flags
//!
//! - `postgres` - Enable PostgreSQL durable store
//! - `redis` - Enable Redis cache
//! - `client` - Enable HTTP provisioning client

pub mod cache;
pub mod clients;
pub mod error;
pub mod match_cache;
pub mod notifier;
pub mod orchestrator;
pub mod pairing;
pub mod preferences;
pub mod queue;
pub mod service;
pub mod store;
pub mod worker;

// Re-export commonly used types
pub use error::{MatchingError, Result};
pub use orchestrator::{MatchOrchestrator, SagaOutcome, SagaStage};
pub use pairing::{PairingEngine, Proposal};
pub use service::{MatchingService, PassSummary};
pub use worker::QueueWorker;

// Collaborator exports
pub use cache::{create_cache, CacheStore, InMemoryCache};
pub use clients::{Collaboration, MockProvisioner, ProvisioningError, WorkspaceProvisioner};
pub use notifier::{ChannelNotifier, Delivery, Notifier, RecordingNotifier};
pub use store::{create_store, InMemoryStore, MatchmakingStore};

#[cfg(feature = "postgres")]
pub use store::PostgresMatchmakingStore;

#[cfg(feature = "redis")]
pub use cache::RedisCache;

#[cfg(feature = "client")]
pub use clients::HttpProvisioner;
