//! Observability infrastructure for PeerMatch
//!
//! This crate provides:
//! - Structured logging via tracing
//! - Prometheus metrics
//! - Matchmaking metric helpers
//!
//! # Quick Start
//!
//! ```ignore
//! use observability::{init_logging, LogFormat};
//!
//! init_logging("peermatch", LogFormat::Pretty, None)?;
//!
//! // Optional
//! observability::metrics::init_metrics(9090)?;
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat};
pub use metrics::{init_metrics, MatchmakingMetrics, SagaTimer};
