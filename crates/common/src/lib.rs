//! Common types and utilities for PeerMatch
//!
//! This crate provides the domain types shared by the matchmaking core,
//! its store backends and the binary.
//!
//! # Modules
//!
//! - [`error`] - Validation errors for domain types
//! - [`types`] - Users, preferences, matches and per-user queue state
//! - [`events`] - Events delivered to connected users

pub mod error;
pub mod events;
pub mod types;

pub use error::{Error, Result};
pub use events::{MatchEvent, MatchFoundPayload};
pub use types::*;
