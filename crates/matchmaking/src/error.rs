//! Matchmaking error types

use thiserror::Error;
use uuid::Uuid;

use crate::orchestrator::SagaStage;

/// Errors surfaced by the matchmaking core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchingError {
    /// Expected absence; callers treat it as a normal outcome
    #[error("Not found: {0}")]
    NotFound(String),

    /// Durable store could not be reached or rejected the operation
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Cache could not be reached
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Workspace provisioning failed upstream
    #[error("Provisioning failed ({status}): {message}")]
    ProvisioningFailed { status: u16, message: String },

    /// Preference input rejected at the boundary
    #[error("Invalid preference: {0}")]
    InvalidPreference(#[from] common::Error),

    /// User is a member of an active match
    #[error("User {0} is already matched")]
    AlreadyMatched(String),

    /// Operation not allowed in the user's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A rollback failed partway; durable and queue state may disagree
    #[error("Compensation failed for match {match_id} at {stage}: {message}")]
    CompensationFailed {
        match_id: Uuid,
        stage: SagaStage,
        message: String,
    },
}

/// Result type for matchmaking operations
pub type Result<T> = std::result::Result<T, MatchingError>;
