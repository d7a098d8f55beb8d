//! Durable store trait for matchmaking
//!
//! The durable store is the source of truth for preferences, queue
//! membership and matches. Caches are rebuilt from it on miss.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use common::{Match, MatchRef, UserId, UserPreference};

use crate::error::MatchingError;

/// Errors that can occur in the durable store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Match not found: {0}")]
    MatchNotFound(Uuid),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store error: {0}")]
    Other(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for MatchingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MatchNotFound(id) => MatchingError::NotFound(format!("match {}", id)),
            other => MatchingError::StoreUnavailable(other.to_string()),
        }
    }
}

/// Result of recording a new match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMatchOutcome {
    pub success: bool,
    pub message: Option<String>,
}

impl NewMatchOutcome {
    pub fn accepted() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Trait for the durable matchmaking store
///
/// Queue and match mutations are idempotent per user: removing an absent
/// user or adding a present one succeeds without effect.
#[async_trait]
pub trait MatchmakingStore: Send + Sync {
    // ------------------------------------------------------------------------
    // Preferences
    // ------------------------------------------------------------------------

    /// Get a user's preferences, `None` if never set
    async fn get_preferences(&self, user_id: &UserId) -> StoreResult<Option<UserPreference>>;

    /// Insert or replace a user's preferences
    async fn update_preferences(&self, preference: &UserPreference) -> StoreResult<()>;

    // ------------------------------------------------------------------------
    // Queue
    // ------------------------------------------------------------------------

    /// Add a user to the queue; a present user keeps its original position
    async fn add_to_queue(&self, user_id: &UserId) -> StoreResult<()>;

    /// Remove a user from the queue
    async fn remove_from_queue(&self, user_id: &UserId) -> StoreResult<()>;

    /// Queue members, earliest joiner first
    async fn queue_members(&self) -> StoreResult<Vec<UserId>>;

    /// When a queued user joined, `None` if not queued
    async fn queue_joined_at(&self, user_id: &UserId) -> StoreResult<Option<DateTime<Utc>>>;

    /// Put a user back at the position given by an earlier join time;
    /// a present user is left where it is
    async fn restore_to_queue(&self, user_id: &UserId, joined_at: DateTime<Utc>) -> StoreResult<()>;

    // ------------------------------------------------------------------------
    // Matches
    // ------------------------------------------------------------------------

    /// Record a pending match for two users.
    ///
    /// Rejected (not an error) when the users are the same or either one
    /// already holds a live match.
    async fn handle_new_match(
        &self,
        user1_id: &UserId,
        user2_id: &UserId,
        match_id: Uuid,
    ) -> StoreResult<NewMatchOutcome>;

    /// Promote a pending match to active with its workspace reference
    async fn activate_match(&self, match_id: Uuid, workspace_ref: &str) -> StoreResult<()>;

    /// Delete a match record; deleting an absent match succeeds
    async fn delete_match(&self, match_id: Uuid) -> StoreResult<()>;

    /// Active match of a user, if any
    async fn get_match_status(&self, user_id: &UserId) -> StoreResult<Option<Match>>;

    /// Get a match by id regardless of status
    async fn get_match(&self, match_id: Uuid) -> StoreResult<Option<Match>>;

    /// Cancel live matches by match id or by member, returning them
    async fn clear_matches(&self, target: &MatchRef) -> StoreResult<Vec<Match>>;
}
