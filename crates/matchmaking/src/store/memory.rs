//! In-memory durable store

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use common::{Match, MatchRef, MatchStatus, UserId, UserPreference};

use crate::store::traits::{MatchmakingStore, NewMatchOutcome, StoreError, StoreResult};

/// Store operations, used to inject failures and count calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    GetPreferences,
    UpdatePreferences,
    AddToQueue,
    RemoveFromQueue,
    QueueMembers,
    QueueJoinedAt,
    RestoreToQueue,
    HandleNewMatch,
    ActivateMatch,
    DeleteMatch,
    GetMatchStatus,
    ClearMatches,
}

#[derive(Default)]
struct State {
    preferences: HashMap<UserId, UserPreference>,
    /// Sorted by join time, earliest first
    queue: Vec<(UserId, DateTime<Utc>)>,
    matches: HashMap<Uuid, Match>,
}

impl State {
    fn queued(&self, user_id: &UserId) -> bool {
        self.queue.iter().any(|(u, _)| u == user_id)
    }

    /// Insert keeping join-time order; equal times keep insertion order
    fn enqueue(&mut self, user_id: &UserId, joined_at: DateTime<Utc>) {
        let at = self.queue.partition_point(|(_, t)| *t <= joined_at);
        self.queue.insert(at, (user_id.clone(), joined_at));
    }

    fn live_match_of(&self, user_id: &UserId) -> Option<&Match> {
        self.matches
            .values()
            .find(|m| m.status.is_live() && m.involves(user_id))
    }
}

/// In-memory durable store
///
/// Fast but non-persistent. Used for tests and single-process runs.
/// Individual operations can be made to fail to exercise degraded paths.
pub struct InMemoryStore {
    state: RwLock<State>,
    failing: Mutex<HashSet<StoreOp>>,
    calls: Mutex<HashMap<StoreOp, usize>>,
}

impl InMemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            failing: Mutex::new(HashSet::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Make an operation fail until [`recover`](Self::recover) is called
    pub fn fail_on(&self, op: StoreOp) {
        self.failing.lock().insert(op);
    }

    /// Stop failing an operation
    pub fn recover(&self, op: StoreOp) {
        self.failing.lock().remove(&op);
    }

    /// How many times an operation was invoked
    pub fn call_count(&self, op: StoreOp) -> usize {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    fn enter(&self, op: StoreOp) -> StoreResult<()> {
        *self.calls.lock().entry(op).or_insert(0) += 1;
        if self.failing.lock().contains(&op) {
            return Err(StoreError::Database(format!("{:?} unavailable", op)));
        }
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MatchmakingStore for InMemoryStore {
    async fn get_preferences(&self, user_id: &UserId) -> StoreResult<Option<UserPreference>> {
        self.enter(StoreOp::GetPreferences)?;
        let state = self.state.read().await;
        Ok(state.preferences.get(user_id).cloned())
    }

    async fn update_preferences(&self, preference: &UserPreference) -> StoreResult<()> {
        self.enter(StoreOp::UpdatePreferences)?;
        let mut state = self.state.write().await;
        state
            .preferences
            .insert(preference.user_id.clone(), preference.clone());
        Ok(())
    }

    async fn add_to_queue(&self, user_id: &UserId) -> StoreResult<()> {
        self.enter(StoreOp::AddToQueue)?;
        let mut state = self.state.write().await;
        if !state.queued(user_id) {
            // strictly after the current tail, so FIFO survives equal or stepped-back clocks
            let now = Utc::now();
            let joined_at = state
                .queue
                .last()
                .map_or(now, |(_, t)| now.max(*t + Duration::microseconds(1)));
            state.enqueue(user_id, joined_at);
            debug!(user = %user_id, depth = state.queue.len(), "Queued user");
        }
        Ok(())
    }

    async fn remove_from_queue(&self, user_id: &UserId) -> StoreResult<()> {
        self.enter(StoreOp::RemoveFromQueue)?;
        let mut state = self.state.write().await;
        state.queue.retain(|(u, _)| u != user_id);
        Ok(())
    }

    async fn queue_members(&self) -> StoreResult<Vec<UserId>> {
        self.enter(StoreOp::QueueMembers)?;
        let state = self.state.read().await;
        Ok(state.queue.iter().map(|(u, _)| u.clone()).collect())
    }

    async fn queue_joined_at(&self, user_id: &UserId) -> StoreResult<Option<DateTime<Utc>>> {
        self.enter(StoreOp::QueueJoinedAt)?;
        let state = self.state.read().await;
        Ok(state
            .queue
            .iter()
            .find(|(u, _)| u == user_id)
            .map(|(_, t)| *t))
    }

    async fn restore_to_queue(&self, user_id: &UserId, joined_at: DateTime<Utc>) -> StoreResult<()> {
        self.enter(StoreOp::RestoreToQueue)?;
        let mut state = self.state.write().await;
        if !state.queued(user_id) {
            state.enqueue(user_id, joined_at);
            debug!(user = %user_id, %joined_at, "Restored user to queue");
        }
        Ok(())
    }

    async fn handle_new_match(
        &self,
        user1_id: &UserId,
        user2_id: &UserId,
        match_id: Uuid,
    ) -> StoreResult<NewMatchOutcome> {
        self.enter(StoreOp::HandleNewMatch)?;
        if user1_id == user2_id {
            return Ok(NewMatchOutcome::rejected("cannot match a user with themselves"));
        }

        let mut state = self.state.write().await;
        for user in [user1_id, user2_id] {
            if let Some(existing) = state.live_match_of(user) {
                return Ok(NewMatchOutcome::rejected(format!(
                    "user {} already in match {}",
                    user, existing.match_id
                )));
            }
        }

        state.matches.insert(
            match_id,
            Match::pending(match_id, user1_id.clone(), user2_id.clone()),
        );
        Ok(NewMatchOutcome::accepted())
    }

    async fn activate_match(&self, match_id: Uuid, workspace_ref: &str) -> StoreResult<()> {
        self.enter(StoreOp::ActivateMatch)?;
        let mut state = self.state.write().await;
        let record = state
            .matches
            .get_mut(&match_id)
            .ok_or(StoreError::MatchNotFound(match_id))?;
        record.status = MatchStatus::Active;
        record.workspace_ref = Some(workspace_ref.to_string());
        Ok(())
    }

    async fn delete_match(&self, match_id: Uuid) -> StoreResult<()> {
        self.enter(StoreOp::DeleteMatch)?;
        let mut state = self.state.write().await;
        state.matches.remove(&match_id);
        Ok(())
    }

    async fn get_match_status(&self, user_id: &UserId) -> StoreResult<Option<Match>> {
        self.enter(StoreOp::GetMatchStatus)?;
        let state = self.state.read().await;
        Ok(state
            .matches
            .values()
            .find(|m| m.is_active() && m.involves(user_id))
            .cloned())
    }

    async fn get_match(&self, match_id: Uuid) -> StoreResult<Option<Match>> {
        let state = self.state.read().await;
        Ok(state.matches.get(&match_id).cloned())
    }

    async fn clear_matches(&self, target: &MatchRef) -> StoreResult<Vec<Match>> {
        self.enter(StoreOp::ClearMatches)?;
        let mut state = self.state.write().await;
        let mut cleared = Vec::new();
        for record in state.matches.values_mut() {
            let hit = match target {
                MatchRef::Match(id) => record.match_id == *id,
                MatchRef::User(user) => record.involves(user),
            };
            if hit && record.status.is_live() {
                record.status = MatchStatus::Cancelled;
                cleared.push(record.clone());
            }
        }
        Ok(cleared)
    }
}
