//! Queue adapter
//!
//! Durable queue membership plus an in-process ledger of per-user state
//! (`idle | queued | matching | matched`). Ledger transitions are atomic
//! compare-and-set under one lock, which is what keeps a user out of two
//! match attempts at once.
//!
//! The ledger starts empty. A user it has never seen is checked against the
//! durable store's active matches before being admitted, so matches made
//! before a restart or by another process are respected.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use common::{UserId, UserState};

use crate::error::{MatchingError, Result};
use crate::store::MatchmakingStore;

#[derive(Default)]
struct Ledger {
    states: HashMap<UserId, UserState>,
    /// State each claimed user held before the claim
    claimed_from: HashMap<UserId, UserState>,
    /// Users that asked to leave while claimed by a match attempt
    departed: HashSet<UserId>,
    /// In-flight joins per user; such users cannot be claimed
    joining: HashMap<UserId, usize>,
    /// Join time of claimed users taken off the durable queue
    positions: HashMap<UserId, DateTime<Utc>>,
}

impl Ledger {
    fn state(&self, user_id: &UserId) -> UserState {
        self.states.get(user_id).copied().unwrap_or_default()
    }

    fn set(&mut self, user_id: &UserId, state: UserState) {
        self.states.insert(user_id.clone(), state);
    }

    fn is_joining(&self, user_id: &UserId) -> bool {
        self.joining.contains_key(user_id)
    }

    fn finish_join(&mut self, user_id: &UserId) {
        if let Some(n) = self.joining.get_mut(user_id) {
            *n -= 1;
            if *n == 0 {
                self.joining.remove(user_id);
            }
        }
    }

    fn clear_claim(&mut self, user_id: &UserId) {
        self.claimed_from.remove(user_id);
        self.positions.remove(user_id);
    }
}

/// Queue membership with per-user exclusivity
pub struct QueueAdapter {
    store: Arc<dyn MatchmakingStore>,
    ledger: Mutex<Ledger>,
}

impl QueueAdapter {
    pub fn new(store: Arc<dyn MatchmakingStore>) -> Self {
        Self {
            store,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    /// Current state of a user
    pub fn state(&self, user_id: &UserId) -> UserState {
        self.ledger.lock().state(user_id)
    }

    // ------------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------------

    /// Add a user to the queue.
    ///
    /// Re-adding a queued user is a no-op. Users in a live match attempt or
    /// an active match, in the ledger or in the store, are rejected. The
    /// user cannot be claimed until the durable write has settled.
    pub async fn join(&self, user_id: &UserId) -> Result<()> {
        let prior = {
            let mut ledger = self.ledger.lock();
            match ledger.state(user_id) {
                UserState::Matched => return Err(MatchingError::AlreadyMatched(user_id.to_string())),
                UserState::Matching => {
                    return Err(MatchingError::InvalidState(format!(
                        "user {} is being matched",
                        user_id
                    )))
                }
                state => {
                    *ledger.joining.entry(user_id.clone()).or_insert(0) += 1;
                    state
                }
            }
        };

        let admitted = self.join_durably(user_id, prior).await;

        let mut ledger = self.ledger.lock();
        ledger.finish_join(user_id);
        match admitted? {
            true => {
                if ledger.state(user_id) == UserState::Idle {
                    ledger.set(user_id, UserState::Queued);
                }
                info!(user = %user_id, "User joined queue");
                Ok(())
            }
            false => {
                if ledger.state(user_id) == UserState::Idle {
                    ledger.set(user_id, UserState::Matched);
                }
                Err(MatchingError::AlreadyMatched(user_id.to_string()))
            }
        }
    }

    /// Durable half of a join; `false` when the store already holds an
    /// active match for a user the ledger saw as idle
    async fn join_durably(&self, user_id: &UserId, prior: UserState) -> Result<bool> {
        if prior == UserState::Idle {
            if let Some(active) = self.store.get_match_status(user_id).await? {
                info!(user = %user_id, match_id = %active.match_id, "User already has an active match");
                if let Err(e) = self.store.remove_from_queue(user_id).await {
                    warn!(user = %user_id, error = %e, "Could not drop matched user from queue");
                }
                return Ok(false);
            }
        }

        if let Err(e) = self.store.add_to_queue(user_id).await {
            error!("Failed to add user {} to queue: {}", user_id, e);
            return Err(e.into());
        }
        Ok(true)
    }

    /// Remove a user from the queue.
    ///
    /// Idempotent. A user claimed by an in-flight match attempt is marked
    /// departed so a rollback will not put them back.
    pub async fn leave(&self, user_id: &UserId) -> Result<()> {
        if let Err(e) = self.store.remove_from_queue(user_id).await {
            error!("Failed to remove user {} from queue: {}", user_id, e);
            return Err(e.into());
        }

        let mut ledger = self.ledger.lock();
        match ledger.state(user_id) {
            UserState::Queued => ledger.set(user_id, UserState::Idle),
            UserState::Matching => {
                ledger.departed.insert(user_id.clone());
                debug!(user = %user_id, "User left during match attempt");
            }
            UserState::Idle | UserState::Matched => {}
        }
        info!(user = %user_id, "User left queue");
        Ok(())
    }

    /// Ordered snapshot of users available for pairing.
    ///
    /// Members claimed by a match attempt, already matched, or still joining
    /// are excluded. Durable members the ledger has never seen are adopted
    /// as queued unless the store holds an active match for them; those are
    /// recorded as matched and dropped from the durable queue.
    pub async fn snapshot(&self) -> Result<Vec<UserId>> {
        let members = self.store.queue_members().await.map_err(|e| {
            error!("Failed to read queue members: {}", e);
            MatchingError::from(e)
        })?;

        let unseen: Vec<UserId> = {
            let ledger = self.ledger.lock();
            members
                .iter()
                .filter(|u| !ledger.states.contains_key(*u) && !ledger.is_joining(u))
                .cloned()
                .collect()
        };

        let mut matched_elsewhere = HashSet::new();
        for user in unseen {
            if let Some(active) = self.store.get_match_status(&user).await? {
                warn!(
                    user = %user,
                    match_id = %active.match_id,
                    "Queued user has an active match, removing from queue"
                );
                if let Err(e) = self.store.remove_from_queue(&user).await {
                    warn!(user = %user, error = %e, "Could not drop matched user from queue");
                }
                matched_elsewhere.insert(user);
            }
        }

        let mut ledger = self.ledger.lock();
        let mut available = Vec::with_capacity(members.len());
        for user in members {
            if ledger.is_joining(&user) {
                continue;
            }
            match ledger.states.get(&user).copied() {
                Some(state) if state.is_pairable() => available.push(user),
                Some(_) => {}
                None if matched_elsewhere.contains(&user) => ledger.set(&user, UserState::Matched),
                None => {
                    ledger.set(&user, UserState::Queued);
                    available.push(user);
                }
            }
        }
        Ok(available)
    }

    // ------------------------------------------------------------------------
    // Claims
    // ------------------------------------------------------------------------

    /// Atomically move two queued users to `matching`.
    ///
    /// Returns false, changing nothing, unless both are currently queued.
    pub fn claim_pair(&self, user1: &UserId, user2: &UserId) -> bool {
        self.claim_where(user1, user2, |s| s.is_pairable())
    }

    /// Claim two users for a directly requested match; idle users qualify.
    pub fn claim_direct(&self, user1: &UserId, user2: &UserId) -> bool {
        self.claim_where(user1, user2, |s| {
            matches!(s, UserState::Idle | UserState::Queued)
        })
    }

    fn claim_where(&self, user1: &UserId, user2: &UserId, eligible: impl Fn(UserState) -> bool) -> bool {
        if user1 == user2 {
            return false;
        }
        let mut ledger = self.ledger.lock();
        let claimable = |u: &UserId| eligible(ledger.state(u)) && !ledger.is_joining(u);
        if !(claimable(user1) && claimable(user2)) {
            return false;
        }
        for user in [user1, user2] {
            let prior = ledger.state(user);
            ledger.claimed_from.insert(user.clone(), prior);
            ledger.set(user, UserState::Matching);
        }
        true
    }

    /// Undo a claim when nothing was recorded.
    ///
    /// Users return to the state they were claimed from; a user that left
    /// meanwhile becomes idle.
    pub fn release_claim(&self, users: &[&UserId]) {
        let mut ledger = self.ledger.lock();
        for &user in users {
            if ledger.state(user) != UserState::Matching {
                continue;
            }
            let prior = ledger.claimed_from.get(user).copied().unwrap_or(UserState::Queued);
            ledger.clear_claim(user);
            if ledger.departed.remove(user) {
                ledger.set(user, UserState::Idle);
            } else {
                ledger.set(user, prior);
            }
        }
    }

    /// Pick up active matches the store holds for unclaimed users.
    ///
    /// Such users are marked matched and dropped from the durable queue so
    /// they stop being proposed. Returns them.
    pub async fn reconcile(&self, users: &[&UserId]) -> Vec<UserId> {
        let mut matched = Vec::new();
        for &user in users {
            match self.store.get_match_status(user).await {
                Ok(Some(active)) => {
                    warn!(
                        user = %user,
                        match_id = %active.match_id,
                        "User has an active match recorded elsewhere"
                    );
                    if let Err(e) = self.store.remove_from_queue(user).await {
                        warn!(user = %user, error = %e, "Could not drop matched user from queue");
                    }
                    let mut ledger = self.ledger.lock();
                    if matches!(ledger.state(user), UserState::Idle | UserState::Queued) {
                        ledger.set(user, UserState::Matched);
                    }
                    matched.push(user.clone());
                }
                Ok(None) => {}
                Err(e) => warn!(user = %user, error = %e, "Could not check match status"),
            }
        }
        matched
    }

    /// Remove both members of a recorded match from the durable queue,
    /// remembering their join times in case of rollback
    pub async fn remove_pair(&self, user1: &UserId, user2: &UserId) -> Result<()> {
        for user in [user1, user2] {
            let joined_at = self.store.queue_joined_at(user).await?;
            if let Err(e) = self.store.remove_from_queue(user).await {
                error!("Failed to remove user {} from queue: {}", user, e);
                return Err(e.into());
            }
            if let Some(joined_at) = joined_at {
                self.ledger.lock().positions.insert(user.clone(), joined_at);
            }
        }
        Ok(())
    }

    /// Put claimed users back in the queue after a rollback.
    ///
    /// Users taken off by [`remove_pair`](Self::remove_pair) regain their
    /// original position. Users that left during the attempt are skipped
    /// and become idle. Returns the users actually re-queued. On a durable
    /// failure the remaining users are still attempted, the failed user is
    /// left idle and the first error is returned.
    pub async fn requeue(&self, users: &[&UserId]) -> Result<Vec<UserId>> {
        let mut requeued = Vec::new();
        let mut first_error = None;

        for &user in users {
            let (departed, position) = {
                let mut ledger = self.ledger.lock();
                let position = ledger.positions.get(user).copied();
                ledger.clear_claim(user);
                let departed = ledger.departed.remove(user);
                if departed {
                    ledger.set(user, UserState::Idle);
                }
                (departed, position)
            };
            if departed {
                info!(user = %user, "Not re-queueing user who left during match attempt");
                continue;
            }

            let restored = match position {
                Some(joined_at) => self.store.restore_to_queue(user, joined_at).await,
                None => self.store.add_to_queue(user).await,
            };
            match restored {
                Ok(()) => {
                    self.ledger.lock().set(user, UserState::Queued);
                    requeued.push(user.clone());
                }
                Err(e) => {
                    error!("Failed to add user {} back to queue: {}", user, e);
                    self.ledger.lock().set(user, UserState::Idle);
                    if first_error.is_none() {
                        first_error = Some(MatchingError::from(e));
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(requeued),
        }
    }

    /// Drop any claim on the users and leave them idle
    pub fn reset(&self, users: &[&UserId]) {
        let mut ledger = self.ledger.lock();
        for &user in users {
            ledger.clear_claim(user);
            ledger.departed.remove(user);
            if ledger.state(user) == UserState::Matching {
                ledger.set(user, UserState::Idle);
            }
        }
    }

    /// Mark both users as members of an active match
    pub fn mark_matched(&self, user1: &UserId, user2: &UserId) {
        let mut ledger = self.ledger.lock();
        for user in [user1, user2] {
            ledger.clear_claim(user);
            if ledger.departed.remove(user) {
                warn!(user = %user, "User left during match attempt but the match completed");
            }
            ledger.set(user, UserState::Matched);
        }
    }

    /// Return matched users to idle after their match was cleared
    pub fn mark_idle(&self, users: &[&UserId]) {
        let mut ledger = self.ledger.lock();
        for &user in users {
            if ledger.state(user) == UserState::Matched {
                ledger.set(user, UserState::Idle);
            }
        }
    }
}
