//! Matching service
//!
//! Entry point used by the binary and by callers embedding the matchmaking
//! core. Wires the preference repository, queue, pairing engine, match cache
//! and orchestrator together, and owns the gate that keeps pairing passes
//! from overlapping.

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use common::{Match, MatchRef, PreferenceInput, UserId, UserPreference, UserState};
use observability::MatchmakingMetrics;

use crate::cache::CacheStore;
use crate::clients::WorkspaceProvisioner;
use crate::error::{MatchingError, Result};
use crate::match_cache::MatchCache;
use crate::notifier::Notifier;
use crate::orchestrator::{MatchOrchestrator, SagaOutcome};
use crate::pairing::{PairingEngine, Proposal};
use crate::preferences::PreferenceRepository;
use crate::queue::QueueAdapter;
use crate::store::MatchmakingStore;

/// Result of draining the queue once
#[derive(Debug, Default)]
pub struct PassSummary {
    /// Pairs proposed and claimed during the drain
    pub proposed: usize,
    /// Sagas that ran to an outcome
    pub outcomes: Vec<SagaOutcome>,
    /// Sagas whose compensation failed
    pub errors: Vec<MatchingError>,
}

impl PassSummary {
    /// Number of matches created
    pub fn matched(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_matched()).count()
    }
}

/// Matchmaking facade
pub struct MatchingService {
    preferences: Arc<PreferenceRepository>,
    queue: Arc<QueueAdapter>,
    pairing: PairingEngine,
    match_cache: Arc<MatchCache>,
    orchestrator: MatchOrchestrator,
    metrics: MatchmakingMetrics,
    /// Held for "snapshot, propose, claim"
    pass_gate: Mutex<()>,
}

impl MatchingService {
    pub fn new(
        store: Arc<dyn MatchmakingStore>,
        cache: Arc<dyn CacheStore>,
        provisioner: Arc<dyn WorkspaceProvisioner>,
        notifier: Arc<dyn Notifier>,
        metrics: MatchmakingMetrics,
    ) -> Self {
        let preferences = Arc::new(PreferenceRepository::new(store.clone(), cache.clone()));
        let queue = Arc::new(QueueAdapter::new(store.clone()));
        let match_cache = Arc::new(MatchCache::new(store.clone(), cache));
        let orchestrator = MatchOrchestrator::new(
            store,
            queue.clone(),
            match_cache.clone(),
            provisioner,
            notifier,
            metrics.clone(),
        );

        Self {
            pairing: PairingEngine::new(preferences.clone()),
            preferences,
            queue,
            match_cache,
            orchestrator,
            metrics,
            pass_gate: Mutex::new(()),
        }
    }

    /// Matching domain this service serves
    pub fn domain(&self) -> &str {
        self.metrics.domain()
    }

    // ------------------------------------------------------------------------
    // Preferences
    // ------------------------------------------------------------------------

    pub async fn get_user_preference(&self, user_id: &UserId) -> Result<Option<UserPreference>> {
        self.preferences.get(user_id).await
    }

    /// Validate and persist a user's preferences.
    ///
    /// Invalid input is an error. A durable write failure yields `Ok(None)`
    /// and leaves the previous preferences in place.
    pub async fn update_user_preferences(
        &self,
        user_id: &UserId,
        input: PreferenceInput,
    ) -> Result<Option<UserPreference>> {
        let preference = input.into_preference(user_id.clone())?;

        match self.preferences.update(preference).await {
            Ok(updated) => {
                info!(user = %user_id, difficulty = %updated.difficulty, "Preferences updated");
                Ok(Some(updated))
            }
            Err(e) => {
                debug!(user = %user_id, error = %e, "Preference update not applied");
                Ok(None)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Queue
    // ------------------------------------------------------------------------

    /// Join the queue and drain it
    pub async fn add_to_queue(&self, user_id: &UserId) -> Result<PassSummary> {
        self.queue.join(user_id).await?;
        self.process_matching_queue().await
    }

    /// Join the queue without triggering a pairing pass
    pub async fn add_to_queue_without_matchmaking(&self, user_id: &UserId) -> Result<()> {
        self.queue.join(user_id).await
    }

    pub async fn remove_from_queue(&self, user_id: &UserId) -> Result<()> {
        self.queue.leave(user_id).await
    }

    /// Current exclusivity state of a user
    pub fn user_state(&self, user_id: &UserId) -> UserState {
        self.queue.state(user_id)
    }

    // ------------------------------------------------------------------------
    // Pairing
    // ------------------------------------------------------------------------

    /// Run one pairing pass.
    ///
    /// Returns the claimed pair, or `None` when the queue has nothing to
    /// offer. The gate is released before any saga runs.
    pub async fn try_match_queue(&self) -> Result<Option<Proposal>> {
        let _gate = self.pass_gate.lock().await;

        let snapshot = self.queue.snapshot().await?;
        self.metrics.pass_started(snapshot.len());

        let proposal = match self.pairing.propose(&snapshot).await {
            Some(proposal) => proposal,
            None => return Ok(None),
        };

        if !self.queue.claim_pair(&proposal.anchor, &proposal.partner) {
            debug!(
                anchor = %proposal.anchor,
                partner = %proposal.partner,
                "Proposed pair changed state before claim"
            );
            return Ok(None);
        }

        self.metrics.pair_proposed();
        Ok(Some(proposal))
    }

    /// Drain the queue, then run a saga for every proposed pair.
    ///
    /// Sagas for the claimed pairs run concurrently. A snapshot failure on
    /// the first pass is returned; on later passes the pairs already claimed
    /// still proceed.
    pub async fn process_matching_queue(&self) -> Result<PassSummary> {
        let mut proposals = Vec::new();
        loop {
            match self.try_match_queue().await {
                Ok(Some(proposal)) => proposals.push(proposal),
                Ok(None) => break,
                Err(e) if proposals.is_empty() => return Err(e),
                Err(e) => {
                    warn!(error = %e, claimed = proposals.len(), "Pairing pass failed, running claimed pairs");
                    break;
                }
            }
        }

        let mut summary = PassSummary {
            proposed: proposals.len(),
            ..PassSummary::default()
        };
        if proposals.is_empty() {
            return Ok(summary);
        }

        let sagas = proposals
            .into_iter()
            .map(|p| self.orchestrator.run(p.anchor, p.partner));
        for result in join_all(sagas).await {
            match result {
                Ok(outcome) => summary.outcomes.push(outcome),
                Err(e) => summary.errors.push(e),
            }
        }

        info!(
            proposed = summary.proposed,
            matched = summary.matched(),
            failed = summary.errors.len(),
            "Matching queue processed"
        );
        Ok(summary)
    }

    /// Run the match saga for two specific users.
    ///
    /// Both must be idle or queued; anyone mid-attempt or already matched
    /// is rejected.
    pub async fn create_match(&self, user1: &UserId, user2: &UserId) -> Result<SagaOutcome> {
        if user1 == user2 {
            return Err(MatchingError::InvalidState(format!(
                "cannot match user {} with themselves",
                user1
            )));
        }
        if !self.queue.claim_direct(user1, user2) {
            return Err(MatchingError::InvalidState(format!(
                "users {} and {} are not available for matching",
                user1, user2
            )));
        }
        self.orchestrator.run(user1.clone(), user2.clone()).await
    }

    // ------------------------------------------------------------------------
    // Matches
    // ------------------------------------------------------------------------

    /// Active match id of a user, `None` when unmatched
    pub async fn get_match_status(&self, user_id: &UserId) -> Result<Option<Uuid>> {
        self.match_cache.status(user_id).await
    }

    /// Clear matches by match id or by user; members become idle
    pub async fn clear_matches(&self, target: &MatchRef) -> Result<Vec<Match>> {
        let cleared = self.match_cache.clear(target).await?;

        let mut users: Vec<&UserId> = cleared.iter().flat_map(|m| m.users()).collect();
        if let MatchRef::User(user) = target {
            users.push(user);
        }
        self.queue.mark_idle(&users);
        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::clients::MockProvisioner;
    use crate::notifier::RecordingNotifier;
    use crate::store::{InMemoryStore, StoreOp};
    use assert_matches::assert_matches;

    struct Fixture {
        store: Arc<InMemoryStore>,
        notifier: Arc<RecordingNotifier>,
        service: MatchingService,
    }

    fn fixture(provisioner: MockProvisioner) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let service = MatchingService::new(
            store.clone(),
            Arc::new(InMemoryCache::new()),
            Arc::new(provisioner),
            notifier.clone(),
            MatchmakingMetrics::new("test"),
        );
        Fixture {
            store,
            notifier,
            service,
        }
    }

    async fn prefer(service: &MatchingService, user: &str, difficulty: &str) {
        service
            .update_user_preferences(&user.into(), PreferenceInput::new(vec!["arrays"], difficulty))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_rejects_unknown_difficulty() {
        let f = fixture(MockProvisioner::new());
        let result = f
            .service
            .update_user_preferences(&"u1".into(), PreferenceInput::new(vec!["arrays"], "extreme"))
            .await;
        assert_matches!(result, Err(MatchingError::InvalidPreference(_)));
        assert_eq!(f.store.call_count(StoreOp::UpdatePreferences), 0);
    }

    #[tokio::test]
    async fn test_failed_update_keeps_previous_value() {
        let f = fixture(MockProvisioner::new());
        prefer(&f.service, "u1", "easy").await;

        f.store.fail_on(StoreOp::UpdatePreferences);
        let result = f
            .service
            .update_user_preferences(&"u1".into(), PreferenceInput::new(vec!["graphs"], "hard"))
            .await
            .unwrap();
        assert_eq!(result, None);

        let current = f.service.get_user_preference(&"u1".into()).await.unwrap().unwrap();
        assert_eq!(current.difficulty.as_str(), "easy");
    }

    #[tokio::test]
    async fn test_try_match_queue_claims_one_pair() {
        let f = fixture(MockProvisioner::new());
        for (user, difficulty) in [("A", "easy"), ("B", "hard"), ("C", "easy")] {
            prefer(&f.service, user, difficulty).await;
            f.service.add_to_queue_without_matchmaking(&user.into()).await.unwrap();
        }

        let proposal = f.service.try_match_queue().await.unwrap().unwrap();
        assert_eq!((proposal.anchor.as_str(), proposal.partner.as_str()), ("A", "C"));
        assert_eq!(f.service.user_state(&"A".into()), UserState::Matching);
        assert_eq!(f.service.user_state(&"B".into()), UserState::Queued);

        assert_eq!(f.service.try_match_queue().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_add_to_queue_matches_compatible_users() {
        let f = fixture(MockProvisioner::new());
        prefer(&f.service, "A", "medium").await;
        prefer(&f.service, "B", "medium").await;

        let first = f.service.add_to_queue(&"A".into()).await.unwrap();
        assert_eq!(first.proposed, 0);

        let second = f.service.add_to_queue(&"B".into()).await.unwrap();
        assert_eq!(second.matched(), 1);

        let a = f.service.get_match_status(&"A".into()).await.unwrap();
        let b = f.service.get_match_status(&"B".into()).await.unwrap();
        assert!(a.is_some());
        assert_eq!(a, b);
        assert_eq!(f.notifier.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_drain_runs_every_disjoint_pair() {
        let f = fixture(MockProvisioner::new());
        for (user, difficulty) in [("A", "easy"), ("B", "hard"), ("C", "easy"), ("D", "hard")] {
            prefer(&f.service, user, difficulty).await;
            f.service.add_to_queue_without_matchmaking(&user.into()).await.unwrap();
        }

        let summary = f.service.process_matching_queue().await.unwrap();
        assert_eq!(summary.proposed, 2);
        assert_eq!(summary.matched(), 2);
        assert!(f.store.queue_members().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_match_rejects_busy_users() {
        let f = fixture(MockProvisioner::new());
        let outcome = f.service.create_match(&"A".into(), &"B".into()).await.unwrap();
        assert!(outcome.is_matched());

        assert_matches!(
            f.service.create_match(&"A".into(), &"C".into()).await,
            Err(MatchingError::InvalidState(_))
        );
        assert_matches!(
            f.service.add_to_queue(&"B".into()).await,
            Err(MatchingError::AlreadyMatched(_))
        );
    }

    #[tokio::test]
    async fn test_clear_matches_frees_users() {
        let f = fixture(MockProvisioner::new());
        let outcome = f.service.create_match(&"A".into(), &"B".into()).await.unwrap();
        let match_id = outcome.match_id().unwrap();

        let cleared = f.service.clear_matches(&MatchRef::Match(match_id)).await.unwrap();
        assert_eq!(cleared.len(), 1);
        assert_eq!(f.service.get_match_status(&"A".into()).await.unwrap(), None);
        assert_eq!(f.service.user_state(&"B".into()), UserState::Idle);

        f.service.add_to_queue_without_matchmaking(&"A".into()).await.unwrap();
    }

    #[tokio::test]
    async fn test_snapshot_failure_is_surfaced() {
        let f = fixture(MockProvisioner::new());
        f.store.fail_on(StoreOp::QueueMembers);
        assert_matches!(
            f.service.process_matching_queue().await,
            Err(MatchingError::StoreUnavailable(_))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_match_each_user_once() {
        let f = fixture(MockProvisioner::new());
        let users: Vec<String> = (0..20).map(|i| format!("user{}", i)).collect();
        for user in &users {
            prefer(&f.service, user, "medium").await;
        }

        let service = Arc::new(f.service);
        let joins = users.iter().map(|user| {
            let service = service.clone();
            let user = UserId::from(user.as_str());
            tokio::spawn(async move { service.add_to_queue(&user).await })
        });
        let mut outcomes = Vec::new();
        for joined in join_all(joins).await {
            outcomes.extend(joined.unwrap().unwrap().outcomes);
        }
        outcomes.extend(service.process_matching_queue().await.unwrap().outcomes);

        let mut matched = std::collections::HashSet::new();
        for outcome in &outcomes {
            if let SagaOutcome::Matched { users, .. } = outcome {
                for user in users {
                    assert!(matched.insert(user.clone()), "{} matched twice", user);
                }
            }
        }

        let queued = f.store.queue_members().await.unwrap();
        assert!(queued.len() <= 1);
        assert!(queued.iter().all(|u| !matched.contains(u)));
        assert_eq!(matched.len() + queued.len(), users.len());
        for user in &matched {
            assert!(f.store.get_match_status(user).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_match_recorded_before_start_is_respected() {
        let f = fixture(MockProvisioner::new());
        let earlier = Uuid::new_v4();
        f.store.handle_new_match(&"A".into(), &"X".into(), earlier).await.unwrap();
        f.store.activate_match(earlier, "collab0").await.unwrap();
        f.store.add_to_queue(&"A".into()).await.unwrap();

        assert_matches!(
            f.service.add_to_queue(&"A".into()).await,
            Err(MatchingError::AlreadyMatched(_))
        );
        assert_eq!(f.service.user_state(&"A".into()), UserState::Matched);

        for user in ["A", "B", "C"] {
            prefer(&f.service, user, "easy").await;
        }
        f.service.add_to_queue_without_matchmaking(&"B".into()).await.unwrap();
        let summary = f.service.add_to_queue(&"C".into()).await.unwrap();

        assert_eq!(summary.matched(), 1);
        assert_matches!(
            &summary.outcomes[0],
            SagaOutcome::Matched { users, .. } if users == &[UserId::from("B"), UserId::from("C")]
        );
        assert_eq!(f.store.get_match_status(&"A".into()).await.unwrap().unwrap().match_id, earlier);
        assert!(f.store.queue_members().await.unwrap().is_empty());
    }
}
