//! Match orchestrator
//!
//! Runs the match creation saga for a claimed pair:
//!
//! 1. Record a pending match durably. Failure aborts with nothing to undo.
//! 2. Remove both users from the queue.
//! 3. Provision the workspace and activate the match.
//! 4. Populate the match cache and notify both users.
//!
//! A failure after step 1 deletes the match record and re-queues both users
//! without notifying anyone. A compensation that itself fails is reported
//! as [`MatchingError::CompensationFailed`].

use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use common::{Match, MatchEvent, MatchStatus, UserId};
use observability::{MatchmakingMetrics, SagaTimer};

use crate::clients::WorkspaceProvisioner;
use crate::error::{MatchingError, Result};
use crate::match_cache::MatchCache;
use crate::notifier::Notifier;
use crate::queue::QueueAdapter;
use crate::store::MatchmakingStore;

/// Furthest saga stage reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SagaStage {
    Proposed,
    DurablyRecorded,
    ProvisionedWorkspace,
    NotifiedBothUsers,
}

impl std::fmt::Display for SagaStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SagaStage::Proposed => write!(f, "proposed"),
            SagaStage::DurablyRecorded => write!(f, "durably_recorded"),
            SagaStage::ProvisionedWorkspace => write!(f, "provisioned_workspace"),
            SagaStage::NotifiedBothUsers => write!(f, "notified_both_users"),
        }
    }
}

/// How a saga ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SagaOutcome {
    /// Match active and both users notified (delivery is best-effort)
    Matched {
        match_id: Uuid,
        users: [UserId; 2],
        collaboration_url: String,
        /// Notifications the transport accepted
        delivered: usize,
    },
    /// Durable recording failed; both users stay eligible
    Aborted { reason: String },
    /// A later step failed and was compensated
    RolledBack {
        match_id: Uuid,
        stage: SagaStage,
        reason: String,
        requeued: Vec<UserId>,
    },
}

impl SagaOutcome {
    pub fn match_id(&self) -> Option<Uuid> {
        match self {
            SagaOutcome::Matched { match_id, .. } | SagaOutcome::RolledBack { match_id, .. } => {
                Some(*match_id)
            }
            SagaOutcome::Aborted { .. } => None,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, SagaOutcome::Matched { .. })
    }
}

/// Runs match creation sagas
pub struct MatchOrchestrator {
    store: Arc<dyn MatchmakingStore>,
    queue: Arc<QueueAdapter>,
    match_cache: Arc<MatchCache>,
    provisioner: Arc<dyn WorkspaceProvisioner>,
    notifier: Arc<dyn Notifier>,
    metrics: MatchmakingMetrics,
}

impl MatchOrchestrator {
    pub fn new(
        store: Arc<dyn MatchmakingStore>,
        queue: Arc<QueueAdapter>,
        match_cache: Arc<MatchCache>,
        provisioner: Arc<dyn WorkspaceProvisioner>,
        notifier: Arc<dyn Notifier>,
        metrics: MatchmakingMetrics,
    ) -> Self {
        Self {
            store,
            queue,
            match_cache,
            provisioner,
            notifier,
            metrics,
        }
    }

    /// Run the saga for two users already claimed in the queue ledger
    pub async fn run(&self, user1: UserId, user2: UserId) -> Result<SagaOutcome> {
        let match_id = Uuid::new_v4();
        let span = info_span!("match_saga", %match_id, user1 = %user1, user2 = %user2);
        self.run_saga(match_id, user1, user2).instrument(span).await
    }

    async fn run_saga(&self, match_id: Uuid, user1: UserId, user2: UserId) -> Result<SagaOutcome> {
        let _timer = SagaTimer::new(&self.metrics);

        // Step 1: durable record
        let recorded = match self.store.handle_new_match(&user1, &user2, match_id).await {
            Ok(outcome) if outcome.success => Ok(()),
            Ok(outcome) => Err((
                outcome
                    .message
                    .unwrap_or_else(|| "match rejected by store".to_string()),
                true,
            )),
            Err(e) => Err((e.to_string(), false)),
        };
        if let Err((reason, rejected)) = recorded {
            warn!(%reason, stage = %SagaStage::Proposed, "Match not recorded, aborting");
            self.queue.release_claim(&[&user1, &user2]);
            if rejected {
                // a member may hold a match this process never saw
                self.queue.reconcile(&[&user1, &user2]).await;
            }
            self.metrics.saga_aborted();
            return Ok(SagaOutcome::Aborted { reason });
        }
        info!("Match recorded");

        // Step 2: dequeue both users
        if let Err(e) = self.queue.remove_pair(&user1, &user2).await {
            return self
                .compensate(match_id, SagaStage::DurablyRecorded, e.to_string(), &user1, &user2)
                .await;
        }

        // Step 3: provision and activate
        let collaboration = match self.provisioner.create_collaboration(&user1, &user2).await {
            Ok(collaboration) => collaboration,
            Err(e) => {
                warn!(status = e.status(), error = %e, "Workspace provisioning failed");
                let reason = MatchingError::from(e).to_string();
                return self
                    .compensate(match_id, SagaStage::DurablyRecorded, reason, &user1, &user2)
                    .await;
            }
        };

        if let Err(e) = self.store.activate_match(match_id, &collaboration.id).await {
            error!(
                workspace = %collaboration.id,
                error = %e,
                "Match activation failed; provisioned workspace is orphaned"
            );
            return self
                .compensate(match_id, SagaStage::ProvisionedWorkspace, e.to_string(), &user1, &user2)
                .await;
        }

        self.queue.mark_matched(&user1, &user2);
        let active = Match {
            match_id,
            user1_id: user1.clone(),
            user2_id: user2.clone(),
            status: MatchStatus::Active,
            workspace_ref: Some(collaboration.id.clone()),
            created_at: collaboration.created_at,
        };
        self.match_cache.record(&active).await;

        // Step 4: notify
        let collaboration_url = collaboration.collaboration_url();
        let event = MatchEvent::match_found(match_id, user1.clone(), user2.clone(), &collaboration_url);
        let mut delivered = 0;
        for user in [&user1, &user2] {
            let delivery = self.notifier.send(user, &event);
            if delivery.is_accepted() {
                delivered += 1;
            } else {
                warn!(user = %user, ?delivery, "Match notification not delivered");
                self.metrics.notification_rejected();
            }
        }

        self.metrics.match_created();
        info!(%collaboration_url, delivered, stage = %SagaStage::NotifiedBothUsers, "Match created");

        Ok(SagaOutcome::Matched {
            match_id,
            users: [user1, user2],
            collaboration_url,
            delivered,
        })
    }

    /// Delete the match record and return both users to the queue
    async fn compensate(
        &self,
        match_id: Uuid,
        stage: SagaStage,
        reason: String,
        user1: &UserId,
        user2: &UserId,
    ) -> Result<SagaOutcome> {
        warn!(%stage, %reason, "Rolling back match");

        if let Err(e) = self.store.delete_match(match_id).await {
            return Err(self.compensation_failed(match_id, stage, e.to_string(), user1, user2));
        }

        let requeued = match self.queue.requeue(&[user1, user2]).await {
            Ok(requeued) => requeued,
            Err(e) => {
                return Err(self.compensation_failed(match_id, stage, e.to_string(), user1, user2))
            }
        };

        self.metrics.saga_rolled_back();
        info!(requeued = requeued.len(), "Match rolled back");

        Ok(SagaOutcome::RolledBack {
            match_id,
            stage,
            reason,
            requeued,
        })
    }

    fn compensation_failed(
        &self,
        match_id: Uuid,
        stage: SagaStage,
        message: String,
        user1: &UserId,
        user2: &UserId,
    ) -> MatchingError {
        error!(%stage, error = %message, "Compensation failed; match attempt is unrecoverable");
        // Whoever is still claimed goes idle rather than staying stuck
        self.queue.reset(&[user1, user2]);
        self.metrics.compensation_failed();
        MatchingError::CompensationFailed {
            match_id,
            stage,
            message,
        }
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
    use common::UserState;

    struct Harness {
        store: Arc<InMemoryStore>,
        cache: Arc<InMemoryCache>,
        queue: Arc<QueueAdapter>,
        provisioner: Arc<MockProvisioner>,
        notifier: Arc<RecordingNotifier>,
        orchestrator: MatchOrchestrator,
    }

    fn harness(provisioner: MockProvisioner) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let cache = Arc::new(InMemoryCache::new());
        let queue = Arc::new(QueueAdapter::new(store.clone()));
        let match_cache = Arc::new(MatchCache::new(store.clone(), cache.clone()));
        let provisioner = Arc::new(provisioner);
        let notifier = Arc::new(RecordingNotifier::new());
        let orchestrator = MatchOrchestrator::new(
            store.clone(),
            queue.clone(),
            match_cache,
            provisioner.clone(),
            notifier.clone(),
            MatchmakingMetrics::new("test"),
        );
        Harness {
            store,
            cache,
            queue,
            provisioner,
            notifier,
            orchestrator,
        }
    }

    async fn claimed_pair(h: &Harness) -> (UserId, UserId) {
        let (a, b) = (UserId::from("user1"), UserId::from("user2"));
        h.queue.join(&a).await.unwrap();
        h.queue.join(&b).await.unwrap();
        assert!(h.queue.claim_pair(&a, &b));
        (a, b)
    }

    #[tokio::test]
    async fn test_successful_saga_notifies_both_users_once() {
        let h = harness(MockProvisioner::new());
        let (a, b) = claimed_pair(&h).await;

        let outcome = h.orchestrator.run(a.clone(), b.clone()).await.unwrap();
        let (match_id, url) = match &outcome {
            SagaOutcome::Matched {
                match_id,
                collaboration_url,
                delivered,
                ..
            } => {
                assert_eq!(*delivered, 2);
                (*match_id, collaboration_url.clone())
            }
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(url, "/room/collab1");

        for user in [&a, &b] {
            let events = h.notifier.sent_to(user);
            assert_eq!(events.len(), 1);
            assert_eq!(
                events[0],
                MatchEvent::match_found(match_id, a.clone(), b.clone(), url.as_str())
            );
            assert_eq!(h.queue.state(user), UserState::Matched);
        }

        assert!(h.store.queue_members().await.unwrap().is_empty());
        let active = h.store.get_match_status(&a).await.unwrap().unwrap();
        assert_eq!(active.workspace_ref.as_deref(), Some("collab1"));
        assert!(h.cache.peek("match:user1").is_some());
        assert!(h.cache.peek("match:user2").is_some());
    }

    #[tokio::test]
    async fn test_provisioning_failure_rolls_back() {
        let h = harness(MockProvisioner::new().with_failure(500, "Failed to create collaboration"));
        let (a, b) = claimed_pair(&h).await;

        let outcome = h.orchestrator.run(a.clone(), b.clone()).await.unwrap();
        let match_id = outcome.match_id().unwrap();
        assert_matches!(
            &outcome,
            SagaOutcome::RolledBack { stage: SagaStage::DurablyRecorded, requeued, .. }
                if requeued.len() == 2
        );

        assert_eq!(h.store.get_match(match_id).await.unwrap(), None);
        assert_eq!(h.store.queue_members().await.unwrap(), vec![a.clone(), b.clone()]);
        assert_eq!(h.queue.state(&a), UserState::Queued);
        assert!(h.notifier.sent().is_empty());
        assert!(h.cache.peek("match:user1").is_none());
    }

    #[tokio::test]
    async fn test_record_failure_aborts_without_side_effects() {
        let h = harness(MockProvisioner::new());
        let (a, b) = claimed_pair(&h).await;
        h.store.fail_on(StoreOp::HandleNewMatch);

        let outcome = h.orchestrator.run(a.clone(), b.clone()).await.unwrap();
        assert_matches!(outcome, SagaOutcome::Aborted { .. });

        assert_eq!(h.provisioner.calls(), 0);
        assert_eq!(h.store.call_count(StoreOp::RemoveFromQueue), 0);
        assert_eq!(h.store.queue_members().await.unwrap().len(), 2);
        assert_eq!(h.queue.state(&a), UserState::Queued);
        assert_eq!(h.queue.state(&b), UserState::Queued);
    }

    #[tokio::test]
    async fn test_rejected_record_retires_user_matched_elsewhere() {
        let h = harness(MockProvisioner::new());
        let (a, b) = claimed_pair(&h).await;
        let other = Uuid::new_v4();
        h.store.handle_new_match(&a, &UserId::from("x"), other).await.unwrap();
        h.store.activate_match(other, "collab0").await.unwrap();

        let outcome = h.orchestrator.run(a.clone(), b.clone()).await.unwrap();
        assert_matches!(outcome, SagaOutcome::Aborted { .. });

        assert_eq!(h.queue.state(&a), UserState::Matched);
        assert_eq!(h.queue.state(&b), UserState::Queued);
        assert_eq!(h.store.queue_members().await.unwrap(), vec![b.clone()]);
        assert_eq!(h.queue.snapshot().await.unwrap(), vec![b]);
    }

    #[tokio::test]
    async fn test_failed_compensation_is_surfaced() {
        let h = harness(MockProvisioner::new().with_failure(503, "down"));
        let (a, b) = claimed_pair(&h).await;
        h.store.fail_on(StoreOp::DeleteMatch);

        let err = h.orchestrator.run(a.clone(), b.clone()).await.unwrap_err();
        assert_matches!(
            err,
            MatchingError::CompensationFailed { stage: SagaStage::DurablyRecorded, .. }
        );
        assert_eq!(h.queue.state(&a), UserState::Idle);
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_activation_failure_compensates() {
        let h = harness(MockProvisioner::new());
        let (a, b) = claimed_pair(&h).await;
        h.store.fail_on(StoreOp::ActivateMatch);

        let outcome = h.orchestrator.run(a.clone(), b.clone()).await.unwrap();
        assert_matches!(
            outcome,
            SagaOutcome::RolledBack { stage: SagaStage::ProvisionedWorkspace, .. }
        );
        assert_eq!(h.provisioner.calls(), 1);
        assert_eq!(h.store.queue_members().await.unwrap().len(), 2);
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_user_leaving_mid_saga_is_not_requeued() {
        let h = harness(MockProvisioner::new().with_failure(502, "bad gateway"));
        let (a, b) = claimed_pair(&h).await;
        h.queue.leave(&b).await.unwrap();

        let outcome = h.orchestrator.run(a.clone(), b.clone()).await.unwrap();
        assert_matches!(&outcome, SagaOutcome::RolledBack { requeued, .. } if requeued == &vec![a.clone()]);
        assert_eq!(h.store.queue_members().await.unwrap(), vec![a]);
        assert_eq!(h.queue.state(&b), UserState::Idle);
    }
}
