//! Pairing engine
//!
//! Proposes at most one pair per call from an ordered queue snapshot. The
//! earliest-waiting user is the anchor and is paired with the first later
//! user of the same difficulty. An anchor without a partner is skipped and
//! the next user becomes the anchor. Topic overlap is reported but does not
//! gate pairing.

use std::sync::Arc;
use tracing::{debug, info, warn};

use common::{Difficulty, UserId, UserPreference};

use crate::preferences::PreferenceRepository;

/// A proposed pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    /// Earlier-waiting user
    pub anchor: UserId,
    pub partner: UserId,
    pub difficulty: Difficulty,
    pub topic_overlap: usize,
}

/// Pick the first compatible pair from `candidates`.
///
/// Candidates are in queue order; `None` preferences mark users whose
/// preferences could not be resolved, which are incompatible with everyone.
pub fn select_pair(candidates: &[(UserId, Option<UserPreference>)]) -> Option<Proposal> {
    for (i, (anchor, anchor_pref)) in candidates.iter().enumerate() {
        let anchor_pref = match anchor_pref {
            Some(p) => p,
            None => {
                debug!(user = %anchor, "Skipping anchor without resolvable preferences");
                continue;
            }
        };

        let partner = candidates[i + 1..].iter().find_map(|(user, pref)| {
            pref.as_ref()
                .filter(|p| anchor_pref.is_compatible_with(p))
                .map(|p| (user, p))
        });

        match partner {
            Some((partner, partner_pref)) => {
                return Some(Proposal {
                    anchor: anchor.clone(),
                    partner: partner.clone(),
                    difficulty: anchor_pref.difficulty,
                    topic_overlap: anchor_pref.topic_overlap(partner_pref),
                });
            }
            None => info!("No suitable match found for {} in this pass.", anchor),
        }
    }
    None
}

/// Resolves preferences for a snapshot and selects a pair
pub struct PairingEngine {
    preferences: Arc<PreferenceRepository>,
}

impl PairingEngine {
    pub fn new(preferences: Arc<PreferenceRepository>) -> Self {
        Self { preferences }
    }

    /// Propose a pair from an ordered snapshot, or `None`
    pub async fn propose(&self, snapshot: &[UserId]) -> Option<Proposal> {
        if snapshot.len() < 2 {
            info!("Not enough users in the queue to form a match.");
            return None;
        }

        let mut candidates = Vec::with_capacity(snapshot.len());
        for user in snapshot {
            let pref = match self.preferences.get(user).await {
                Ok(Some(pref)) => Some(pref),
                Ok(None) => {
                    debug!(user = %user, "Queued user has no preferences");
                    None
                }
                Err(e) => {
                    warn!(user = %user, error = %e, "Could not resolve preferences");
                    None
                }
            };
            candidates.push((user.clone(), pref));
        }

        let proposal = select_pair(&candidates)?;
        info!(
            anchor = %proposal.anchor,
            partner = %proposal.partner,
            difficulty = %proposal.difficulty,
            topic_overlap = proposal.topic_overlap,
            "Proposed pair"
        );
        Some(proposal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::store::{InMemoryStore, MatchmakingStore};
    use common::TopicSet;

    fn candidate(user: &str, difficulty: Difficulty, topics: &[&str]) -> (UserId, Option<UserPreference>) {
        (
            user.into(),
            Some(UserPreference::new(
                user.into(),
                TopicSet::new(topics.iter().copied()).unwrap(),
                difficulty,
            )),
        )
    }

    #[test]
    fn test_anchor_pairs_with_first_same_difficulty() {
        let queue = vec![
            candidate("A", Difficulty::Easy, &["arrays"]),
            candidate("B", Difficulty::Hard, &["arrays"]),
            candidate("C", Difficulty::Easy, &["graphs"]),
        ];
        let p = select_pair(&queue).unwrap();
        assert_eq!(p.anchor, UserId::from("A"));
        assert_eq!(p.partner, UserId::from("C"));
        assert_eq!(p.topic_overlap, 0);
    }

    #[test]
    fn test_skipped_anchor_moves_to_next() {
        let queue = vec![
            candidate("A", Difficulty::Hard, &[]),
            candidate("B", Difficulty::Easy, &[]),
            candidate("C", Difficulty::Medium, &[]),
            candidate("D", Difficulty::Easy, &[]),
        ];
        let p = select_pair(&queue).unwrap();
        assert_eq!((p.anchor.as_str(), p.partner.as_str()), ("B", "D"));
    }

    #[test]
    fn test_unresolved_users_are_never_paired() {
        let queue = vec![
            ("A".into(), None),
            candidate("B", Difficulty::Easy, &[]),
            ("C".into(), None),
        ];
        assert_eq!(select_pair(&queue), None);
    }

    #[test]
    fn test_overlap_is_reported() {
        let queue = vec![
            candidate("A", Difficulty::Medium, &["dp", "graphs"]),
            candidate("B", Difficulty::Medium, &["graphs", "dp", "trees"]),
        ];
        assert_eq!(select_pair(&queue).unwrap().topic_overlap, 2);
    }

    #[tokio::test]
    async fn test_propose_needs_two_users() {
        let store = Arc::new(InMemoryStore::new());
        let repo = Arc::new(PreferenceRepository::new(store, Arc::new(InMemoryCache::new())));
        let engine = PairingEngine::new(repo);

        assert_eq!(engine.propose(&[]).await, None);
        assert_eq!(engine.propose(&["solo".into()]).await, None);
    }

    #[tokio::test]
    async fn test_propose_resolves_preferences() {
        let store = Arc::new(InMemoryStore::new());
        for (user, difficulty) in [("A", Difficulty::Easy), ("B", Difficulty::Easy)] {
            store
                .update_preferences(&UserPreference::new(user.into(), TopicSet::default(), difficulty))
                .await
                .unwrap();
        }
        let repo = Arc::new(PreferenceRepository::new(store, Arc::new(InMemoryCache::new())));
        let engine = PairingEngine::new(repo);

        let p = engine
            .propose(&["A".into(), "ghost".into(), "B".into()])
            .await
            .unwrap();
        assert_eq!((p.anchor.as_str(), p.partner.as_str()), ("A", "B"));
    }
}
