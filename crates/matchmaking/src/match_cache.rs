//! Match cache and status lookup
//!
//! Keeps `match:{user}` pointers for both members of an active match,
//! seeded lazily from the durable store.

use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use common::{Match, MatchRef, UserId};

use crate::cache::{self, keys, CacheStore};
use crate::error::{MatchingError, Result};
use crate::store::MatchmakingStore;

pub struct MatchCache {
    store: Arc<dyn MatchmakingStore>,
    cache: Arc<dyn CacheStore>,
}

impl MatchCache {
    pub fn new(store: Arc<dyn MatchmakingStore>, cache: Arc<dyn CacheStore>) -> Self {
        Self { store, cache }
    }

    /// Active match id of a user.
    ///
    /// Cache first; on miss the durable store is consulted and both members'
    /// pointers are backfilled. `Ok(None)` when the user has no active match.
    pub async fn status(&self, user_id: &UserId) -> Result<Option<Uuid>> {
        match cache::get_json::<Uuid>(self.cache.as_ref(), &keys::match_key(user_id)).await {
            Ok(Some(match_id)) => {
                debug!(user = %user_id, %match_id, "Match cache hit");
                return Ok(Some(match_id));
            }
            Ok(None) => {}
            Err(e) => warn!(user = %user_id, error = %e, "Match cache read failed, using store"),
        }

        let active = self
            .store
            .get_match_status(user_id)
            .await
            .map_err(MatchingError::from)?;

        match active {
            Some(record) => {
                self.record(&record).await;
                Ok(Some(record.match_id))
            }
            None => {
                debug!(user = %user_id, "No active match");
                Ok(None)
            }
        }
    }

    /// Point both members at the match. Failures are logged only.
    pub async fn record(&self, record: &Match) {
        for user in record.users() {
            if let Err(e) =
                cache::set_json(self.cache.as_ref(), &keys::match_key(user), &record.match_id).await
            {
                warn!(user = %user, match_id = %record.match_id, error = %e, "Match cache write failed");
            }
        }
    }

    /// Clear matches durably, then evict their pointers.
    ///
    /// A durable failure leaves the cache intact and is returned.
    pub async fn clear(&self, target: &MatchRef) -> Result<Vec<Match>> {
        let cleared = self
            .store
            .clear_matches(target)
            .await
            .map_err(MatchingError::from)?;

        let mut evict: Vec<&UserId> = cleared.iter().flat_map(|m| m.users()).collect();
        if let MatchRef::User(user) = target {
            evict.push(user);
        }
        evict.sort();
        evict.dedup();

        for user in evict {
            if let Err(e) = self.cache.delete(&keys::match_key(user)).await {
                warn!(user = %user, error = %e, "Match cache eviction failed");
            }
        }

        info!("Cleared matches for match: {}", target);
        Ok(cleared)
    }
}
