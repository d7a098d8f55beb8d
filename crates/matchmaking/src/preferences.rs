//! Preference repository
//!
//! Reads go cache first and fall back to the durable store, backfilling the
//! cache. Writes go to the durable store first; the cache is only touched
//! once the durable write succeeded.
//!
//! Every successful write bumps a per-user generation. A backfill only lands
//! if no write happened since its durable read, and a user whose cache entry
//! could be neither refreshed nor evicted is read from the store until an
//! eviction succeeds.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use common::{UserId, UserPreference};

use crate::cache::{self, keys, CacheStore};
use crate::error::{MatchingError, Result};
use crate::store::MatchmakingStore;

#[derive(Default)]
struct CacheState {
    generations: HashMap<UserId, u64>,
    /// Users whose cache entry may be older than the store
    dirty: HashSet<UserId>,
}

impl CacheState {
    fn generation(&self, user_id: &UserId) -> u64 {
        self.generations.get(user_id).copied().unwrap_or(0)
    }

    fn record(&mut self, user_id: &UserId, consistent: bool) {
        if consistent {
            self.dirty.remove(user_id);
        } else {
            self.dirty.insert(user_id.clone());
        }
    }
}

/// Write-through preference access
pub struct PreferenceRepository {
    store: Arc<dyn MatchmakingStore>,
    cache: Arc<dyn CacheStore>,
    write_gate: Mutex<CacheState>,
}

impl PreferenceRepository {
    pub fn new(store: Arc<dyn MatchmakingStore>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            cache,
            write_gate: Mutex::new(CacheState::default()),
        }
    }

    /// Get a user's preferences.
    ///
    /// `Ok(None)` when the user never set any. Cache errors degrade to a
    /// durable read.
    pub async fn get(&self, user_id: &UserId) -> Result<Option<UserPreference>> {
        if self.settle(user_id).await {
            let key = keys::preference_key(user_id);
            match cache::get_json::<UserPreference>(self.cache.as_ref(), &key).await {
                Ok(Some(preference)) => {
                    info!("Cache hit for user preferences: {}", user_id);
                    return Ok(Some(preference));
                }
                Ok(None) => {}
                Err(e) => warn!(user = %user_id, error = %e, "Preference cache read failed, using store"),
            }
        }

        let generation = self.write_gate.lock().await.generation(user_id);
        let preference = self
            .store
            .get_preferences(user_id)
            .await
            .map_err(MatchingError::from)?;

        match &preference {
            Some(found) => self.backfill(found, generation).await,
            None => debug!(user = %user_id, "No preferences stored"),
        }

        Ok(preference)
    }

    /// Persist new preferences.
    ///
    /// On durable failure the cache is untouched and `StoreUnavailable` is
    /// returned.
    pub async fn update(&self, preference: UserPreference) -> Result<UserPreference> {
        if let Err(e) = self.store.update_preferences(&preference).await {
            error!(
                user = %preference.user_id,
                error = %e,
                "Failed to update user preferences"
            );
            return Err(MatchingError::from(e));
        }

        let mut state = self.write_gate.lock().await;
        *state
            .generations
            .entry(preference.user_id.clone())
            .or_insert(0) += 1;
        let consistent = self.write_cache(&preference).await;
        state.record(&preference.user_id, consistent);
        Ok(preference)
    }

    /// Whether the cache entry of a user can be trusted, evicting it first
    /// when an earlier write left it possibly stale
    async fn settle(&self, user_id: &UserId) -> bool {
        let mut state = self.write_gate.lock().await;
        if !state.dirty.contains(user_id) {
            return true;
        }
        let evicted = self.evict(user_id).await;
        state.record(user_id, evicted);
        evicted
    }

    /// Cache a value read from the store at `generation`; dropped if a write
    /// happened since
    async fn backfill(&self, preference: &UserPreference, generation: u64) {
        let mut state = self.write_gate.lock().await;
        if state.generation(&preference.user_id) != generation {
            debug!(user = %preference.user_id, "Preference changed during read, skipping backfill");
            return;
        }
        if self.write_cache(preference).await {
            state.dirty.remove(&preference.user_id);
        }
    }

    /// Write the preference record and topics index.
    ///
    /// A failed write evicts both keys. Returns false when the cache may
    /// still hold an older value.
    async fn write_cache(&self, preference: &UserPreference) -> bool {
        let user_id = &preference.user_id;
        let pref_key = keys::preference_key(user_id);
        let topics_key = keys::topics_key(user_id);

        let written = match cache::set_json(self.cache.as_ref(), &pref_key, preference).await {
            Ok(()) => cache::set_json(self.cache.as_ref(), &topics_key, &preference.topics).await,
            Err(e) => Err(e),
        };

        match written {
            Ok(()) => true,
            Err(e) => {
                warn!(user = %user_id, error = %e, "Preference cache write failed, evicting");
                self.evict(user_id).await
            }
        }
    }

    async fn evict(&self, user_id: &UserId) -> bool {
        let mut evicted = true;
        for key in [keys::preference_key(user_id), keys::topics_key(user_id)] {
            if let Err(e) = self.cache.delete(&key).await {
                warn!(key = %key, error = %e, "Cache eviction failed");
                evicted = false;
            }
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::store::{InMemoryStore, StoreOp};
    use assert_matches::assert_matches;
    use common::{Difficulty, TopicSet};

    fn pref(user: &str, difficulty: Difficulty, topics: &[&str]) -> UserPreference {
        UserPreference::new(
            user.into(),
            TopicSet::new(topics.iter().copied()).unwrap(),
            difficulty,
        )
    }

    fn setup() -> (Arc<InMemoryStore>, Arc<InMemoryCache>, PreferenceRepository) {
        let store = Arc::new(InMemoryStore::new());
        let cache = Arc::new(InMemoryCache::new());
        let repo = PreferenceRepository::new(store.clone(), cache.clone());
        (store, cache, repo)
    }

    #[tokio::test]
    async fn test_miss_reads_store_and_backfills() {
        let (store, cache, repo) = setup();
        let p = pref("u1", Difficulty::Easy, &["arrays"]);
        store.update_preferences(&p).await.unwrap();

        assert_eq!(repo.get(&"u1".into()).await.unwrap(), Some(p.clone()));
        assert_eq!(store.call_count(StoreOp::GetPreferences), 1);
        assert!(cache.peek("user_match_pref:u1").is_some());
        assert!(cache.peek("user_topics:u1").is_some());

        assert_eq!(repo.get(&"u1".into()).await.unwrap(), Some(p));
        assert_eq!(store.call_count(StoreOp::GetPreferences), 1);
    }

    #[tokio::test]
    async fn test_unknown_user_is_none() {
        let (_, cache, repo) = setup();
        assert_eq!(repo.get(&"ghost".into()).await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_update_then_get() {
        let (_, _, repo) = setup();
        let p = pref("u1", Difficulty::Hard, &["graphs", "trees"]);
        repo.update(p.clone()).await.unwrap();
        assert_eq!(repo.get(&"u1".into()).await.unwrap(), Some(p.clone()));
        let topics: TopicSet = cache::get_json(repo.cache.as_ref(), "user_topics:u1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(topics, p.topics);
    }

    #[tokio::test]
    async fn test_failed_update_leaves_prior_value() {
        let (store, cache, repo) = setup();
        let before = pref("u1", Difficulty::Easy, &["arrays"]);
        repo.update(before.clone()).await.unwrap();

        store.fail_on(StoreOp::UpdatePreferences);
        let result = repo.update(pref("u1", Difficulty::Hard, &["dp"])).await;
        assert_matches!(result, Err(MatchingError::StoreUnavailable(_)));

        let cached: UserPreference =
            serde_json::from_str(&cache.peek("user_match_pref:u1").unwrap()).unwrap();
        assert_eq!(cached, before);
        assert_eq!(repo.get(&"u1".into()).await.unwrap(), Some(before));
    }

    #[tokio::test]
    async fn test_cache_outage_degrades_to_store() {
        let (store, cache, repo) = setup();
        let p = pref("u1", Difficulty::Medium, &["strings"]);
        store.update_preferences(&p).await.unwrap();

        cache.set_available(false);
        assert_eq!(repo.get(&"u1".into()).await.unwrap(), Some(p.clone()));

        // Durable write still succeeds while the cache is down
        let updated = pref("u1", Difficulty::Hard, &["strings"]);
        repo.update(updated.clone()).await.unwrap();
        cache.set_available(true);
        assert_eq!(repo.get(&"u1".into()).await.unwrap(), Some(updated));
    }

    #[tokio::test]
    async fn test_update_during_outage_is_not_shadowed_by_old_entry() {
        let (_, cache, repo) = setup();
        let before = pref("u1", Difficulty::Easy, &["arrays"]);
        repo.update(before).await.unwrap();

        cache.set_available(false);
        let after = pref("u1", Difficulty::Hard, &["dp"]);
        repo.update(after.clone()).await.unwrap();
        assert!(cache.peek("user_match_pref:u1").is_some());

        cache.set_available(true);
        assert_eq!(repo.get(&"u1".into()).await.unwrap(), Some(after.clone()));
        let cached: UserPreference =
            serde_json::from_str(&cache.peek("user_match_pref:u1").unwrap()).unwrap();
        assert_eq!(cached, after);
    }

    #[tokio::test]
    async fn test_backfill_from_before_update_is_dropped() {
        let (_, cache, repo) = setup();
        let before = pref("u1", Difficulty::Easy, &["arrays"]);
        repo.update(before.clone()).await.unwrap();
        let read_at = repo.write_gate.lock().await.generation(&"u1".into());

        let after = pref("u1", Difficulty::Medium, &["graphs"]);
        repo.update(after.clone()).await.unwrap();
        repo.backfill(&before, read_at).await;

        let cached: UserPreference =
            serde_json::from_str(&cache.peek("user_match_pref:u1").unwrap()).unwrap();
        assert_eq!(cached, after);
        assert_eq!(repo.get(&"u1".into()).await.unwrap(), Some(after));
    }
}
