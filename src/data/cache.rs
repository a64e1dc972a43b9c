//! In-memory caches
//!
//! These caches are volatile and live only as long as the session.
//! Uses Moka for high-performance concurrent caching.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use super::models::Profile;

/// Profile cache
///
/// Identity records fetched for feed enrichment. Entries expire after the
/// configured TTL so renamed users and new avatars show up on a later
/// fetch. Absent profiles are never cached.
pub struct ProfileCache {
    /// User ID -> Profile
    profiles: Cache<String, Arc<Profile>>,
}

impl ProfileCache {
    /// Create new profile cache
    ///
    /// # Arguments
    /// * `ttl` - Time to live for each profile
    /// * `max_items` - Maximum number of profiles kept
    pub fn new(ttl: Duration, max_items: u64) -> Self {
        let profiles = Cache::builder()
            .max_capacity(max_items)
            .time_to_live(ttl)
            .build();

        Self { profiles }
    }

    /// Get profile by user ID
    pub async fn get(&self, user_id: &str) -> Option<Arc<Profile>> {
        let result = self.profiles.get(user_id).await;

        use crate::metrics::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL};
        if result.is_some() {
            CACHE_HITS_TOTAL.with_label_values(&["profile"]).inc();
        } else {
            CACHE_MISSES_TOTAL.with_label_values(&["profile"]).inc();
        }

        result
    }

    /// Split `user_ids` into cached profiles and the IDs still to fetch
    pub async fn partition<'a, I>(&self, user_ids: I) -> (HashMap<String, Arc<Profile>>, Vec<String>)
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut hits = HashMap::new();
        let mut misses = Vec::new();
        for user_id in user_ids {
            match self.get(user_id).await {
                Some(profile) => {
                    hits.insert(user_id.clone(), profile);
                }
                None => misses.push(user_id.clone()),
            }
        }
        (hits, misses)
    }

    /// Insert or update profile
    pub async fn insert(&self, profile: Profile) -> Arc<Profile> {
        let profile = Arc::new(profile);
        self.profiles
            .insert(profile.id.clone(), profile.clone())
            .await;
        profile
    }

    /// Drop a single profile
    pub async fn invalidate(&self, user_id: &str) {
        self.profiles.invalidate(user_id).await;
    }

    /// Drop everything
    pub fn clear(&self) {
        self.profiles.invalidate_all();
    }
}
