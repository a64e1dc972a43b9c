//! Profile service

use std::sync::Arc;

use super::enrich::IdentityEnricher;
use crate::data::{Filter, FollowStats, Persistence, Profile, Select, Table, from_rows};
use crate::error::AppError;

/// Profile lookup and follow totals
pub struct ProfileService {
    store: Arc<dyn Persistence>,
    enricher: Arc<IdentityEnricher>,
}

impl ProfileService {
    pub fn new(store: Arc<dyn Persistence>, enricher: Arc<IdentityEnricher>) -> Self {
        Self { store, enricher }
    }

    /// Fetch a profile, bypassing the cache
    pub async fn profile(&self, user_id: &str) -> Result<Profile, AppError> {
        let query = Select::from(Table::Profiles)
            .columns(&["id", "username", "avatar_url"])
            .filter(Filter::new().eq("id", user_id))
            .limit(1);
        let rows = self.store.select(&query).await?;
        let profile = from_rows::<Profile>(rows)?
            .into_iter()
            .next()
            .ok_or(AppError::NotFound)?;

        // Keep later feed renders in step with what was just shown.
        self.enricher.forget(user_id).await;
        Ok(profile)
    }

    /// Follower and following counts of a user
    pub async fn follow_stats(&self, user_id: &str) -> Result<FollowStats, AppError> {
        let followers = Filter::new().eq("following_id", user_id);
        let following = Filter::new().eq("follower_id", user_id);

        let (followers, following) = futures::try_join!(
            self.store.count(Table::UserFollows, &followers),
            self.store.count(Table::UserFollows, &following),
        )?;

        Ok(FollowStats {
            followers,
            following,
        })
    }
}
