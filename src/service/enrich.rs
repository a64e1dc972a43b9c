//! Identity enrichment
//!
//! One bulk lookup by distinct user id, shared by the post feed and the
//! status board. Anonymous rows never contribute an id.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::Serialize;

use crate::data::{Filter, Persistence, Profile, ProfileCache, Select, Table, from_rows};
use crate::error::AppError;

/// Placeholder name for authors whose identity could not be resolved
pub const UNKNOWN_USER: &str = "Unknown User";

/// Author block of a display row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Author {
    pub id: String,
    pub name: String,
    pub avatar_url: Option<String>,
}

/// Profiles resolved for one render
#[derive(Debug, Default)]
pub struct Enrichment {
    profiles: HashMap<String, Arc<Profile>>,
    failed: bool,
}

impl Enrichment {
    /// True if the bulk lookup failed and some authors are placeholders
    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn profile(&self, user_id: &str) -> Option<&Profile> {
        self.profiles.get(user_id).map(Arc::as_ref)
    }

    /// Author for a public row; unresolved identities get the placeholder
    pub fn author(&self, user_id: &str) -> Author {
        let profile = self.profile(user_id);
        let name = profile
            .and_then(|p| p.username.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(UNKNOWN_USER)
            .to_string();

        Author {
            id: user_id.to_string(),
            name,
            avatar_url: profile.and_then(|p| p.avatar_url.clone()),
        }
    }
}

/// Bulk identity lookup with a profile cache in front
pub struct IdentityEnricher {
    store: Arc<dyn Persistence>,
    cache: Arc<ProfileCache>,
}

impl IdentityEnricher {
    pub fn new(store: Arc<dyn Persistence>, cache: Arc<ProfileCache>) -> Self {
        Self { store, cache }
    }

    /// Resolve profiles for the given user ids
    ///
    /// Duplicate ids are collapsed. Cached profiles are reused and only the
    /// misses are fetched, in a single call; no call is made when nothing
    /// is missing. A failed lookup is logged and reported through
    /// [`Enrichment::failed`], never returned as an error.
    pub async fn enrich<'a, I>(&self, user_ids: I) -> Enrichment
    where
        I: IntoIterator<Item = &'a str>,
    {
        let wanted: BTreeSet<String> = user_ids.into_iter().map(str::to_string).collect();
        if wanted.is_empty() {
            return Enrichment::default();
        }

        let (mut profiles, misses) = self.cache.partition(&wanted).await;
        if misses.is_empty() {
            return Enrichment {
                profiles,
                failed: false,
            };
        }

        match self.fetch(&misses).await {
            Ok(fetched) => {
                for profile in fetched {
                    let profile = self.cache.insert(profile).await;
                    profiles.insert(profile.id.clone(), profile);
                }
                Enrichment {
                    profiles,
                    failed: false,
                }
            }
            Err(error) => {
                tracing::warn!(
                    %error,
                    missing = misses.len(),
                    "Profile lookup failed; using placeholders"
                );
                Enrichment {
                    profiles,
                    failed: true,
                }
            }
        }
    }

    async fn fetch(&self, user_ids: &[String]) -> Result<Vec<Profile>, AppError> {
        let query = Select::from(Table::Profiles)
            .columns(&["id", "username", "avatar_url"])
            .filter(Filter::new().is_in("id", user_ids.iter().cloned()));
        let rows = self.store.select(&query).await?;
        from_rows(rows)
    }

    /// Forget a cached profile so the next render refetches it
    pub async fn forget(&self, user_id: &str) {
        self.cache.invalidate(user_id).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::data::{MemoryStore, Row, StoreOp};

    fn profile_row(id: &str, name: &str) -> Row {
        json!({"id": id, "username": name, "avatar_url": null})
            .as_object()
            .cloned()
            .unwrap()
    }

    fn enricher(store: Arc<MemoryStore>) -> IdentityEnricher {
        IdentityEnricher::new(
            store,
            Arc::new(ProfileCache::new(Duration::from_secs(60), 100)),
        )
    }

    #[tokio::test]
    async fn empty_set_skips_the_call() {
        let store = Arc::new(MemoryStore::new());
        let enricher = enricher(store.clone());

        let enrichment = enricher.enrich(std::iter::empty::<&str>()).await;

        assert!(!enrichment.failed());
        assert_eq!(store.total_calls(), 0);
    }

    #[tokio::test]
    async fn duplicates_collapse_into_one_call_and_cache_serves_the_next() {
        let store = Arc::new(MemoryStore::new());
        store
            .seed(
                Table::Profiles,
                vec![profile_row("u1", "Maya"), profile_row("u2", "Ren")],
            )
            .await;
        let enricher = enricher(store.clone());

        let enrichment = enricher.enrich(["u1", "u2", "u1"]).await;
        assert_eq!(enrichment.author("u1").name, "Maya");
        assert_eq!(store.call_count(StoreOp::Select, Table::Profiles), 1);

        enricher.enrich(["u2"]).await;
        assert_eq!(store.call_count(StoreOp::Select, Table::Profiles), 1);
    }

    #[tokio::test]
    async fn failed_lookup_yields_placeholders() {
        let store = Arc::new(MemoryStore::new());
        store.fail_on(Table::Profiles, StoreOp::Select);
        let enricher = enricher(store);

        let enrichment = enricher.enrich(["u2"]).await;

        assert!(enrichment.failed());
        let author = enrichment.author("u2");
        assert_eq!(author.name, UNKNOWN_USER);
        assert_eq!(author.id, "u2");
    }

    #[tokio::test]
    async fn blank_username_is_unknown() {
        let store = Arc::new(MemoryStore::new());
        store.seed(Table::Profiles, vec![profile_row("u1", " ")]).await;
        let enricher = enricher(store);

        assert_eq!(enricher.enrich(["u1"]).await.author("u1").name, UNKNOWN_USER);
    }
}
