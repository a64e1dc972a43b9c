//! Feed assembler
//!
//! Joins post rows with author identities and the viewer's engagement
//! state. Anonymous posts never carry an author: name, id and avatar are
//! absent together.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::engagement::EngagementTracker;
use super::enrich::{Author, IdentityEnricher, UNKNOWN_USER};
use super::labels::post_age_label;
use super::Listing;
use crate::data::{
    Filter, MediaRef, Mood, MoodFilter, Persistence, Post, Select, SubjectKind, SubjectRef, Table,
    from_rows,
};
use crate::error::{AppError, Notice};
use crate::metrics::{FEED_FETCHES_TOTAL, FEED_ITEMS};

/// Display-ready post
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayPost {
    pub id: String,
    pub content: String,
    pub mood: Mood,
    pub color: String,
    pub location: Option<String>,
    pub media: Option<MediaRef>,
    pub created_at: DateTime<Utc>,
    /// `None` for anonymous posts
    pub author: Option<Author>,
    pub like_count: i64,
    pub liked: bool,
}

impl DisplayPost {
    pub fn subject(&self) -> SubjectRef {
        SubjectRef::post(self.id.clone())
    }

    pub fn is_anonymous(&self) -> bool {
        self.author.is_none()
    }

    pub fn age_label(&self, now: DateTime<Utc>) -> String {
        post_age_label(self.created_at, now)
    }
}

/// Sequence token of one feed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchToken(u64);

/// Outcome of [`FeedAssembler::refresh`]
#[derive(Debug, Clone, PartialEq)]
pub struct FeedRefresh {
    pub listing: Listing<DisplayPost>,
    /// False if a later fetch was issued before this one completed
    pub applied: bool,
}

#[derive(Debug, Default)]
struct FeedView {
    filter: MoodFilter,
    posts: Vec<DisplayPost>,
}

/// Feed assembler
pub struct FeedAssembler {
    store: Arc<dyn Persistence>,
    enricher: Arc<IdentityEnricher>,
    engagement: Arc<EngagementTracker>,
    batch_size: Option<usize>,
    issued: AtomicU64,
    view: Mutex<FeedView>,
}

impl FeedAssembler {
    pub fn new(
        store: Arc<dyn Persistence>,
        enricher: Arc<IdentityEnricher>,
        engagement: Arc<EngagementTracker>,
        batch_size: Option<usize>,
    ) -> Self {
        Self {
            store,
            enricher,
            engagement,
            batch_size,
            issued: AtomicU64::new(0),
            view: Mutex::new(FeedView::default()),
        }
    }

    // =========================================================================
    // Assembly
    // =========================================================================

    /// Fetch and assemble the feed for `filter`, newest first
    ///
    /// Never fails: a post fetch failure yields an empty listing with a
    /// notice, an identity lookup failure yields placeholders with a notice.
    pub async fn fetch(&self, filter: &MoodFilter) -> Listing<DisplayPost> {
        let rows = match self.fetch_posts(filter).await {
            Ok(rows) => rows,
            Err(error) => {
                FEED_FETCHES_TOTAL.with_label_values(&["posts", "error"]).inc();
                tracing::error!(%error, "Failed to fetch posts");
                return Listing::failed(&error);
            }
        };

        let public_authors = rows
            .iter()
            .filter(|post| !post.is_anonymous)
            .map(|post| post.user_id.as_str());
        let enrichment = self.enricher.enrich(public_authors).await;
        let ids: Vec<&str> = rows.iter().map(|post| post.id.as_str()).collect();
        let likes_loaded = match self.engagement.load_likes(SubjectKind::Post, &ids).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(%error, "Failed to load liked flags");
                false
            }
        };

        let posts: Vec<DisplayPost> = rows
            .into_iter()
            .filter(|post| filter.matches(&post.mood))
            .map(|post| {
                let author = (!post.is_anonymous).then(|| enrichment.author(&post.user_id));
                self.display(post, author)
            })
            .collect();

        let (outcome, notice) = if enrichment.failed() {
            (
                "partial",
                Some(Notice::partial_data("Some author names could not be loaded")),
            )
        } else if !likes_loaded {
            (
                "partial",
                Some(Notice::partial_data("Some likes could not be loaded")),
            )
        } else {
            ("ok", None)
        };
        FEED_FETCHES_TOTAL.with_label_values(&["posts", outcome]).inc();
        FEED_ITEMS
            .with_label_values(&["posts"])
            .set(posts.len() as i64);
        tracing::debug!(count = posts.len(), outcome, "Feed assembled");

        Listing::new(posts, notice)
    }

    async fn fetch_posts(&self, filter: &MoodFilter) -> Result<Vec<Post>, AppError> {
        let predicate = match filter {
            MoodFilter::All => Filter::new(),
            MoodFilter::Only(mood) => Filter::new().eq("mood", mood.as_str()),
        };
        let query = Select::from(Table::Posts)
            .filter(predicate)
            .newest_first("created_at")
            .maybe_limit(self.batch_size);

        let rows = self.store.select(&query).await?;
        from_rows(rows)
    }

    fn display(&self, post: Post, author: Option<Author>) -> DisplayPost {
        let subject = SubjectRef::post(post.id.clone());
        self.engagement.observe_count(&subject, post.like_count);
        let like_count = self
            .engagement
            .like_count(&subject)
            .unwrap_or(post.like_count.max(0));
        let liked = self.engagement.is_liked(&subject);
        let media = post.media();

        DisplayPost {
            id: post.id,
            content: post.content,
            mood: post.mood,
            color: post.color,
            location: post.location,
            media,
            created_at: post.created_at,
            author,
            like_count,
            liked,
        }
    }

    // =========================================================================
    // Current view
    // =========================================================================

    /// Issue the token for a new fetch; later tokens supersede earlier ones
    pub fn issue_token(&self) -> FetchToken {
        FetchToken(self.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Replace the current view if `token` is the latest issued
    pub fn apply(&self, token: FetchToken, filter: MoodFilter, posts: Vec<DisplayPost>) -> bool {
        let latest = self.issued.load(Ordering::SeqCst);
        if token.0 != latest {
            tracing::debug!(token = token.0, latest, "Discarding stale feed result");
            return false;
        }
        match self.view.lock() {
            Ok(mut view) => {
                *view = FeedView { filter, posts };
                true
            }
            Err(_) => false,
        }
    }

    /// Fetch and replace the current view, last-issued-wins
    pub async fn refresh(&self, filter: MoodFilter) -> FeedRefresh {
        let token = self.issue_token();
        let listing = self.fetch(&filter).await;
        let applied = self.apply(token, filter, listing.items.clone());
        FeedRefresh { listing, applied }
    }

    /// Posts currently shown
    pub fn current(&self) -> Vec<DisplayPost> {
        self.view
            .lock()
            .map(|view| view.posts.clone())
            .unwrap_or_default()
    }

    /// Re-filter the current view without a fetch
    pub fn filtered(&self, filter: &MoodFilter) -> Vec<DisplayPost> {
        self.current()
            .into_iter()
            .filter(|post| filter.matches(&post.mood))
            .collect()
    }

    /// Put a just-published post at the top of the current view
    ///
    /// Skipped if the post does not match the active filter. The next
    /// refresh replaces it with the stored row. `fallback_name` is shown
    /// when the author has no profile yet.
    pub async fn prepend_published(&self, post: Post, fallback_name: Option<&str>) -> DisplayPost {
        let author = if post.is_anonymous {
            None
        } else {
            let enrichment = self.enricher.enrich([post.user_id.as_str()]).await;
            let mut author = enrichment.author(&post.user_id);
            if author.name == UNKNOWN_USER {
                if let Some(name) = fallback_name {
                    author.name = name.to_string();
                }
            }
            Some(author)
        };
        let display = self.display(post, author);

        if let Ok(mut view) = self.view.lock() {
            if view.filter.matches(&display.mood)
                && !view.posts.iter().any(|existing| existing.id == display.id)
            {
                view.posts.insert(0, display.clone());
            }
        }
        display
    }

    /// Update the liked flag and count of one shown post
    pub fn apply_like(&self, post_id: &str, liked: bool, like_count: i64) {
        if let Ok(mut view) = self.view.lock() {
            if let Some(post) = view.posts.iter_mut().find(|post| post.id == post_id) {
                post.liked = liked;
                post.like_count = like_count;
            }
        }
    }

    pub fn clear(&self) {
        if let Ok(mut view) = self.view.lock() {
            *view = FeedView::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{Value, json};

    use super::*;
    use crate::data::{MemoryStore, ProfileCache, Row, StoreOp};

    fn row(value: Value) -> Row {
        serde_json::from_value(value).unwrap()
    }

    fn post_row(id: &str, user: &str, anonymous: bool, mood: &str, minutes_ago: i64) -> Row {
        let created_at = Utc::now() - chrono::Duration::minutes(minutes_ago);
        row(json!({
            "id": id,
            "content": format!("post {id}"),
            "mood": mood,
            "color": "bg-pink-100",
            "is_anonymous": anonymous,
            "location": null,
            "media_url": null,
            "media_type": null,
            "user_id": user,
            "created_at": created_at.to_rfc3339(),
            "like_count": 0
        }))
    }

    fn assembler(store: Arc<MemoryStore>, viewer: Option<&str>) -> FeedAssembler {
        let enricher = Arc::new(IdentityEnricher::new(
            store.clone(),
            Arc::new(ProfileCache::new(Duration::from_secs(60), 100)),
        ));
        let engagement = Arc::new(EngagementTracker::new(
            store.clone(),
            viewer.map(str::to_string),
        ));
        FeedAssembler::new(store, enricher, engagement, None)
    }

    #[tokio::test]
    async fn newest_first_with_authors() {
        let store = Arc::new(MemoryStore::new());
        store
            .seed(
                Table::Posts,
                vec![
                    post_row("old", "u1", false, "joy", 90),
                    post_row("new", "u1", false, "joy", 5),
                ],
            )
            .await;
        store
            .seed(
                Table::Profiles,
                vec![row(json!({"id": "u1", "username": "Maya", "avatar_url": "a.png"}))],
            )
            .await;

        let listing = assembler(store, None).fetch(&MoodFilter::All).await;

        assert!(listing.notice.is_none());
        let ids: Vec<_> = listing.items.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
        let author = listing.items[0].author.as_ref().unwrap();
        assert_eq!(author.name, "Maya");
        assert_eq!(author.avatar_url.as_deref(), Some("a.png"));
    }

    #[tokio::test]
    async fn all_anonymous_feed_skips_identity_call() {
        let store = Arc::new(MemoryStore::new());
        store
            .seed(Table::Posts, vec![post_row("p1", "u1", true, "lost", 1)])
            .await;

        let listing = assembler(store.clone(), None).fetch(&MoodFilter::All).await;

        assert!(listing.items[0].is_anonymous());
        assert_eq!(store.call_count(StoreOp::Select, Table::Profiles), 0);
    }

    #[tokio::test]
    async fn post_fetch_failure_is_an_empty_feed_with_notice() {
        let store = Arc::new(MemoryStore::new());
        store.fail_on(Table::Posts, StoreOp::Select);

        let listing = assembler(store, None).fetch(&MoodFilter::All).await;

        assert!(listing.is_empty());
        assert!(listing.notice.is_some());
    }

    #[tokio::test]
    async fn mood_filter_is_pushed_down() {
        let store = Arc::new(MemoryStore::new());
        store
            .seed(
                Table::Posts,
                vec![
                    post_row("p1", "u1", true, "joy", 1),
                    post_row("p2", "u1", true, "lost", 2),
                ],
            )
            .await;

        let filter = MoodFilter::parse("lost").unwrap();
        let listing = assembler(store, None).fetch(&filter).await;

        assert_eq!(listing.len(), 1);
        assert_eq!(listing.items[0].id, "p2");
    }

    #[tokio::test]
    async fn stale_result_is_not_applied() {
        let store = Arc::new(MemoryStore::new());
        let feed = assembler(store, None);

        let first = feed.issue_token();
        let second = feed.issue_token();

        assert!(feed.apply(second, MoodFilter::All, Vec::new()));
        assert!(!feed.apply(first, MoodFilter::All, Vec::new()));
    }

    #[tokio::test]
    async fn published_post_is_prepended() {
        let store = Arc::new(MemoryStore::new());
        store
            .seed(Table::Posts, vec![post_row("p1", "u1", true, "joy", 30)])
            .await;
        let feed = assembler(store, Some("v"));
        assert!(feed.refresh(MoodFilter::All).await.applied);

        let published: Post = serde_json::from_value(Value::Object(post_row(
            "p2", "v", true, "joy", 0,
        )))
        .unwrap();
        feed.prepend_published(published, None).await;

        let ids: Vec<_> = feed.current().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["p2".to_string(), "p1".to_string()]);
    }
}
