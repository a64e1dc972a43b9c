//! Ephemeral status board
//!
//! Statuses are listed only while `now < expires_at`. Every listing is a
//! re-fetch with the expiry applied both as a store predicate and again on
//! the returned rows, so an expired or deleted status never comes back.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::engagement::{EngagementTracker, LikeState};
use super::enrich::{Author, IdentityEnricher};
use super::labels::status_age_label;
use super::{Clock, Listing};
use crate::data::{
    Filter, MediaKind, MediaRef, Mood, NewStatus, Persistence, Select, Status, SubjectKind,
    SubjectRef, Table, from_row, from_rows, to_row,
};
use crate::error::{AppError, Notice};
use crate::metrics::{FEED_FETCHES_TOTAL, FEED_ITEMS};

/// Maximum characters of status text
pub const MAX_STATUS_CHARS: usize = 10;
/// Maximum characters of a status emoji
pub const MAX_EMOJI_CHARS: usize = 2;
/// Mood used when the draft names none
pub const DEFAULT_MOOD: &str = "love";

/// Display-ready status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayStatus {
    pub id: String,
    pub content: Option<String>,
    pub mood: Mood,
    pub color: String,
    /// Stored emoji, or the mood's emoji
    pub emoji: String,
    pub audio_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub author: Author,
    pub like_count: i64,
    pub liked: bool,
}

impl DisplayStatus {
    pub fn subject(&self) -> SubjectRef {
        SubjectRef::status(self.id.clone())
    }

    pub fn age_label(&self, now: DateTime<Utc>) -> String {
        status_age_label(self.created_at, now)
    }
}

/// Input of the status-creation action
#[derive(Debug, Clone, Default)]
pub struct StatusDraft {
    pub content: Option<String>,
    pub mood: Option<Mood>,
    pub emoji: Option<String>,
    pub audio: Option<MediaRef>,
}

/// Ephemeral status manager
pub struct StatusBoard {
    store: Arc<dyn Persistence>,
    enricher: Arc<IdentityEnricher>,
    engagement: Arc<EngagementTracker>,
    clock: Clock,
    limit: usize,
    ttl: Duration,
}

impl StatusBoard {
    pub fn new(
        store: Arc<dyn Persistence>,
        enricher: Arc<IdentityEnricher>,
        engagement: Arc<EngagementTracker>,
        clock: Clock,
        limit: usize,
        ttl_hours: i64,
    ) -> Self {
        Self {
            store,
            enricher,
            engagement,
            clock,
            limit,
            ttl: Duration::hours(ttl_hours),
        }
    }

    /// Active statuses, newest first, at most `limit`
    pub async fn list_active_statuses(&self) -> Listing<DisplayStatus> {
        let now = (self.clock)();
        let rows = match self.fetch_active(now).await {
            Ok(rows) => rows,
            Err(error) => {
                FEED_FETCHES_TOTAL
                    .with_label_values(&["statuses", "error"])
                    .inc();
                tracing::error!(%error, "Failed to fetch statuses");
                return Listing::failed(&error);
            }
        };

        let now = (self.clock)();
        let active: Vec<Status> = rows
            .into_iter()
            .filter(|status| status.is_active_at(now))
            .collect();

        let enrichment = self
            .enricher
            .enrich(active.iter().map(|status| status.user_id.as_str()))
            .await;
        let ids: Vec<&str> = active.iter().map(|status| status.id.as_str()).collect();
        let likes_loaded = match self.engagement.load_likes(SubjectKind::Status, &ids).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(%error, "Failed to load liked flags");
                false
            }
        };

        let statuses: Vec<DisplayStatus> = active
            .into_iter()
            .map(|status| {
                let author = enrichment.author(&status.user_id);
                self.display(status, author)
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
        FEED_FETCHES_TOTAL
            .with_label_values(&["statuses", outcome])
            .inc();
        FEED_ITEMS
            .with_label_values(&["statuses"])
            .set(statuses.len() as i64);

        Listing::new(statuses, notice)
    }

    async fn fetch_active(&self, now: DateTime<Utc>) -> Result<Vec<Status>, AppError> {
        let query = Select::from(Table::StatusUpdates)
            .filter(Filter::new().gt("expires_at", now.to_rfc3339()))
            .newest_first("created_at")
            .limit(self.limit);
        let rows = self.store.select(&query).await?;
        from_rows(rows)
    }

    fn display(&self, status: Status, author: Author) -> DisplayStatus {
        let subject = SubjectRef::status(status.id.clone());
        self.engagement.observe_count(&subject, status.like_count);
        let like_count = self
            .engagement
            .like_count(&subject)
            .unwrap_or(status.like_count.max(0));
        let liked = self.engagement.is_liked(&subject);
        let emoji = status
            .emoji
            .clone()
            .filter(|emoji| !emoji.is_empty())
            .unwrap_or_else(|| status.mood.emoji().to_string());

        DisplayStatus {
            id: status.id,
            content: status.content,
            mood: status.mood,
            color: status.color,
            emoji,
            audio_url: status.audio_url,
            created_at: status.created_at,
            expires_at: status.expires_at,
            author,
            like_count,
            liked,
        }
    }

    /// Like or unlike a status
    pub async fn toggle_like(&self, status_id: &str) -> Result<LikeState, AppError> {
        self.engagement
            .toggle_like(&SubjectRef::status(status_id))
            .await
    }

    /// Share a status that expires after the configured TTL
    ///
    /// # Errors
    /// - `Unauthenticated` without a viewer
    /// - `Validation` for an empty draft, text over 10 characters, an emoji
    ///   over 2 characters, or non-audio media
    pub async fn create_status(&self, draft: StatusDraft) -> Result<Status, AppError> {
        let viewer = self
            .engagement
            .viewer()
            .ok_or(AppError::Unauthenticated)?
            .to_string();

        let content = draft
            .content
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty());
        let emoji = draft
            .emoji
            .map(|emoji| emoji.trim().to_string())
            .filter(|emoji| !emoji.is_empty());

        if content.is_none() && emoji.is_none() && draft.audio.is_none() {
            return Err(AppError::Validation(
                "Please add some content to your status".to_string(),
            ));
        }
        if content
            .as_ref()
            .is_some_and(|content| content.chars().count() > MAX_STATUS_CHARS)
        {
            return Err(AppError::Validation(format!(
                "Status text is limited to {MAX_STATUS_CHARS} characters"
            )));
        }
        if emoji
            .as_ref()
            .is_some_and(|emoji| emoji.chars().count() > MAX_EMOJI_CHARS)
        {
            return Err(AppError::Validation(format!(
                "Emoji is limited to {MAX_EMOJI_CHARS} characters"
            )));
        }
        if let Some(audio) = &draft.audio {
            if audio.kind != MediaKind::Audio {
                return Err(AppError::Validation(
                    "Status media must be an audio file".to_string(),
                ));
            }
        }

        let mood = match draft.mood {
            Some(mood) => mood,
            None => Mood::parse(DEFAULT_MOOD)?,
        };
        let now = (self.clock)();
        let new_status = NewStatus {
            content,
            color: mood.color().to_string(),
            emoji: Some(emoji.unwrap_or_else(|| mood.emoji().to_string())),
            mood,
            audio_url: draft.audio.map(|audio| audio.url),
            user_id: viewer,
            expires_at: now + self.ttl,
        };

        let row = self
            .store
            .insert(Table::StatusUpdates, to_row(&new_status)?)
            .await?;
        let status: Status = from_row(row)?;

        tracing::info!(status_id = %status.id, expires_at = %status.expires_at, "Status shared");
        Ok(status)
    }

    /// Delete one of the viewer's statuses
    ///
    /// # Errors
    /// - `Unauthenticated` without a viewer
    /// - `NotFound` if the status does not exist
    /// - `Forbidden` if the viewer does not own it
    pub async fn delete_status(&self, status_id: &str) -> Result<(), AppError> {
        let viewer = self.engagement.viewer().ok_or(AppError::Unauthenticated)?;

        let query = Select::from(Table::StatusUpdates)
            .columns(&["id", "user_id"])
            .filter(Filter::new().eq("id", status_id))
            .limit(1);
        let rows = self.store.select(&query).await?;
        let owner = rows
            .first()
            .and_then(|row| row.get("user_id"))
            .and_then(|value| value.as_str())
            .ok_or(AppError::NotFound)?;
        if owner != viewer {
            return Err(AppError::Forbidden);
        }

        let filter = Filter::new().eq("id", status_id).eq("user_id", viewer);
        self.store.delete(Table::StatusUpdates, &filter).await?;

        tracing::info!(status_id, "Status deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration as StdDuration;

    use serde_json::json;

    use super::*;
    use crate::data::{MemoryStore, ProfileCache, Row};

    fn status_row(id: &str, user: &str, created: DateTime<Utc>, expires: DateTime<Utc>) -> Row {
        serde_json::from_value(json!({
            "id": id,
            "content": "hi",
            "mood": "joy",
            "color": "bg-yellow-100",
            "emoji": null,
            "audio_url": null,
            "user_id": user,
            "created_at": created.to_rfc3339(),
            "expires_at": expires.to_rfc3339(),
            "like_count": 1
        }))
        .unwrap()
    }

    fn board(store: Arc<MemoryStore>, viewer: Option<&str>, clock: Clock) -> StatusBoard {
        let enricher = Arc::new(IdentityEnricher::new(
            store.clone(),
            Arc::new(ProfileCache::new(StdDuration::from_secs(60), 100)),
        ));
        let engagement = Arc::new(EngagementTracker::new(
            store.clone(),
            viewer.map(str::to_string),
        ));
        StatusBoard::new(store, enricher, engagement, clock, 20, 24)
    }

    fn fixed_clock(at: DateTime<Utc>) -> (Arc<Mutex<DateTime<Utc>>>, Clock) {
        let now = Arc::new(Mutex::new(at));
        let handle = now.clone();
        let clock: Clock = Arc::new(move || *handle.lock().unwrap());
        (now, clock)
    }

    #[tokio::test]
    async fn expired_status_disappears_on_next_listing() {
        let start = Utc::now();
        let store = Arc::new(MemoryStore::new());
        store
            .seed(
                Table::StatusUpdates,
                vec![status_row("s1", "u1", start, start + Duration::hours(1))],
            )
            .await;
        let (now, clock) = fixed_clock(start);
        let board = board(store, None, clock);

        assert_eq!(board.list_active_statuses().await.len(), 1);

        *now.lock().unwrap() = start + Duration::hours(2);
        assert!(board.list_active_statuses().await.is_empty());
    }

    #[tokio::test]
    async fn listing_is_bounded_and_newest_first() {
        let start = Utc::now();
        let store = Arc::new(MemoryStore::new());
        let rows = (0..25)
            .map(|i| {
                status_row(
                    &format!("s{i:02}"),
                    "u1",
                    start - Duration::minutes(i),
                    start + Duration::hours(1),
                )
            })
            .collect();
        store.seed(Table::StatusUpdates, rows).await;
        let (_, clock) = fixed_clock(start);

        let listing = board(store, None, clock).list_active_statuses().await;

        assert_eq!(listing.len(), 20);
        assert_eq!(listing.items[0].id, "s00");
        assert_eq!(listing.items[0].emoji, "😊");
        assert_eq!(listing.items[0].author.name, "Unknown User");
    }

    #[tokio::test]
    async fn create_validates_before_any_call() {
        let store = Arc::new(MemoryStore::new());
        let board = board(store.clone(), Some("v"), super::super::system_clock());

        let empty = board.create_status(StatusDraft::default()).await;
        assert!(matches!(empty, Err(AppError::Validation(_))));

        let long = board
            .create_status(StatusDraft {
                content: Some("eleven chars".to_string()),
                ..Default::default()
            })
            .await;
        assert!(matches!(long, Err(AppError::Validation(_))));

        let video = board
            .create_status(StatusDraft {
                audio: Some(MediaRef {
                    url: "https://cdn/x.mp4".to_string(),
                    kind: MediaKind::Video,
                }),
                ..Default::default()
            })
            .await;
        assert!(matches!(video, Err(AppError::Validation(_))));
        assert_eq!(store.total_calls(), 0);
    }

    #[tokio::test]
    async fn create_defaults_emoji_and_expiry() {
        let start = Utc::now();
        let store = Arc::new(MemoryStore::new());
        let (_, clock) = fixed_clock(start);
        let board = board(store, Some("v"), clock);

        let status = board
            .create_status(StatusDraft {
                content: Some("sunny".to_string()),
                mood: Some(Mood::parse("love").unwrap()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(status.emoji.as_deref(), Some("💖"));
        assert_eq!(status.color, "bg-pink-100");
        assert_eq!(status.expires_at, start + Duration::hours(24));
        assert_eq!(status.user_id, "v");
    }

    #[tokio::test]
    async fn only_owner_can_delete() {
        let start = Utc::now();
        let store = Arc::new(MemoryStore::new());
        store
            .seed(
                Table::StatusUpdates,
                vec![status_row("s1", "owner", start, start + Duration::hours(1))],
            )
            .await;

        let stranger = board(store.clone(), Some("v"), super::super::system_clock());
        assert!(matches!(
            stranger.delete_status("s1").await,
            Err(AppError::Forbidden)
        ));

        let owner = board(store.clone(), Some("owner"), super::super::system_clock());
        owner.delete_status("s1").await.unwrap();
        assert!(store.rows(Table::StatusUpdates).await.is_empty());
        assert!(matches!(
            owner.delete_status("s1").await,
            Err(AppError::NotFound)
        ));
    }
}
