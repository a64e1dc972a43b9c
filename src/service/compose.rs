//! Post composer
//!
//! Persists a new post and puts it at the top of the current feed. A failed
//! insert is surfaced; nothing is shown that the store did not accept.

use std::sync::Arc;

use super::feed::{DisplayPost, FeedAssembler};
use crate::auth::AuthUser;
use crate::data::{MediaRef, Mood, NewPost, Persistence, Post, Table, from_row, to_row};
use crate::error::AppError;

/// Input of the post-creation action
#[derive(Debug, Clone)]
pub struct PostDraft {
    pub content: String,
    pub mood: Mood,
    pub is_anonymous: bool,
    pub location: Option<String>,
    pub media: Option<MediaRef>,
}

impl PostDraft {
    pub fn new(content: impl Into<String>, mood: Mood) -> Self {
        Self {
            content: content.into(),
            mood,
            is_anonymous: false,
            location: None,
            media: None,
        }
    }

    pub fn anonymous(mut self) -> Self {
        self.is_anonymous = true;
        self
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_media(mut self, media: MediaRef) -> Self {
        self.media = Some(media);
        self
    }
}

/// Post composer
pub struct PostComposer {
    store: Arc<dyn Persistence>,
    feed: Arc<FeedAssembler>,
    viewer: Option<AuthUser>,
}

impl PostComposer {
    pub fn new(
        store: Arc<dyn Persistence>,
        feed: Arc<FeedAssembler>,
        viewer: Option<AuthUser>,
    ) -> Self {
        Self {
            store,
            feed,
            viewer,
        }
    }

    /// Create a post and prepend it to the current feed
    ///
    /// # Errors
    /// - `Unauthenticated` without a viewer
    /// - `Validation` for empty content
    /// - the store error; the feed is left as it was
    pub async fn publish(&self, draft: PostDraft) -> Result<(Post, DisplayPost), AppError> {
        let viewer = self.viewer.as_ref().ok_or(AppError::Unauthenticated)?;

        let content = draft.content.trim();
        if content.is_empty() {
            return Err(AppError::Validation(
                "Post content cannot be empty".to_string(),
            ));
        }
        let location = draft
            .location
            .as_deref()
            .map(str::trim)
            .filter(|location| !location.is_empty())
            .map(str::to_string);

        let new_post = NewPost {
            content: content.to_string(),
            color: draft.mood.color().to_string(),
            mood: draft.mood,
            is_anonymous: draft.is_anonymous,
            location,
            media_url: draft.media.as_ref().map(|media| media.url.clone()),
            media_type: draft.media.as_ref().map(|media| media.kind),
            user_id: viewer.id.clone(),
        };

        let row = self
            .store
            .insert(Table::Posts, to_row(&new_post)?)
            .await
            .inspect_err(|error| tracing::error!(%error, "Failed to create post"))?;
        let post: Post = from_row(row)?;

        tracing::info!(
            post_id = %post.id,
            mood = %post.mood,
            anonymous = post.is_anonymous,
            "Post published"
        );

        let display = self
            .feed
            .prepend_published(post.clone(), viewer.fallback_name())
            .await;
        Ok((post, display))
    }
}
