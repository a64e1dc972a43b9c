//! Service layer
//!
//! Contains the feed and engagement logic, separated from the stores.
//! Services orchestrate persistence, blob storage and the profile cache.

mod compose;
mod engagement;
mod enrich;
mod feed;
mod labels;
mod media;
mod notes;
mod playback;
mod profile;
mod statuses;

pub use compose::{PostComposer, PostDraft};
pub use engagement::{EngagementTracker, LikeState};
pub use enrich::{Author, Enrichment, IdentityEnricher, UNKNOWN_USER};
pub use feed::{DisplayPost, FeedAssembler, FeedRefresh, FetchToken};
pub use labels::{post_age_label, status_age_label};
pub use media::MediaUploader;
pub use notes::{NoteBook, NoteDraft};
pub use playback::{MediaElement, MediaElementFactory, PlaybackChange, PlaybackCoordinator};
pub use profile::ProfileService;
pub use statuses::{DisplayStatus, StatusBoard, StatusDraft};

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::Notice;

/// Source of "now" for expiry checks and labels
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Wall clock
pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Result of a read: the rows that could be shown, plus an optional notice
///
/// Reads never fail outright. A failed fetch yields no items and a notice.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub notice: Option<Notice>,
}

impl<T> Listing<T> {
    pub fn new(items: Vec<T>, notice: Option<Notice>) -> Self {
        Self { items, notice }
    }

    /// Empty listing carrying the error's notice
    pub fn failed(error: &crate::error::AppError) -> Self {
        Self {
            items: Vec::new(),
            notice: Some(error.notice()),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
