//! Engagement state tracker
//!
//! Per-viewer view of "have I liked this" and "do I follow them", seeded in
//! bulk once per session. Every toggle round-trips to the store and local
//! state changes only after the store accepted the write. Toggles on the
//! same subject are serialized through an in-flight set; the second one is
//! rejected, not queued.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Value, json};

use crate::data::{Filter, Persistence, Row, Select, SubjectKind, SubjectRef, Table};
use crate::error::AppError;
use crate::metrics::TOGGLES_TOTAL;

/// Liked flag and cached count of one subject after a toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeState {
    pub liked: bool,
    pub like_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ToggleKey {
    Like(SubjectRef),
    Follow(String),
}

#[derive(Debug, Default)]
struct EngagementState {
    seeded: bool,
    liked: HashSet<SubjectRef>,
    following: HashSet<String>,
    counts: HashMap<SubjectRef, i64>,
    in_flight: HashSet<ToggleKey>,
}

/// Removes the in-flight marker when the toggle finishes, however it ends
struct InFlight<'a> {
    state: &'a Mutex<EngagementState>,
    key: ToggleKey,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.in_flight.remove(&self.key);
        }
    }
}

/// Engagement state tracker
pub struct EngagementTracker {
    store: Arc<dyn Persistence>,
    viewer: Option<String>,
    state: Mutex<EngagementState>,
}

impl EngagementTracker {
    /// Create a tracker for `viewer` (`None` when signed out)
    pub fn new(store: Arc<dyn Persistence>, viewer: Option<String>) -> Self {
        Self {
            store,
            viewer,
            state: Mutex::new(EngagementState::default()),
        }
    }

    pub fn viewer(&self) -> Option<&str> {
        self.viewer.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, EngagementState>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("engagement state poisoned")))
    }

    fn signed_in(&self, kind: &'static str) -> Result<&str, AppError> {
        self.viewer.as_deref().ok_or_else(|| {
            TOGGLES_TOTAL
                .with_label_values(&[kind, "unauthenticated"])
                .inc();
            AppError::Unauthenticated
        })
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    /// Load the viewer's likes and follows in bulk
    ///
    /// Three calls in total, independent of feed size. On failure the
    /// tracker stays unseeded and [`EngagementTracker::probe_like`] /
    /// [`EngagementTracker::probe_follow`] fall back to per-subject checks.
    pub async fn seed(&self) -> Result<(), AppError> {
        let Some(viewer) = self.viewer.as_deref() else {
            self.lock()?.seeded = true;
            return Ok(());
        };

        let by_viewer = Filter::new().eq("user_id", viewer);
        let post_likes = Select::from(Table::PostLikes)
            .columns(&["post_id"])
            .filter(by_viewer.clone());
        let status_likes = Select::from(Table::StatusLikes)
            .columns(&["status_id"])
            .filter(by_viewer);
        let follows = Select::from(Table::UserFollows)
            .columns(&["following_id"])
            .filter(Filter::new().eq("follower_id", viewer));

        let result = futures::try_join!(
            self.store.select(&post_likes),
            self.store.select(&status_likes),
            self.store.select(&follows),
        );

        let (post_rows, status_rows, follow_rows) = match result {
            Ok(rows) => rows,
            Err(error) => {
                tracing::warn!(%error, viewer, "Engagement seeding failed; probing per subject");
                self.lock()?.seeded = false;
                return Err(error);
            }
        };

        let mut state = self.lock()?;
        state.liked.clear();
        state.following.clear();
        for id in column_values(&post_rows, "post_id") {
            state.liked.insert(SubjectRef::post(id));
        }
        for id in column_values(&status_rows, "status_id") {
            state.liked.insert(SubjectRef::status(id));
        }
        state
            .following
            .extend(column_values(&follow_rows, "following_id"));
        state.seeded = true;

        tracing::info!(
            viewer,
            likes = state.liked.len(),
            following = state.following.len(),
            "Engagement state seeded"
        );
        Ok(())
    }

    pub fn is_seeded(&self) -> bool {
        self.lock().map(|state| state.seeded).unwrap_or(false)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn is_liked(&self, subject: &SubjectRef) -> bool {
        self.lock()
            .map(|state| state.liked.contains(subject))
            .unwrap_or(false)
    }

    pub fn is_following(&self, user_id: &str) -> bool {
        self.lock()
            .map(|state| state.following.contains(user_id))
            .unwrap_or(false)
    }

    /// Last known like count of a subject
    pub fn like_count(&self, subject: &SubjectRef) -> Option<i64> {
        self.lock()
            .ok()
            .and_then(|state| state.counts.get(subject).copied())
    }

    /// Whether the follow action should be offered for an author
    ///
    /// `author_id` is `None` for anonymous rows.
    pub fn can_follow(&self, author_id: Option<&str>) -> bool {
        match (self.viewer.as_deref(), author_id) {
            (Some(viewer), Some(author)) => viewer != author,
            _ => false,
        }
    }

    /// Liked flag for one subject, asking the store only when unseeded
    pub async fn probe_like(&self, subject: &SubjectRef) -> Result<bool, AppError> {
        let Some(viewer) = self.viewer.as_deref() else {
            return Ok(false);
        };
        if self.is_seeded() {
            return Ok(self.is_liked(subject));
        }

        let filter = Filter::new()
            .eq(subject.kind.like_column(), subject.id.as_str())
            .eq("user_id", viewer);
        let liked = self.store.count(subject.kind.like_table(), &filter).await? > 0;

        let mut state = self.lock()?;
        if liked {
            state.liked.insert(subject.clone());
        } else {
            state.liked.remove(subject);
        }
        Ok(liked)
    }

    /// Following flag for one user, asking the store only when unseeded
    pub async fn probe_follow(&self, user_id: &str) -> Result<bool, AppError> {
        let Some(viewer) = self.viewer.as_deref() else {
            return Ok(false);
        };
        if self.is_seeded() {
            return Ok(self.is_following(user_id));
        }

        let filter = Filter::new()
            .eq("follower_id", viewer)
            .eq("following_id", user_id);
        let following = self.store.count(Table::UserFollows, &filter).await? > 0;

        let mut state = self.lock()?;
        if following {
            state.following.insert(user_id.to_string());
        } else {
            state.following.remove(user_id);
        }
        Ok(following)
    }

    /// Liked flags for a batch of subjects of one kind
    ///
    /// A no-op once seeded. Otherwise one lookup covers the whole batch, so
    /// an unseeded tracker still renders correct flags without per-row
    /// calls.
    pub async fn load_likes(&self, kind: SubjectKind, ids: &[&str]) -> Result<(), AppError> {
        let Some(viewer) = self.viewer.as_deref() else {
            return Ok(());
        };
        if ids.is_empty() || self.is_seeded() {
            return Ok(());
        }

        let column = kind.like_column();
        let query = Select::from(kind.like_table())
            .columns(&[column])
            .filter(
                Filter::new()
                    .eq("user_id", viewer)
                    .is_in(column, ids.iter().copied()),
            );
        let rows = self.store.select(&query).await?;
        let liked: HashSet<String> = column_values(&rows, column).into_iter().collect();

        let mut state = self.lock()?;
        for id in ids {
            let subject = SubjectRef {
                kind,
                id: id.to_string(),
            };
            if liked.contains(*id) {
                state.liked.insert(subject);
            } else {
                state.liked.remove(&subject);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Counts
    // =========================================================================

    /// Adopt an authoritative like count from a re-fetch
    ///
    /// Ignored while a toggle on the subject is in flight.
    pub fn observe_count(&self, subject: &SubjectRef, count: i64) {
        if let Ok(mut state) = self.lock() {
            if state
                .in_flight
                .contains(&ToggleKey::Like(subject.clone()))
            {
                return;
            }
            state.counts.insert(subject.clone(), count.max(0));
        }
    }

    /// Recount the like relation and adopt the result
    pub async fn reconcile_like_count(&self, subject: &SubjectRef) -> Result<i64, AppError> {
        let filter = Filter::new().eq(subject.kind.like_column(), subject.id.as_str());
        let count = self.store.count(subject.kind.like_table(), &filter).await?;
        let count = i64::try_from(count).unwrap_or(i64::MAX);

        self.lock()?.counts.insert(subject.clone(), count);
        tracing::debug!(%subject, count, "Like count reconciled");
        Ok(count)
    }

    /// Cached `like_count` column of the subject row; 0 if the row is gone
    async fn stored_like_count(&self, subject: &SubjectRef) -> Result<i64, AppError> {
        let query = Select::from(subject.kind.table())
            .columns(&["like_count"])
            .filter(Filter::new().eq("id", subject.id.as_str()))
            .limit(1);
        let rows = self.store.select(&query).await?;
        let count = rows
            .first()
            .and_then(|row| row.get("like_count"))
            .and_then(Value::as_i64)
            .unwrap_or(0)
            .max(0);
        Ok(count)
    }

    // =========================================================================
    // Toggles
    // =========================================================================

    fn begin(&self, key: ToggleKey, kind: &'static str) -> Result<InFlight<'_>, AppError> {
        let mut state = self.lock()?;
        if !state.in_flight.insert(key.clone()) {
            TOGGLES_TOTAL.with_label_values(&[kind, "in_flight"]).inc();
            let label = match &key {
                ToggleKey::Like(subject) => subject.to_string(),
                ToggleKey::Follow(user_id) => format!("user:{user_id}"),
            };
            return Err(AppError::ToggleInFlight(label));
        }
        Ok(InFlight {
            state: &self.state,
            key,
        })
    }

    /// Like or unlike a post or status
    ///
    /// # Errors
    /// - `Unauthenticated` without a viewer (no store call)
    /// - `ToggleInFlight` while a toggle on the same subject is pending
    /// - the store error; local state is left untouched
    pub async fn toggle_like(&self, subject: &SubjectRef) -> Result<LikeState, AppError> {
        let kind = match subject.kind {
            SubjectKind::Post => "post_like",
            SubjectKind::Status => "status_like",
        };
        let viewer = self.signed_in(kind)?;
        let _guard = self.begin(ToggleKey::Like(subject.clone()), kind)?;
        let was_liked = self.probe_like(subject).await?;
        let base_count = match self.like_count(subject) {
            Some(count) => count,
            None => self.stored_like_count(subject).await?,
        };

        let table = subject.kind.like_table();
        let column = subject.kind.like_column();
        let result = if was_liked {
            let filter = Filter::new()
                .eq(column, subject.id.as_str())
                .eq("user_id", viewer);
            self.store.delete(table, &filter).await
        } else {
            self.store
                .insert(table, like_row(column, &subject.id, viewer))
                .await
                .map(|_| ())
        };

        if let Err(error) = result {
            TOGGLES_TOTAL.with_label_values(&[kind, "error"]).inc();
            tracing::warn!(%subject, %error, "Like toggle failed; state unchanged");
            return Err(error);
        }

        let mut state = self.lock()?;
        let liked = !was_liked;
        if liked {
            state.liked.insert(subject.clone());
        } else {
            state.liked.remove(subject);
        }
        let like_count = if liked {
            base_count + 1
        } else {
            (base_count - 1).max(0)
        };
        state.counts.insert(subject.clone(), like_count);
        drop(state);

        TOGGLES_TOTAL.with_label_values(&[kind, "ok"]).inc();
        tracing::info!(%subject, liked, like_count, "Like toggled");
        Ok(LikeState { liked, like_count })
    }

    /// Follow or unfollow a user; returns the new following flag
    ///
    /// # Errors
    /// - `Unauthenticated` without a viewer (no store call)
    /// - `Validation` when following oneself (no store call)
    /// - `ToggleInFlight` while a toggle on the same user is pending
    /// - the store error; local state is left untouched
    pub async fn toggle_follow(&self, user_id: &str) -> Result<bool, AppError> {
        let viewer = self.signed_in("follow")?;
        if viewer == user_id {
            TOGGLES_TOTAL.with_label_values(&["follow", "rejected"]).inc();
            return Err(AppError::Validation(
                "You cannot follow yourself".to_string(),
            ));
        }
        let _guard = self.begin(ToggleKey::Follow(user_id.to_string()), "follow")?;
        let was_following = self.probe_follow(user_id).await?;

        let result = if was_following {
            let filter = Filter::new()
                .eq("follower_id", viewer)
                .eq("following_id", user_id);
            self.store.delete(Table::UserFollows, &filter).await
        } else {
            let row = json!({ "follower_id": viewer, "following_id": user_id });
            self.store
                .insert(Table::UserFollows, into_row(row))
                .await
                .map(|_| ())
        };

        if let Err(error) = result {
            TOGGLES_TOTAL.with_label_values(&["follow", "error"]).inc();
            tracing::warn!(user_id, %error, "Follow toggle failed; state unchanged");
            return Err(error);
        }

        let following = !was_following;
        {
            let mut state = self.lock()?;
            if following {
                state.following.insert(user_id.to_string());
            } else {
                state.following.remove(user_id);
            }
        }

        TOGGLES_TOTAL.with_label_values(&["follow", "ok"]).inc();
        tracing::info!(user_id, following, "Follow toggled");
        Ok(following)
    }

    /// Drop all local state
    pub fn clear(&self) {
        if let Ok(mut state) = self.lock() {
            *state = EngagementState::default();
        }
    }
}

fn like_row(column: &str, subject_id: &str, viewer: &str) -> Row {
    let mut row = Row::new();
    row.insert(column.to_string(), Value::from(subject_id));
    row.insert("user_id".to_string(), Value::from(viewer));
    row
}

fn into_row(value: Value) -> Row {
    match value {
        Value::Object(row) => row,
        _ => Row::new(),
    }
}

fn column_values(rows: &[Row], column: &str) -> Vec<String> {
    rows.iter()
        .filter_map(|row| row.get(column).and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}
