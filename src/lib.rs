//! Moodfeed - feed aggregation and engagement-state core for a mood-tagged
//! social feed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Session                              │
//! │  - Constructed at sign-in / start, torn down at end          │
//! │  - Owns per-viewer caches and the playing-media id           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Feed assembly and identity enrichment                     │
//! │  - Engagement state (likes / follows)                        │
//! │  - Ephemeral statuses, media, playback                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - Table store (remote REST or in-memory)                    │
//! │  - Blob storage (object API, S3, in-memory)                  │
//! │  - Profile cache (moka)                                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `service`: Feed, engagement, statuses, media and notes
//! - `data`: Table store contract, adapters and profile cache
//! - `storage`: Blob storage contract and adapters
//! - `auth`: Identity provider
//! - `config`: Configuration management
//! - `error`: Error types and user-facing notices
//! - `metrics`: Prometheus instruments

pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod service;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use auth::{AuthUser, IdentityProvider};
use data::{MoodFilter, Persistence, SubjectRef};
use error::{AppError, Notice};
use service::{
    EngagementTracker, FeedAssembler, FeedRefresh, IdentityEnricher, LikeState, MediaElementFactory,
    MediaUploader, NoteBook, PlaybackCoordinator, PostComposer, ProfileService, StatusBoard,
};
use storage::BlobStore;

/// External collaborators of a session
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn Persistence>,
    pub blobs: Arc<dyn BlobStore>,
    pub identity: Arc<dyn IdentityProvider>,
    /// Media element factory; `None` for hosts that cannot play media
    pub player: Option<Arc<dyn MediaElementFactory>>,
}

impl Backends {
    /// Build the remote collaborators described by `config`
    ///
    /// The table store, identity provider and object API share one HTTP
    /// client and one access token.
    pub fn from_config(config: &config::AppConfig) -> Result<Self, AppError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("Moodfeed/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        let token = auth::AccessToken::new(config.backend.access_token.clone());

        let store = data::RestStore::new(
            http_client.clone(),
            config.backend.rest_url(),
            config.backend.api_key.clone(),
            token.clone(),
        );
        let identity = auth::HttpIdentityProvider::new(
            http_client.clone(),
            config.backend.auth_url(),
            config.backend.api_key.clone(),
            token.clone(),
        );
        let blobs: Arc<dyn BlobStore> = match config.storage.backend {
            config::StorageBackend::Rest => Arc::new(storage::RestBlobStore::new(
                http_client,
                config.backend.storage_url(),
                config.backend.api_key.clone(),
                token,
            )),
            config::StorageBackend::S3 => Arc::new(storage::S3BlobStore::new(&config.storage)?),
        };

        Ok(Self {
            store: Arc::new(store),
            blobs,
            identity: Arc::new(identity),
            player: None,
        })
    }

    pub fn with_player(mut self, player: Arc<dyn MediaElementFactory>) -> Self {
        self.player = Some(player);
        self
    }
}

/// Per-viewer session state
///
/// Everything a viewer's screens share lives here: the profile cache, the
/// engagement state, the current feed and the playing-media id. Nothing is
/// global; a new session starts empty and [`Session::end`] drops it all.
pub struct Session {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Signed-in user, `None` for an unauthenticated viewer
    viewer: Option<AuthUser>,

    identity: Arc<dyn IdentityProvider>,

    /// Likes and follows of the viewer
    pub engagement: Arc<EngagementTracker>,

    /// Post feed
    pub feed: Arc<FeedAssembler>,

    /// Ephemeral statuses
    pub statuses: StatusBoard,

    /// Post creation
    pub composer: PostComposer,

    /// Media uploads
    pub media: MediaUploader,

    /// Profile lookups
    pub profiles: ProfileService,

    /// Private notes
    pub notes: NoteBook,

    playback: Option<PlaybackCoordinator>,

    notices: Vec<Notice>,
}

impl Session {
    /// Load configuration, connect to the configured backends and start
    pub async fn from_config(config: config::AppConfig) -> Result<Self, AppError> {
        let backends = Backends::from_config(&config)?;
        Self::start(config, backends).await
    }

    /// Start a session
    ///
    /// # Steps
    /// 1. Resolve the viewer
    /// 2. Initialize the profile cache
    /// 3. Seed engagement state in bulk
    /// 4. Wire the services
    ///
    /// Identity and seeding failures do not abort the start; they are
    /// logged and reported through [`Session::notices`].
    pub async fn start(config: config::AppConfig, backends: Backends) -> Result<Self, AppError> {
        tracing::info!("Starting session...");
        let mut notices = Vec::new();

        // 1. Resolve the viewer
        let viewer = match backends.identity.current_user().await {
            Ok(viewer) => viewer,
            Err(error) => {
                tracing::warn!(%error, "Could not resolve viewer; continuing signed out");
                notices.push(error.notice());
                None
            }
        };
        let viewer_id = viewer.as_ref().map(|user| user.id.clone());

        // 2. Initialize the profile cache
        let cache = Arc::new(data::ProfileCache::new(
            Duration::from_secs(config.cache.profile_ttl),
            config.cache.profile_max_items,
        ));
        let enricher = Arc::new(IdentityEnricher::new(backends.store.clone(), cache));

        // 3. Seed engagement state
        let engagement = Arc::new(EngagementTracker::new(
            backends.store.clone(),
            viewer_id.clone(),
        ));
        if let Err(error) = engagement.seed().await {
            notices.push(error.notice());
        }

        // 4. Wire the services
        let feed = Arc::new(FeedAssembler::new(
            backends.store.clone(),
            enricher.clone(),
            engagement.clone(),
            config.feed.post_batch_size,
        ));
        let statuses = StatusBoard::new(
            backends.store.clone(),
            enricher.clone(),
            engagement.clone(),
            service::system_clock(),
            config.feed.status_limit,
            config.feed.status_ttl_hours,
        );
        let composer = PostComposer::new(backends.store.clone(), feed.clone(), viewer.clone());
        let media = MediaUploader::new(
            backends.blobs.clone(),
            viewer_id.clone(),
            config.media.max_upload_bytes,
        );
        let profiles = ProfileService::new(backends.store.clone(), enricher);
        let notes = NoteBook::new(backends.store.clone(), viewer_id);
        let playback = backends.player.map(PlaybackCoordinator::new);

        tracing::info!(
            viewer = viewer.as_ref().map(|user| user.id.as_str()),
            seeded = engagement.is_seeded(),
            "Session started"
        );

        Ok(Self {
            config: Arc::new(config),
            viewer,
            identity: backends.identity,
            engagement,
            feed,
            statuses,
            composer,
            media,
            profiles,
            notes,
            playback,
            notices,
        })
    }

    pub fn viewer(&self) -> Option<&AuthUser> {
        self.viewer.as_ref()
    }

    /// Notices raised while starting
    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    /// Media coordinator, if the host can play media
    pub fn playback(&self) -> Option<&PlaybackCoordinator> {
        self.playback.as_ref()
    }

    /// Re-fetch the post feed
    pub async fn refresh_feed(&self, filter: MoodFilter) -> FeedRefresh {
        self.feed.refresh(filter).await
    }

    /// Like or unlike a post and update the shown feed
    pub async fn toggle_post_like(&self, post_id: &str) -> Result<LikeState, AppError> {
        let state = self.engagement.toggle_like(&SubjectRef::post(post_id)).await?;
        self.feed.apply_like(post_id, state.liked, state.like_count);
        Ok(state)
    }

    /// Follow or unfollow a user
    pub async fn toggle_follow(&self, user_id: &str) -> Result<bool, AppError> {
        self.engagement.toggle_follow(user_id).await
    }

    /// Tear the session down, dropping every cache
    pub fn end(self) {
        if let Some(playback) = &self.playback {
            playback.teardown();
        }
        self.engagement.clear();
        self.feed.clear();
        tracing::info!("Session ended");
    }

    /// Sign out and end the session
    ///
    /// The session ends even if the identity provider reports an error.
    pub async fn sign_out(self) -> Result<(), AppError> {
        let result = self.identity.sign_out().await;
        self.end();
        result
    }
}
