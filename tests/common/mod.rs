//! Common test utilities for session tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use moodfeed::auth::{IdentityProvider, StaticIdentity};
use moodfeed::data::{MemoryStore, Row, StoreOp, Table};
use moodfeed::service::MediaElementFactory;
use moodfeed::storage::MemoryBlobStore;
use moodfeed::{Backends, Session, config};
use serde_json::json;

/// Session wired to in-process backends
pub struct TestSession {
    pub session: Session,
    pub store: Arc<MemoryStore>,
    pub blobs: Arc<MemoryBlobStore>,
}

/// Seeds rows before the session starts, then starts it
pub struct TestSessionBuilder {
    store: Arc<MemoryStore>,
    blobs: Arc<MemoryBlobStore>,
    identity: Arc<dyn IdentityProvider>,
    player: Option<Arc<dyn MediaElementFactory>>,
}

impl TestSession {
    /// Session for a signed-in viewer
    pub fn signed_in(viewer_id: &str) -> TestSessionBuilder {
        let email = format!("{viewer_id}@example.com");
        TestSessionBuilder::new(Arc::new(StaticIdentity::signed_in(viewer_id, Some(&email))))
    }

    /// Session without a viewer
    pub fn anonymous() -> TestSessionBuilder {
        TestSessionBuilder::new(Arc::new(StaticIdentity::anonymous()))
    }

    /// Session with a custom identity provider
    pub fn with_identity(identity: Arc<dyn IdentityProvider>) -> TestSessionBuilder {
        TestSessionBuilder::new(identity)
    }
}

impl TestSessionBuilder {
    fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            blobs: Arc::new(MemoryBlobStore::default()),
            identity,
            player: None,
        }
    }

    pub fn player(mut self, player: Arc<dyn MediaElementFactory>) -> Self {
        self.player = Some(player);
        self
    }

    /// Make `op` on `table` fail from the start
    pub fn failing(self, table: Table, op: StoreOp) -> Self {
        self.store.fail_on(table, op);
        self
    }

    pub async fn profile(self, id: &str, username: Option<&str>) -> Self {
        self.store
            .seed(
                Table::Profiles,
                vec![row(json!({ "id": id, "username": username, "avatar_url": null }))],
            )
            .await;
        self
    }

    pub async fn post(self, post: PostRow<'_>) -> Self {
        self.store.seed(Table::Posts, vec![post.into_row()]).await;
        self
    }

    pub async fn status(self, status: StatusRow<'_>) -> Self {
        self.store
            .seed(Table::StatusUpdates, vec![status.into_row()])
            .await;
        self
    }

    pub async fn rows(self, table: Table, rows: Vec<Row>) -> Self {
        self.store.seed(table, rows).await;
        self
    }

    /// Start the session; recorded store calls are reset afterwards
    pub async fn start(self) -> TestSession {
        let backends = Backends {
            store: self.store.clone(),
            blobs: self.blobs.clone(),
            identity: self.identity,
            player: self.player,
        };
        let session = Session::start(test_config(), backends)
            .await
            .expect("session should start");
        self.store.reset_calls();

        TestSession {
            session,
            store: self.store,
            blobs: self.blobs,
        }
    }
}

/// Post row as stored remotely
pub struct PostRow<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub mood: &'a str,
    pub is_anonymous: bool,
    pub like_count: i64,
    pub created_at: DateTime<Utc>,
}

impl<'a> PostRow<'a> {
    pub fn new(id: &'a str, user_id: &'a str) -> Self {
        Self {
            id,
            user_id,
            mood: "joy",
            is_anonymous: false,
            like_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn anonymous(mut self) -> Self {
        self.is_anonymous = true;
        self
    }

    pub fn mood(mut self, mood: &'a str) -> Self {
        self.mood = mood;
        self
    }

    pub fn likes(mut self, like_count: i64) -> Self {
        self.like_count = like_count;
        self
    }

    pub fn minutes_ago(mut self, minutes: i64) -> Self {
        self.created_at = Utc::now() - Duration::minutes(minutes);
        self
    }

    fn into_row(self) -> Row {
        row(json!({
            "id": self.id,
            "content": format!("post {}", self.id),
            "mood": self.mood,
            "color": "bg-yellow-100",
            "is_anonymous": self.is_anonymous,
            "location": null,
            "media_url": null,
            "media_type": null,
            "user_id": self.user_id,
            "created_at": self.created_at.to_rfc3339(),
            "like_count": self.like_count,
        }))
    }
}

/// Status row as stored remotely
pub struct StatusRow<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub audio_url: Option<&'a str>,
}

impl<'a> StatusRow<'a> {
    /// Status created an hour ago, expiring in 23 hours
    pub fn active(id: &'a str, user_id: &'a str) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            created_at: now - Duration::hours(1),
            expires_at: now + Duration::hours(23),
            audio_url: None,
        }
    }

    /// Status that expired a minute ago
    pub fn expired(id: &'a str, user_id: &'a str) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            created_at: now - Duration::hours(24) - Duration::minutes(1),
            expires_at: now - Duration::minutes(1),
            audio_url: None,
        }
    }

    pub fn expiring_in(mut self, duration: Duration) -> Self {
        self.expires_at = Utc::now() + duration;
        self
    }

    pub fn audio(mut self, url: &'a str) -> Self {
        self.audio_url = Some(url);
        self
    }

    fn into_row(self) -> Row {
        row(json!({
            "id": self.id,
            "content": "hi",
            "mood": "joy",
            "color": "bg-yellow-100",
            "emoji": null,
            "audio_url": self.audio_url,
            "user_id": self.user_id,
            "created_at": self.created_at.to_rfc3339(),
            "expires_at": self.expires_at.to_rfc3339(),
            "like_count": 0,
        }))
    }
}

pub fn row(value: serde_json::Value) -> Row {
    serde_json::from_value(value).expect("row must be a JSON object")
}

/// Configuration pointing at a local backend; only limits and TTLs matter
pub fn test_config() -> config::AppConfig {
    config::AppConfig {
        backend: config::BackendConfig {
            url: "http://localhost:54321".to_string(),
            api_key: "test-anon-key".to_string(),
            access_token: None,
        },
        storage: config::StorageConfig {
            backend: config::StorageBackend::Rest,
            bucket: "media".to_string(),
            public_url: None,
            s3: config::S3Config::default(),
        },
        feed: config::FeedConfig {
            post_batch_size: None,
            status_limit: 20,
            status_ttl_hours: 24,
        },
        media: config::MediaConfig {
            max_upload_bytes: config::DEFAULT_MAX_UPLOAD_BYTES,
        },
        cache: config::CacheConfig {
            profile_ttl: 300,
            profile_max_items: 1_000,
        },
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}
