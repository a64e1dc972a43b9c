//! Session lifecycle, composing and playback

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{PostRow, StatusRow, TestSession};
use mockall::mock;
use moodfeed::auth::{AuthUser, IdentityProvider};
use moodfeed::data::{MediaKind, Mood, MoodFilter, StoreOp, Table};
use moodfeed::error::AppError;
use moodfeed::service::{MediaElement, MediaElementFactory, PlaybackChange, PostDraft};

mock! {
    pub Identity {}

    #[async_trait]
    impl IdentityProvider for Identity {
        async fn current_user(&self) -> Result<Option<AuthUser>, AppError>;
        async fn sign_out(&self) -> Result<(), AppError>;
    }
}

fn user(id: &str) -> AuthUser {
    AuthUser {
        id: id.to_string(),
        email: Some(format!("{id}@example.com")),
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn identity_failure_starts_signed_out_with_notice() {
    let mut identity = MockIdentity::new();
    identity
        .expect_current_user()
        .times(1)
        .returning(|| Err(AppError::Remote("auth down".to_string())));

    let t = TestSession::with_identity(Arc::new(identity))
        .post(PostRow::new("p", "u1"))
        .await
        .start()
        .await;

    assert!(t.session.viewer().is_none());
    assert_eq!(t.session.notices().len(), 1);
    assert_eq!(t.session.refresh_feed(MoodFilter::All).await.listing.len(), 1);
}

#[tokio::test]
async fn seeding_failure_is_reported_and_checked_later() {
    let mut identity = MockIdentity::new();
    identity
        .expect_current_user()
        .returning(|| Ok(Some(user("v"))));

    let t = TestSession::with_identity(Arc::new(identity))
        .failing(Table::UserFollows, StoreOp::Select)
        .start()
        .await;

    assert_eq!(t.session.viewer().map(|u| u.id.as_str()), Some("v"));
    assert_eq!(t.session.notices().len(), 1);
    assert!(!t.session.engagement.is_seeded());

    t.store.recover();
    assert!(!t.session.engagement.probe_follow("u1").await.unwrap());
    assert_eq!(t.store.call_count(StoreOp::Count, Table::UserFollows), 1);
}

#[tokio::test]
async fn sign_out_ends_the_session() {
    let mut identity = MockIdentity::new();
    identity
        .expect_current_user()
        .returning(|| Ok(Some(user("v"))));
    identity.expect_sign_out().times(1).returning(|| Ok(()));

    let t = TestSession::with_identity(Arc::new(identity))
        .post(PostRow::new("p", "u1"))
        .await
        .start()
        .await;
    let feed = t.session.feed.clone();
    let engagement = t.session.engagement.clone();
    t.session.refresh_feed(MoodFilter::All).await;
    t.session.toggle_follow("u1").await.unwrap();

    t.session.sign_out().await.unwrap();

    assert!(feed.current().is_empty());
    assert!(!engagement.is_following("u1"));
    assert!(!engagement.is_seeded());
}

#[tokio::test]
async fn sign_out_error_still_ends_the_session() {
    let mut identity = MockIdentity::new();
    identity
        .expect_current_user()
        .returning(|| Ok(Some(user("v"))));
    identity
        .expect_sign_out()
        .returning(|| Err(AppError::Remote("offline".to_string())));

    let t = TestSession::with_identity(Arc::new(identity)).start().await;
    let engagement = t.session.engagement.clone();

    assert!(t.session.sign_out().await.is_err());
    assert!(!engagement.is_seeded());
}

// =============================================================================
// Composing
// =============================================================================

#[tokio::test]
async fn published_post_is_prepended_with_fallback_name() {
    let t = TestSession::signed_in("alice")
        .post(PostRow::new("older", "u1").minutes_ago(10))
        .await
        .start()
        .await;
    t.session.refresh_feed(MoodFilter::All).await;

    let draft = PostDraft::new("  first light  ", Mood::parse("hopeful").unwrap()).at("Lisbon");
    let (post, display) = t.session.composer.publish(draft).await.unwrap();

    assert_eq!(post.content, "first light");
    assert_eq!(post.color, "bg-yellow-100");
    assert_eq!(display.location.as_deref(), Some("Lisbon"));
    assert_eq!(
        display.author.as_ref().map(|a| a.name.as_str()),
        Some("alice")
    );
    let ids: Vec<_> = t.session.feed.current().into_iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![post.id.clone(), "older".to_string()]);
}

#[tokio::test]
async fn anonymous_post_keeps_owner_but_hides_author() {
    let t = TestSession::signed_in("alice").start().await;

    let draft = PostDraft::new("quiet", Mood::parse("lost").unwrap()).anonymous();
    let (post, display) = t.session.composer.publish(draft).await.unwrap();

    assert_eq!(post.user_id, "alice");
    assert!(display.author.is_none());

    let listing = t.session.refresh_feed(MoodFilter::All).await.listing;
    assert!(listing.items[0].author.is_none());
}

#[tokio::test]
async fn failed_publish_leaves_the_feed_alone() {
    let t = TestSession::signed_in("alice")
        .post(PostRow::new("older", "u1"))
        .await
        .start()
        .await;
    t.session.refresh_feed(MoodFilter::All).await;
    t.store.fail_on(Table::Posts, StoreOp::Insert);

    let result = t
        .session
        .composer
        .publish(PostDraft::new("hi", Mood::parse("joy").unwrap()))
        .await;

    assert!(result.is_err());
    assert_eq!(t.session.feed.current().len(), 1);
}

#[tokio::test]
async fn empty_post_is_rejected_before_any_call() {
    let t = TestSession::signed_in("alice").start().await;

    let result = t
        .session
        .composer
        .publish(PostDraft::new("   ", Mood::parse("joy").unwrap()))
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(t.store.total_calls(), 0);
}

#[tokio::test]
async fn uploaded_media_is_attached_to_the_post() {
    let t = TestSession::signed_in("alice").start().await;

    let media = t
        .session
        .media
        .upload("beach.png", "image/png", vec![1, 2, 3])
        .await
        .unwrap();
    assert_eq!(media.kind, MediaKind::Image);
    assert_eq!(t.blobs.len(), 1);

    let draft = PostDraft::new("waves", Mood::parse("peaceful").unwrap()).with_media(media.clone());
    let (post, display) = t.session.composer.publish(draft).await.unwrap();

    assert_eq!(post.media(), Some(media.clone()));
    assert_eq!(display.media, Some(media));
}

#[tokio::test]
async fn unsupported_media_is_not_uploaded() {
    let t = TestSession::signed_in("alice").start().await;

    let result = t
        .session
        .media
        .upload("notes.pdf", "application/pdf", vec![0; 8])
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert!(t.blobs.is_empty());
}

// =============================================================================
// Playback
// =============================================================================

#[derive(Default)]
struct Element {
    playing: bool,
    position: u32,
}

struct SharedElement(Arc<Mutex<Element>>);

impl MediaElement for SharedElement {
    fn play(&mut self) -> Result<(), AppError> {
        let mut element = self.0.lock().unwrap();
        element.playing = true;
        element.position = 12;
        Ok(())
    }

    fn pause(&mut self) {
        self.0.lock().unwrap().playing = false;
    }

    fn rewind(&mut self) {
        self.0.lock().unwrap().position = 0;
    }
}

#[derive(Default)]
struct Player {
    elements: Mutex<HashMap<String, Arc<Mutex<Element>>>>,
}

impl Player {
    fn state(&self, url: &str) -> (bool, u32) {
        let elements = self.elements.lock().unwrap();
        let element = elements[url].lock().unwrap();
        (element.playing, element.position)
    }
}

impl MediaElementFactory for Player {
    fn create(&self, url: &str) -> Result<Box<dyn MediaElement>, AppError> {
        let element = Arc::new(Mutex::new(Element::default()));
        self.elements
            .lock()
            .unwrap()
            .insert(url.to_string(), element.clone());
        Ok(Box::new(SharedElement(element)))
    }
}

#[tokio::test]
async fn starting_b_pauses_and_rewinds_a() {
    let player = Arc::new(Player::default());
    let t = TestSession::signed_in("v")
        .status(StatusRow::active("a", "u1").audio("https://cdn/a.mp3"))
        .await
        .status(StatusRow::active("b", "u2").audio("https://cdn/b.mp3"))
        .await
        .player(player.clone())
        .start()
        .await;

    let statuses = t.session.statuses.list_active_statuses().await.items;
    let url = |id: &str| {
        statuses
            .iter()
            .find(|status| status.id == id)
            .and_then(|status| status.audio_url.clone())
            .unwrap()
    };
    let playback = t.session.playback().expect("player configured");

    playback.toggle("a", &url("a")).unwrap();
    let change = playback.toggle("b", &url("b")).unwrap();

    assert_eq!(
        change,
        PlaybackChange::Started {
            id: "b".to_string(),
            stopped: Some("a".to_string())
        }
    );
    assert_eq!(player.state("https://cdn/a.mp3"), (false, 0));
    assert_eq!(player.state("https://cdn/b.mp3"), (true, 12));
    assert_eq!(playback.playing().as_deref(), Some("b"));
}

#[tokio::test]
async fn ending_the_session_stops_playback() {
    let player = Arc::new(Player::default());
    let t = TestSession::signed_in("v")
        .player(player.clone())
        .start()
        .await;

    t.session
        .playback()
        .unwrap()
        .toggle("a", "https://cdn/a.mp3")
        .unwrap();
    t.session.end();

    assert_eq!(player.state("https://cdn/a.mp3"), (false, 0));
}

#[tokio::test]
async fn headless_sessions_have_no_playback() {
    let t = TestSession::anonymous().start().await;
    assert!(t.session.playback().is_none());
}
