//! Feed assembly through a running session

mod common;

use common::{PostRow, TestSession};
use moodfeed::data::{Mood, MoodFilter, StoreOp, Table};
use moodfeed::error::Severity;
use moodfeed::service::UNKNOWN_USER;

#[tokio::test]
async fn anonymous_posts_carry_no_author() {
    let t = TestSession::signed_in("viewer")
        .profile("u1", Some("Alice"))
        .await
        .post(PostRow::new("p1", "u1").anonymous())
        .await
        .start()
        .await;

    let refresh = t.session.refresh_feed(MoodFilter::All).await;
    let post = &refresh.listing.items[0];

    assert!(post.is_anonymous());
    assert!(post.author.is_none());
    let json = serde_json::to_string(post).unwrap();
    assert!(!json.contains("u1"));
    assert!(!json.contains("Alice"));
}

#[tokio::test]
async fn public_posts_show_profile_name_or_placeholder() {
    let t = TestSession::signed_in("viewer")
        .profile("u1", Some("Alice"))
        .await
        .profile("u3", None)
        .await
        .post(PostRow::new("p1", "u1").minutes_ago(1))
        .await
        .post(PostRow::new("p2", "u2").minutes_ago(2))
        .await
        .post(PostRow::new("p3", "u3").minutes_ago(3))
        .await
        .start()
        .await;

    let listing = t.session.refresh_feed(MoodFilter::All).await.listing;
    let names: Vec<_> = listing
        .items
        .iter()
        .map(|post| post.author.as_ref().map(|author| author.name.as_str()))
        .collect();

    assert_eq!(names, vec![Some("Alice"), Some(UNKNOWN_USER), Some(UNKNOWN_USER)]);
    assert!(listing.notice.is_none());
}

#[tokio::test]
async fn failed_profile_lookup_yields_placeholder_and_notice() {
    let t = TestSession::signed_in("viewer")
        .post(PostRow::new("p1", "u1").anonymous().minutes_ago(1))
        .await
        .post(PostRow::new("p2", "u2").minutes_ago(2))
        .await
        .start()
        .await;
    t.store.fail_on(Table::Profiles, StoreOp::Select);

    let listing = t.session.refresh_feed(MoodFilter::All).await.listing;

    assert_eq!(listing.len(), 2);
    assert_eq!(listing.items[0].id, "p1");
    assert!(listing.items[0].author.is_none());
    assert_eq!(listing.items[1].id, "p2");
    assert_eq!(
        listing.items[1].author.as_ref().map(|a| a.name.as_str()),
        Some(UNKNOWN_USER)
    );
    assert_eq!(
        listing.notice.map(|notice| notice.severity),
        Some(Severity::Error)
    );
}

#[tokio::test]
async fn identities_are_fetched_once_per_render() {
    let t = TestSession::signed_in("viewer")
        .profile("u1", Some("Alice"))
        .await
        .post(PostRow::new("p1", "u1"))
        .await
        .post(PostRow::new("p2", "u1"))
        .await
        .post(PostRow::new("p3", "u2"))
        .await
        .start()
        .await;

    t.session.refresh_feed(MoodFilter::All).await;
    assert_eq!(t.store.call_count(StoreOp::Select, Table::Profiles), 1);

    // u1 is cached now; only u2 is still missing.
    t.session.refresh_feed(MoodFilter::All).await;
    assert_eq!(t.store.call_count(StoreOp::Select, Table::Profiles), 2);
}

#[tokio::test]
async fn mood_filter_narrows_the_feed() {
    let t = TestSession::anonymous()
        .post(PostRow::new("p1", "u1").mood("joy"))
        .await
        .post(PostRow::new("p2", "u1").mood("melancholy"))
        .await
        .start()
        .await;

    let filter = MoodFilter::Only(Mood::parse("melancholy").unwrap());
    let listing = t.session.refresh_feed(filter.clone()).await.listing;

    assert_eq!(listing.len(), 1);
    assert_eq!(listing.items[0].id, "p2");
    assert_eq!(t.session.feed.filtered(&filter).len(), 1);
}

#[tokio::test]
async fn failed_post_fetch_returns_empty_listing_with_notice() {
    let t = TestSession::anonymous()
        .post(PostRow::new("p1", "u1"))
        .await
        .start()
        .await;
    t.store.fail_on(Table::Posts, StoreOp::Select);

    let listing = t.session.refresh_feed(MoodFilter::All).await.listing;

    assert!(listing.is_empty());
    assert!(listing.notice.is_some());
}

#[tokio::test]
async fn feed_is_newest_first() {
    let t = TestSession::anonymous()
        .post(PostRow::new("old", "u1").minutes_ago(90))
        .await
        .post(PostRow::new("new", "u1").minutes_ago(1))
        .await
        .post(PostRow::new("mid", "u1").minutes_ago(30))
        .await
        .start()
        .await;

    let ids: Vec<_> = t
        .session
        .refresh_feed(MoodFilter::All)
        .await
        .listing
        .items
        .into_iter()
        .map(|post| post.id)
        .collect();

    assert_eq!(ids, vec!["new", "mid", "old"]);
}
