use serde_json::json;

use crate::colisten::channel;
use crate::colisten::connection::{User, mask_ip};
use crate::colisten::house::PlayMode;
use crate::colisten::limit::{ActionLimiter, HouseLimits};
use crate::colisten::recommend::Recommender;
use crate::colisten::semver::Version;
use crate::colisten::value::{Js, merge};

// IP masking

#[test]
fn masks_port_and_host_octets() {
    assert_eq!(mask_ip("203.0.113.7:52344"), "203.0.*.*");
    assert_eq!(mask_ip("192.0.0.1:80"), "192.0.*.*");
    assert_eq!(mask_ip("10.1.2.3"), "10.1.*.*");
}

// User identity

#[test]
fn email_hash_is_normalized() {
    let a = User::with_email("bob".into(), " Test@Example.COM ");
    let b = User::with_email("bob".into(), "test@example.com");
    assert_eq!(a, b);

    let hash = a.email.expect("email hash should be set");
    assert_eq!(hash.len(), 32);
    assert!(
        hash.chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    );
}

#[test]
fn empty_email_yields_anonymous_identity() {
    let user = User::with_email("bob".into(), "   ");
    assert_eq!(user.email, None);

    // same name, different identity once one has an email
    let named = User::with_email("bob".into(), "bob@example.com");
    assert_ne!(user, named);
}

// Semver gate

#[test]
fn parses_version_strings() {
    assert_eq!(
        Version::parse("v1.2.3"),
        Version {
            major: 1,
            minor: 2,
            patch: 3
        }
    );
    assert_eq!(
        Version::parse("1.2.3"),
        Version {
            major: 1,
            minor: 2,
            patch: 3
        }
    );
    assert_eq!(Version::parse("1.2"), Version::default());
    assert_eq!(Version::parse("garbage"), Version::default());
    assert_eq!(Version::parse("v1.2.3").to_string(), "v1.2.3");
}

#[test]
fn compares_versions_by_component() {
    assert!(Version::parse("v0.0.2") >= Version::parse("v0.0.2"));
    assert!(Version::parse("v0.0.3") >= Version::parse("v0.0.2"));
    assert!(Version::parse("v0.1.0") >= Version::parse("v0.0.9"));
    assert!(Version::parse("v2.0.0") >= Version::parse("v1.9.9"));
    assert!(Version::parse("v0.0.1") < Version::parse("v0.0.2"));
}

// Dynamic JSON access

#[test]
fn walks_json_paths() {
    let doc = json!({
        "data": {
            "source": "wy",
            "pageIndex": "2",
            "songs": [{"id": 42, "name": "foo"}],
        },
    });
    let js = Js::new(&doc);

    assert_eq!(js.get("data.source").string(), "wy");
    assert_eq!(js.get("data.pageIndex").int(), 2);
    assert_eq!(js.get("data.songs.0.id").int(), 42);
    assert_eq!(js.get("data.songs.0.id").string(), "42");
    assert_eq!(js.get("data.songs.0.name").string(), "foo");
    assert_eq!(js.get("data.missing.deep").string(), "");
    assert!(!js.get("data.missing").exists());

    let mut ids = Vec::new();
    js.get("data.songs").each(|song| ids.push(song.get("id").int()));
    assert_eq!(ids, vec![42]);
}

#[test]
fn merge_overrides_left_with_right() {
    let merged = merge(json!({"a": 1, "b": 1}), json!({"b": 2, "pushTime": 123}));
    assert_eq!(merged, json!({"a": 1, "b": 2, "pushTime": 123}));
}

// Play mode strings

#[test]
fn parses_known_play_modes_only() {
    assert_eq!(PlayMode::parse("sequential"), Some(PlayMode::Sequential));
    assert_eq!(PlayMode::parse("random"), Some(PlayMode::Random));
    assert_eq!(PlayMode::parse("shuffle"), None);
    assert_eq!(PlayMode::parse(""), None);
}

// Rate limiting

#[test]
fn order_limiter_allows_five_per_minute() {
    let limiter = ActionLimiter::per_minute(5);
    for _ in 0..5 {
        assert!(limiter.allow());
    }
    assert!(!limiter.allow());
}

#[test]
fn ultimate_rooms_skip_the_search_limiter() {
    let limits = HouseLimits::new(true);
    assert!(limits.search.is_none());

    let limits = HouseLimits::new(false);
    assert!(limits.search.is_some());
}

#[actix_rt::test]
async fn search_wait_returns_when_tokens_remain() {
    let limiter = ActionLimiter::per_minute(10);
    // plenty of budget, must not block the caller
    limiter.wait().await;
    limiter.wait().await;
}

// Recommender bookkeeping

#[test]
fn recommender_enables_after_three_distinct_tracks() {
    let rec = Recommender::new();
    rec.add_history("1");
    rec.add_history("2");
    rec.add_history("2"); // duplicate, must not count
    rec.add_history("");
    assert!(!rec.enabled());

    rec.add_history("3");
    assert!(rec.enabled());
}

// Unbounded channel

#[actix_rt::test]
async fn channel_preserves_fifo_past_capacity() {
    let (tx, mut rx) = channel::unbounded::<u32>(4);
    for i in 0..100 {
        tx.send(i).await;
    }
    for i in 0..100 {
        assert_eq!(rx.recv().await, Some(i));
    }
}

#[actix_rt::test]
async fn channel_close_drains_then_ends() {
    let (tx, mut rx) = channel::unbounded::<u32>(2);
    for i in 0..10 {
        tx.send(i).await;
    }
    tx.close();
    assert!(tx.is_closed());

    for i in 0..10 {
        assert_eq!(rx.recv().await, Some(i));
    }
    assert_eq!(rx.recv().await, None);
}

#[actix_rt::test]
async fn channel_drops_sends_after_close() {
    let (tx, mut rx) = channel::unbounded::<u32>(2);
    tx.send(1).await;
    tx.close();
    tx.send(2).await;

    assert_eq!(rx.recv().await, Some(1));
    assert_eq!(rx.recv().await, None);
}
