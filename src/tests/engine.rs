use std::sync::Arc;

use crate::colisten::config::{MusicConfig, PersistHouse};
use crate::colisten::connection::User;
use crate::colisten::house::{Order, PickError, PlayMode, VoteOutcome, now_ms};
use crate::colisten::music::MusicApi;
use crate::colisten::registry::Registry;
use crate::colisten::task::Dispatcher;

fn test_registry() -> Arc<Registry> {
    let dispatcher = Arc::new(Dispatcher::new(String::new()));
    let api = Arc::new(MusicApi::new(MusicConfig::default(), dispatcher));
    Registry::new(api)
}

fn order(id: &str, user: &str) -> Order {
    Order {
        source: "wy".to_owned(),
        id: id.to_owned(),
        user: User::new(user),
        likes: 0,
    }
}

#[actix_rt::test]
async fn rejects_duplicate_orders() {
    let registry = test_registry();
    let house = registry.create_house(None, "r".into(), String::new(), String::new(), false);

    assert!(house.add_order(order("1", "a")).await.is_ok());
    assert!(matches!(
        house.add_order(order("1", "b")).await,
        Err(PickError::Duplicate)
    ));

    // the current track also counts as queued
    house.skip(true).await;
    assert!(matches!(
        house.add_order(order("1", "b")).await,
        Err(PickError::Duplicate)
    ));
    assert!(house.add_order(order("2", "b")).await.is_ok());
}

#[actix_rt::test]
async fn caps_ephemeral_playlists_at_ten() {
    let registry = test_registry();
    let house = registry.create_house(None, "r".into(), String::new(), String::new(), false);

    for i in 0..10 {
        assert!(house.add_order(order(&i.to_string(), "a")).await.is_ok());
    }
    assert!(!house.can_order().await);
    assert!(matches!(
        house.add_order(order("10", "a")).await,
        Err(PickError::PlaylistFull)
    ));

    let ultimate = registry.create_house(
        Some("u".into()),
        "u".into(),
        String::new(),
        String::new(),
        true,
    );
    for i in 0..15 {
        assert!(ultimate.add_order(order(&i.to_string(), "a")).await.is_ok());
    }
    assert!(ultimate.can_order().await);
}

#[actix_rt::test]
async fn skip_pops_head_in_sequential_mode() {
    let registry = test_registry();
    let house = registry.create_house(None, "r".into(), String::new(), String::new(), false);

    house.add_order(order("1", "a")).await.unwrap();
    house.add_order(order("2", "a")).await.unwrap();

    house.skip(true).await;
    let (current, _) = house.current().await;
    assert_eq!(current.id, "1");
    assert_eq!(house.queued_ids().await, vec!["1".to_owned(), "2".to_owned()]);

    house.skip(true).await;
    let (current, _) = house.current().await;
    assert_eq!(current.id, "2");
    assert_eq!(house.queued_ids().await, vec!["2".to_owned()]);

    // nothing left to advance to, current stays
    house.skip(true).await;
    let (current, _) = house.current().await;
    assert_eq!(current.id, "2");
}

#[actix_rt::test]
async fn random_mode_picks_some_queued_track() {
    let registry = test_registry();
    let house = registry.create_house(None, "r".into(), String::new(), String::new(), false);
    house.set_mode(PlayMode::Random).await;

    for id in ["1", "2", "3"] {
        house.add_order(order(id, "a")).await.unwrap();
    }

    house.skip(true).await;
    let (current, _) = house.current().await;
    assert!(["1", "2", "3"].contains(&current.id.as_str()));
    assert_eq!(house.queued_ids().await.len(), 3);
}

#[actix_rt::test]
async fn vote_skip_advances_and_resets() {
    let registry = test_registry();
    let house = registry.create_house(None, "r".into(), String::new(), String::new(), false);

    house.add_order(order("1", "a")).await.unwrap();
    house.add_order(order("2", "a")).await.unwrap();
    house.skip(true).await;

    // an empty room needs a single vote
    match house.vote_skip(User::new("alice")).await {
        VoteOutcome::Passed(votes, required) => assert_eq!((votes, required), (1, 1)),
        _ => panic!("vote should have passed"),
    }

    let (current, _) = house.current().await;
    assert_eq!(current.id, "2");
    assert!(house.state.lock().await.vote_skip.is_empty());
}

#[actix_rt::test]
async fn repeated_votes_are_ignored() {
    let registry = test_registry();
    let house = registry.create_house(None, "r".into(), String::new(), String::new(), false);

    house
        .state
        .lock()
        .await
        .vote_skip
        .push(User::new("alice"));

    assert!(matches!(
        house.vote_skip(User::new("alice")).await,
        VoteOutcome::AlreadyVoted
    ));

    // same name with an email is a different person
    match house
        .vote_skip(User::with_email("alice".into(), "alice@example.com"))
        .await
    {
        VoteOutcome::AlreadyVoted => panic!("distinct identity should be a fresh vote"),
        _ => {}
    }
}

#[actix_rt::test]
async fn like_resorts_stably() {
    let registry = test_registry();
    let house = registry.create_house(None, "r".into(), String::new(), String::new(), false);

    for id in ["1", "2", "3"] {
        house.add_order(order(id, "a")).await.unwrap();
    }

    house.like(2).await.unwrap();
    {
        let state = house.state.lock().await;
        let ids: Vec<&str> = state.playlist.iter().map(|o| o.id.as_str()).collect();
        // the liked track leads, the zero-like tie keeps pick order
        assert_eq!(ids, ["2", "1", "3"]);
        assert_eq!(state.playlist[0].likes, 1);
    }

    house.like(3).await.unwrap();
    {
        let state = house.state.lock().await;
        let ids: Vec<&str> = state.playlist.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["2", "3", "1"]);
    }

    assert!(house.like(0).await.is_err());
    assert!(house.like(99).await.is_err());
}

#[actix_rt::test]
async fn idle_rooms_are_destroyed() {
    let registry = test_registry();
    let house = registry.create_house(None, "r".into(), String::new(), String::new(), false);

    house.state.lock().await.last_active = now_ms() - 6 * 60 * 1000;
    house.update(&registry).await;

    assert!(registry.get(&house.id).is_none());
    assert!(house.is_closed());
}

#[actix_rt::test]
async fn ultimate_rooms_survive_idling() {
    let registry = test_registry();
    let house = registry.create_house(
        Some("u".into()),
        "u".into(),
        String::new(),
        String::new(),
        true,
    );

    house.state.lock().await.last_active = now_ms() - 60 * 60 * 1000;
    house.update(&registry).await;

    assert!(registry.get("u").is_some());
    assert!(!house.is_closed());
}

#[actix_rt::test]
async fn bootstrap_creates_ultimate_rooms() {
    let registry = test_registry();
    registry.bootstrap(&[PersistHouse {
        id: "bhu".into(),
        name: "BHU 听歌房".into(),
        desc: String::new(),
        password: "bhubhu".into(),
    }]);

    let house = registry.get("bhu").expect("persisted room should exist");
    assert!(house.ultimate);
    assert_eq!(house.password, "bhubhu");
    assert!(house.limits.search.is_none());
}
