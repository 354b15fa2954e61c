use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, test, web};
use serde_json::{Value, json};

use crate::colisten::config::{Config, MusicConfig};
use crate::colisten::house::PlayMode;
use crate::colisten::music::MusicApi;
use crate::colisten::registry::Registry;
use crate::colisten::task::{Dispatcher, TaskResult};
use crate::routes;

fn state_with_token(token: &str) -> (Arc<Registry>, Arc<Dispatcher>) {
    let dispatcher = Arc::new(Dispatcher::new(token.to_owned()));
    let api = Arc::new(MusicApi::new(MusicConfig::default(), Arc::clone(&dispatcher)));
    (Registry::new(api), dispatcher)
}

fn state() -> (Arc<Registry>, Arc<Dispatcher>) {
    state_with_token("")
}

macro_rules! init_app {
    ($registry:expr, $dispatcher:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(Arc::clone($registry)))
                .app_data(web::Data::new(Arc::clone($dispatcher)))
                .app_data(web::Data::new(Config::default()))
                .configure(routes::configure),
        )
        .await
    };
}

#[actix_rt::test]
async fn create_enter_and_list_rooms() {
    let (registry, dispatcher) = state();
    let app = init_app!(&registry, &dispatcher);

    let req = test::TestRequest::post()
        .uri("/house/add")
        .set_json(json!({"name": "r", "desc": "", "needPwd": false, "password": ""}))
        .to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let id = created["houseId"].as_str().expect("houseId").to_owned();

    let req = test::TestRequest::post()
        .uri("/house/enter")
        .set_json(json!({"id": id, "password": ""}))
        .to_request();
    let entered: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(entered["houseId"], json!(id));

    let req = test::TestRequest::get().uri("/house/search").to_request();
    let listing: Value = test::call_and_read_body_json(&app, req).await;
    let entry = listing
        .as_array()
        .expect("array listing")
        .iter()
        .find(|e| e["id"] == json!(id))
        .expect("room should be listed");
    assert_eq!(entry["population"], json!(0));
    assert_eq!(entry["needPwd"], json!(false));
    assert_eq!(entry["ultimate"], json!(false));
}

#[actix_rt::test]
async fn enter_rejects_bad_credentials() {
    let (registry, dispatcher) = state();
    let app = init_app!(&registry, &dispatcher);

    let house = registry.create_house(None, "r".into(), String::new(), "pw".into(), false);

    let req = test::TestRequest::post()
        .uri("/house/enter")
        .set_json(json!({"id": house.id, "password": "wrong"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::post()
        .uri("/house/enter")
        .set_json(json!({"id": "missing", "password": ""}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_rt::test]
async fn needless_password_is_dropped_on_create() {
    let (registry, dispatcher) = state();
    let app = init_app!(&registry, &dispatcher);

    let req = test::TestRequest::post()
        .uri("/house/add")
        .set_json(json!({"name": "open", "desc": "", "needPwd": false, "password": "secret"}))
        .to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let id = created["houseId"].as_str().unwrap();

    let house = registry.get(id).unwrap();
    assert_eq!(house.password, "");
}

#[actix_rt::test]
async fn music_actions_resolve_the_room_first() {
    let (registry, dispatcher) = state();
    let app = init_app!(&registry, &dispatcher);

    let req = test::TestRequest::post()
        .uri("/music/playmode")
        .set_json(json!({"houseId": "missing", "password": "", "mode": "random"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    let house = registry.create_house(None, "r".into(), String::new(), String::new(), false);
    let req = test::TestRequest::post()
        .uri("/music/playmode")
        .set_json(json!({"houseId": house.id, "password": "", "mode": "random"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert_eq!(house.state.lock().await.mode, PlayMode::Random);
}

#[actix_rt::test]
async fn house_users_lists_the_roster() {
    let (registry, dispatcher) = state();
    let app = init_app!(&registry, &dispatcher);

    let house = registry.create_house(None, "r".into(), String::new(), String::new(), false);
    let req = test::TestRequest::post()
        .uri("/house/houseuser")
        .set_json(json!({"houseId": house.id, "password": ""}))
        .to_request();
    let roster: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(roster, json!([]));
}

// Task dispatcher core semantics

#[actix_rt::test]
async fn task_ids_are_distinct_and_ordered() {
    let (_, dispatcher) = state();
    let a = dispatcher.new_task("x", HashMap::new());
    let b = dispatcher.new_task("x", HashMap::new());
    assert_eq!(a.id, "1");
    assert_eq!(b.id, "2");
}

#[actix_rt::test]
async fn call_returns_the_matching_result() {
    let (_, dispatcher) = state();
    let task = dispatcher.new_task(
        "bilibili:get_music",
        HashMap::from([("bvid".to_owned(), "BV1xx".to_owned())]),
    );
    let id = task.id.clone();

    let worker = Arc::clone(&dispatcher);
    actix_rt::spawn(async move {
        let task = worker
            .poll(Duration::from_secs(5))
            .await
            .expect("task should arrive");
        worker.complete(TaskResult {
            id: task.id,
            success: true,
            result: json!({"url": "http://a/b.mp3"}),
            error: None,
        });
    });

    let result = dispatcher
        .call(task, Duration::from_secs(5))
        .await
        .expect("worker replied in time");
    assert_eq!(result.id, id);
    assert!(result.success);
    assert_eq!(result.result, json!({"url": "http://a/b.mp3"}));
}

#[actix_rt::test]
async fn call_times_out_without_a_worker() {
    let (_, dispatcher) = state();
    let task = dispatcher.new_task("bilibili:get_music", HashMap::new());
    assert!(
        dispatcher
            .call(task, Duration::from_millis(50))
            .await
            .is_none()
    );
}

#[actix_rt::test]
async fn stray_results_are_rejected() {
    let (_, dispatcher) = state();
    assert!(!dispatcher.complete(TaskResult {
        id: "999".into(),
        success: true,
        result: Value::Null,
        error: None,
    }));
}

#[actix_rt::test]
async fn token_and_version_gates() {
    let (_, secured) = state_with_token("secret");
    assert!(!secured.validate_token(None));
    assert!(!secured.validate_token(Some("secret")));
    assert!(!secured.validate_token(Some("Bearer wrong")));
    assert!(secured.validate_token(Some("Bearer secret")));

    let (_, open) = state();
    assert!(open.validate_token(None));

    assert!(open.version_supported("v0.0.2"));
    assert!(open.version_supported("0.1.0"));
    assert!(!open.version_supported("v0.0.1"));
    assert!(!open.version_supported(""));
}

// Long-poll surface

#[actix_rt::test]
async fn long_poll_round_trip() {
    let (registry, dispatcher) = state();
    let app = init_app!(&registry, &dispatcher);

    let task = dispatcher.new_task(
        "bilibili:get_music",
        HashMap::from([("bvid".to_owned(), "BV1xx".to_owned())]),
    );
    let caller = Arc::clone(&dispatcher);
    let pending = actix_rt::spawn(async move { caller.call(task, Duration::from_secs(5)).await });
    tokio::task::yield_now().await;

    let req = test::TestRequest::get()
        .uri("/tasks/poll?timeout=5")
        .insert_header(("Music-Let-Version", "v0.0.2"))
        .to_request();
    let polled: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(polled["type"], json!("bilibili:get_music"));
    assert_eq!(polled["payload"]["bvid"], json!("BV1xx"));

    let req = test::TestRequest::post()
        .uri("/tasks/result")
        .insert_header(("Music-Let-Version", "v0.0.2"))
        .set_json(json!({
            "id": polled["id"],
            "success": true,
            "result": {"url": "http://a/b.mp3"},
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let result = pending.await.unwrap().expect("call should resolve");
    assert_eq!(result.result, json!({"url": "http://a/b.mp3"}));
}

#[actix_rt::test]
async fn empty_poll_returns_no_content() {
    let (registry, dispatcher) = state();
    let app = init_app!(&registry, &dispatcher);

    let req = test::TestRequest::get()
        .uri("/tasks/poll?timeout=1")
        .insert_header(("Music-Let-Version", "v0.0.2"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);
}

#[actix_rt::test]
async fn submitting_an_unknown_task_is_a_404() {
    let (registry, dispatcher) = state();
    let app = init_app!(&registry, &dispatcher);

    let req = test::TestRequest::post()
        .uri("/tasks/result")
        .insert_header(("Music-Let-Version", "v0.0.2"))
        .set_json(json!({"id": "999", "success": true, "result": {}}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_rt::test]
async fn worker_endpoints_require_the_token() {
    let (registry, dispatcher) = state_with_token("secret");
    let app = init_app!(&registry, &dispatcher);

    let req = test::TestRequest::get()
        .uri("/tasks/poll?timeout=1")
        .insert_header(("Music-Let-Version", "v0.0.2"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::get()
        .uri("/tasks/poll?timeout=1")
        .insert_header(("Music-Let-Version", "v0.0.2"))
        .insert_header(("Authorization", "Bearer wrong"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}
