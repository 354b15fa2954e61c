use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::{Error as ActixError, HttpRequest, HttpResponse, Responder, get, post, web};
use actix_ws::AggregatedMessage;
use futures_util::FutureExt as _;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::colisten::command::{self, Caller, Context, HttpReply};
use crate::colisten::config::Config;
use crate::colisten::connection::{Connection, mask_ip};
use crate::colisten::house::House;
use crate::colisten::registry::Registry;
use crate::colisten::task::{Dispatcher, TaskResult};
use crate::colisten::value::Js;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(add_house)
        .service(enter_house)
        .service(search_houses)
        .service(house_users)
        .service(music_action)
        .service(poll_task)
        .service(submit_result)
        .service(server);
}

#[derive(Deserialize)]
struct AddHouse {
    name: String,
    #[serde(default)]
    desc: String,
    #[serde(default, rename = "needPwd")]
    need_pwd: bool,
    #[serde(default)]
    password: String,
}

#[post("/house/add")]
pub async fn add_house(
    web::Json(body): web::Json<AddHouse>,
    registry: web::Data<Arc<Registry>>,
) -> impl Responder {
    let password = if body.need_pwd { body.password } else { String::new() };
    let house = registry.create_house(None, body.name, body.desc, password, false);
    HttpResponse::Ok().json(json!({"houseId": house.id}))
}

#[derive(Deserialize)]
struct EnterHouse {
    id: String,
    #[serde(default)]
    password: String,
}

#[post("/house/enter")]
pub async fn enter_house(
    web::Json(body): web::Json<EnterHouse>,
    registry: web::Data<Arc<Registry>>,
) -> impl Responder {
    match resolve_house(&registry, &body.id, &body.password) {
        Ok(house) => HttpResponse::Ok().json(json!({"houseId": house.id})),
        Err(response) => response,
    }
}

#[get("/house/search")]
pub async fn search_houses(registry: web::Data<Arc<Registry>>) -> impl Responder {
    HttpResponse::Ok().json(registry.search().await)
}

#[derive(Deserialize)]
struct HouseAuth {
    #[serde(rename = "houseId")]
    house_id: String,
    #[serde(default)]
    password: String,
}

#[post("/house/houseuser")]
pub async fn house_users(
    web::Json(body): web::Json<HouseAuth>,
    registry: web::Data<Arc<Registry>>,
) -> impl Responder {
    match resolve_house(&registry, &body.house_id, &body.password) {
        Ok(house) => HttpResponse::Ok().json(house.snapshot_users().await),
        Err(response) => response,
    }
}

/// HTTP mirror of the WebSocket actions. The handler's reply to the initiator
/// becomes the response body.
#[post("/music/{action:.*}")]
pub async fn music_action(
    path: web::Path<String>,
    web::Json(body): web::Json<Value>,
    registry: web::Data<Arc<Registry>>,
) -> impl Responder {
    let action = format!("/music/{}", path.into_inner());
    let house_id = Js::new(&body).get("houseId").string();
    let password = Js::new(&body).get("password").string();
    let house = match resolve_house(&registry, &house_id, &password) {
        Ok(house) => house,
        Err(response) => return response,
    };

    let reply: HttpReply = Arc::new(Mutex::new(None));
    let c = Context {
        caller: Caller::Http(Arc::clone(&reply)),
        house,
        registry: Arc::clone(registry.get_ref()),
        data: body,
    };

    if !command::dispatch(&action, c).await {
        return HttpResponse::NotFound().json(json!({"error": "未知操作"}));
    }

    let reply = reply.lock().unwrap().take().unwrap_or_else(|| json!({}));
    HttpResponse::Ok().json(reply)
}

fn resolve_house(registry: &Registry, id: &str, password: &str) -> Result<Arc<House>, HttpResponse> {
    let Some(house) = registry.get(id) else {
        return Err(HttpResponse::NotFound().json(json!({"error": "房间不存在"})));
    };
    if house.password != password {
        return Err(HttpResponse::Unauthorized().json(json!({"error": "密码错误"})));
    }
    Ok(house)
}

#[derive(Deserialize)]
struct PollQuery {
    timeout: Option<u64>,
}

#[get("/tasks/poll")]
pub async fn poll_task(
    req: HttpRequest,
    query: web::Query<PollQuery>,
    dispatcher: web::Data<Arc<Dispatcher>>,
) -> impl Responder {
    if let Some(denied) = precheck(&req, &dispatcher).await {
        return denied;
    }

    let timeout = Duration::from_secs(query.timeout.unwrap_or(30));
    match dispatcher.poll(timeout).await {
        Some(task) => HttpResponse::Ok().json(task),
        None => HttpResponse::NoContent().finish(),
    }
}

#[post("/tasks/result")]
pub async fn submit_result(
    req: HttpRequest,
    web::Json(result): web::Json<TaskResult>,
    dispatcher: web::Data<Arc<Dispatcher>>,
) -> impl Responder {
    if let Some(denied) = precheck(&req, &dispatcher).await {
        return denied;
    }

    if dispatcher.complete(result) {
        HttpResponse::Ok().json(json!({"message": "结果已接收"}))
    } else {
        HttpResponse::NotFound().json(json!({"error": "未找到对应的任务"}))
    }
}

/// Token and version gate shared by the worker endpoints.
async fn precheck(req: &HttpRequest, dispatcher: &Dispatcher) -> Option<HttpResponse> {
    let auth = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());
    if !dispatcher.validate_token(auth) {
        return Some(HttpResponse::Unauthorized().json(json!({"error": "未授权"})));
    }

    let version = req
        .headers()
        .get("Music-Let-Version")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !dispatcher.version_supported(version) {
        // outdated workers retry in a tight loop, keep them waiting first
        tokio::time::sleep(Duration::from_secs(15)).await;
        return Some(HttpResponse::build(StatusCode::UPGRADE_REQUIRED).json(json!({
            "error": "客户端版本过低",
            "min_version": dispatcher.min_version().to_string(),
        })));
    }

    None
}

#[derive(Deserialize)]
struct ConnectQuery {
    #[serde(rename = "houseId", default)]
    house_id: String,
    #[serde(rename = "housePwd", default)]
    house_pwd: String,
}

/// WebSocket upgrade. One reader task per socket; each inbound frame is
/// handled in its own task so a slow or crashing handler can't wedge the
/// read loop.
#[get("/server")]
pub async fn server(
    req: HttpRequest,
    body: web::Payload,
    query: web::Query<ConnectQuery>,
    registry: web::Data<Arc<Registry>>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ActixError> {
    let Some(house) = registry.get(&query.house_id) else {
        return Ok(HttpResponse::NotFound().finish());
    };
    if house.password != query.house_pwd {
        return Ok(HttpResponse::NotFound().finish());
    }

    let (response, session, stream) = actix_ws::handle(&req, body)?;

    // max 128kb frames
    let mut stream = stream.max_frame_size(1024 * 128).aggregate_continuations();

    let ip = mask_ip(&req.peer_addr().map(|a| a.to_string()).unwrap_or_default());
    let conn = Connection::start(session.clone(), ip);

    debug!("[{}] listener {} connected", house.id, conn.ip);

    house.enter(&conn).await;

    let registry = Arc::clone(registry.get_ref());
    let debug_cmds = config.debug;
    let mut session = session;

    actix_rt::spawn(async move {
        while let Some(msg) = stream.recv().await {
            match msg {
                Ok(AggregatedMessage::Text(text)) => {
                    let Ok(frame) = serde_json::from_str::<Value>(&text) else {
                        continue;
                    };
                    let action = Js::new(&frame).get("action").string();
                    let data = Js::new(&frame).get("data").raw();

                    if debug_cmds {
                        debug!("cmd: {action} data: {data}");
                    }

                    let c = Context {
                        caller: Caller::WebSocket(Arc::clone(&conn)),
                        house: Arc::clone(&house),
                        registry: Arc::clone(&registry),
                        data,
                    };
                    actix_rt::spawn(async move {
                        match AssertUnwindSafe(command::dispatch(&action, c))
                            .catch_unwind()
                            .await
                        {
                            Ok(true) => {}
                            Ok(false) => warn!("unhandled action: {action}"),
                            Err(_) => error!("handler for {action} panicked"),
                        }
                    });
                }
                Ok(AggregatedMessage::Ping(bytes)) => {
                    if session.pong(&bytes).await.is_err() {
                        break;
                    }
                }
                Ok(AggregatedMessage::Close(_)) | Err(_) => break,
                _ => {}
            }
        }

        info!("[{}] listener {} disconnected", house.id, conn.ip);
        house.leave(&conn).await;
    });

    Ok(response)
}
