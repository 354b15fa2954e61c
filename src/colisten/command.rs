use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use super::connection::{Connection, User};
use super::house::{House, Order, PickError, PlayMode, VoteOutcome, now_ms};
use super::music::SearchOption;
use super::registry::Registry;
use super::value::{Js, merge};

/// Where a command came from. HTTP mirrors most WebSocket actions; replies to
/// an HTTP caller are collected into the response body instead of a socket.
pub enum Caller {
    WebSocket(Arc<Connection>),
    Http(HttpReply),
}

pub type HttpReply = Arc<Mutex<Option<Value>>>;

pub struct Context {
    pub caller: Caller,
    pub house: Arc<House>,
    pub registry: Arc<Registry>,
    pub data: Value,
}

impl Context {
    pub fn get(&self, path: &str) -> Js<'_> {
        Js::new(&self.data).get(path)
    }

    pub fn is_websocket(&self) -> bool {
        matches!(self.caller, Caller::WebSocket(_))
    }

    pub fn is_http(&self) -> bool {
        matches!(self.caller, Caller::Http(_))
    }

    /// The acting user: the connection's identity over WebSocket, or whatever
    /// the request body declares over HTTP.
    pub fn user(&self) -> User {
        match &self.caller {
            Caller::WebSocket(conn) => conn.user(),
            Caller::Http(_) => {
                User::with_email(self.get("nickName").string(), &self.get("email").string())
            }
        }
    }

    fn nick_name(&self) -> String {
        match &self.caller {
            Caller::WebSocket(conn) => conn.display_name(),
            Caller::Http(_) => {
                let name = self.get("nickName").string();
                if name.is_empty() { "匿名".to_owned() } else { name }
            }
        }
    }

    /// Replies to the initiator only.
    pub async fn send(&self, j: Value) {
        match &self.caller {
            Caller::WebSocket(conn) => conn.send(&j).await,
            Caller::Http(reply) => *reply.lock().unwrap() = Some(j),
        }
    }

    /// Broadcasts a chat line spoken by the acting user.
    pub async fn chat(&self, content: &str) {
        self.house
            .broadcast(&json!({
                "type": "chat",
                "nickName": self.nick_name(),
                "sendTime": now_ms(),
                "content": content,
            }))
            .await;
    }

    /// Out-of-band notice to the initiator only, never broadcast.
    pub async fn info(&self, content: &str) {
        self.send(json!({
            "type": "info/push",
            "content": content,
            "sendTime": now_ms(),
        }))
        .await;
    }
}

/// Routes an inbound frame's action to its handler. `false` for unknown
/// actions, so the transport can log them.
pub async fn dispatch(action: &str, c: Context) -> bool {
    match action {
        "/chat" => chat(c).await,
        "/setting/user" => set_user(c).await,
        "/setting/pull" => pull_setting(c).await,
        "/music/search" => search_music(c).await,
        "/music/pick" => pick_music(c).await,
        "/music/delete" => delete_music(c).await,
        "/music/good" => good_music(c).await,
        "/music/skip/vote" => vote_skip(c).await,
        "/music/searchsonglist" => search_songlist(c).await,
        "/music/playmode" => play_mode(c).await,
        "/music/sync" => sync_music(c).await,
        "/music/playlist" => get_playlist(c).await,
        "/music/recommend" => recommend_music(c).await,
        "/house/houseuser" => house_user(c).await,
        _ => return false,
    }
    true
}

async fn chat(c: Context) {
    c.house
        .broadcast(&json!({
            "type": "chat",
            "nickName": c.nick_name(),
            "sendTime": c.get("sendTime").int(),
            "content": c.get("content").string(),
        }))
        .await;
}

async fn set_user(c: Context) {
    let Caller::WebSocket(conn) = &c.caller else {
        return;
    };
    conn.set_user(User::with_email(
        c.get("name").string(),
        &c.get("email").string(),
    ));

    // round-trip estimate against the client's send stamp
    let delay = c.get("sendTime").int() - now_ms();
    conn.send(&json!({"type": "delay", "delay": delay})).await;

    let users = c.house.snapshot_users().await;
    c.house
        .broadcast(&json!({"type": "house_user", "data": users}))
        .await;
}

async fn pull_setting(c: Context) {
    let user = c.user();
    c.send(json!({
        "type": "setting/push",
        "data": {
            "name": user.name,
            "email": user.email.unwrap_or_default(),
        },
    }))
    .await;
}

async fn search_music(c: Context) {
    if let Some(limiter) = &c.house.limits.search {
        limiter.wait().await;
    }

    let name = c.get("name").string();
    let mut o = SearchOption {
        id: String::new(),
        source: c.get("source").string(),
        keyword: name.clone(),
        page: c.get("pageIndex").int(),
        page_size: c.get("pageSize").int(),
    };

    // a leading star means "open this playlist id" instead of a keyword search
    let r = match name.strip_prefix('*') {
        Some(list_id) => {
            o.id = list_id.to_owned();
            c.house.api().get_song_list(&o).await
        }
        None => c.house.api().search_music(&o).await,
    };

    c.send(json!({"type": "search", "data": r.data, "totalSize": r.total}))
        .await;
}

async fn search_songlist(c: Context) {
    let r = c
        .house
        .api()
        .search_playlist(&SearchOption {
            id: String::new(),
            source: c.get("source").string(),
            keyword: c.get("name").string(),
            page: c.get("pageIndex").int(),
            page_size: c.get("pageSize").int(),
        })
        .await;

    c.send(json!({"type": "searchlist", "data": r.data, "totalSize": r.total}))
        .await;
}

async fn pick_music(c: Context) {
    if !c.house.limits.order.allow() {
        c.info("点歌太频繁").await;
        return;
    }
    if !c.house.can_order().await {
        c.info("最多点10首歌").await;
        return;
    }

    let mut id = c.get("id").string();
    let mut source = c.get("source").string();
    let name = c.get("name").string();
    if source.is_empty() {
        source = "wy".to_owned();
    }

    if id.is_empty() && name.starts_with("BV") {
        // a bare BV id goes through the bilibili worker
        source = "db".to_owned();
        id = name.clone();
    } else if id.is_empty() {
        let r = c
            .house
            .api()
            .search_music(&SearchOption {
                id: String::new(),
                source: source.clone(),
                keyword: name.clone(),
                page: 1,
                page_size: 10,
            })
            .await;
        match r.data.first() {
            Some(hit) => id = hit.id.clone(),
            None => {
                c.info("无法获取歌曲信息").await;
                return;
            }
        }
    }

    let m = c.house.api().get_music(&source, &id, true).await;
    let m = Js::new(&m);
    if m.get("url").string().is_empty() {
        c.info("无法获取歌曲信息").await;
        return;
    }
    let title = m.get("name").string();

    let order = Order {
        source,
        id,
        user: c.user(),
        likes: 0,
    };
    match c.house.add_order(order).await {
        Ok(()) => {}
        Err(PickError::Duplicate) => {
            c.info("重复点歌").await;
            return;
        }
        Err(PickError::PlaylistFull) => {
            c.info("最多点10首歌").await;
            return;
        }
    }

    c.chat(&format!("点歌 {title}")).await;
    c.house.update(&c.registry).await;
    c.house.push_playlist().await;
}

async fn delete_music(c: Context) {
    if !c.house.limits.order.allow() {
        c.info("操作太频繁").await;
        return;
    }

    let name = c.get("name").string();
    if c.house.delete_by_name(&name).await {
        c.chat(&format!("删除音乐 {name}")).await;
    } else {
        c.info("歌曲未找到").await;
    }
}

async fn good_music(c: Context) {
    if !c.house.limits.like.allow() {
        c.info("点赞太频繁").await;
        return;
    }

    match c.house.like(c.get("index").int()).await {
        Ok(()) => c.house.push_playlist().await,
        Err(msg) => c.info(msg).await,
    }
}

async fn vote_skip(c: Context) {
    match c.house.vote_skip(c.user()).await {
        VoteOutcome::AlreadyVoted => c.info("已投票").await,
        VoteOutcome::Tally(votes, required) | VoteOutcome::Passed(votes, required) => {
            c.chat(&format!("投票切歌 ({votes}/{required})")).await;
        }
    }
}

async fn play_mode(c: Context) {
    if let Some(mode) = PlayMode::parse(&c.get("mode").string()) {
        c.house.set_mode(mode).await;
    }
}

/// Resyncs one client's playback clock.
async fn sync_music(c: Context) {
    let (current, push_time) = c.house.current().await;
    if current.id.is_empty() {
        c.info("当前没有正在播放的歌曲").await;
        return;
    }
    let m = c
        .house
        .api()
        .get_music(&current.source, &current.id, true)
        .await;
    c.send(merge(m, json!({"pushTime": push_time}))).await;
}

async fn get_playlist(c: Context) {
    let (list, online) = c.house.playlist_snapshot().await;
    c.send(json!({"type": "pick", "data": list, "online_count": online}))
        .await;
}

/// Recommendation candidates rendered like a search result, so clients reuse
/// the search pane.
async fn recommend_music(c: Context) {
    if !c.house.recommender.enabled() {
        c.send(json!({"type": "search", "data": [], "totalSize": 0}))
            .await;
        return;
    }

    let queued = c.house.queued_ids().await;
    let candidates = c
        .house
        .recommender
        .recommend(c.house.api(), &queued)
        .await;

    let mut data = Vec::new();
    for id in &candidates {
        let m = c.house.api().get_music("wy", id, true).await;
        let m = Js::new(&m);
        let name = m.get("name").string();
        if name.is_empty() {
            continue;
        }
        data.push(json!({
            "id": id,
            "name": name,
            "artist": m.get("artist").string(),
            "album": {
                "name": m.get("album.name").string(),
            },
            "duration": m.get("duration").int(),
            "privilege": {"st": 1, "fl": 1},
            "cover": m.get("pictureUrl").string(),
        }));
    }

    let total = data.len();
    c.send(json!({"type": "search", "data": data, "totalSize": total}))
        .await;
}

async fn house_user(c: Context) {
    let users = c.house.snapshot_users().await;
    c.send(json!({"type": "house_user", "data": users})).await;
}
