use std::sync::Arc;
use std::time::Duration;

use bytestring::ByteString;
use rand::Rng as _;
use serde_json::{Value, json};
use tokio::sync::{Mutex, mpsc};

use super::channel::{self, UnboundedSender};
use super::connection::{Connection, User, enc_json};
use super::limit::HouseLimits;
use super::music::MusicApi;
use super::recommend::Recommender;
use super::registry::Registry;
use super::value::{Js, merge};

/// Picker name attached to auto-recommended tracks.
pub const SYSTEM_PICKER: &str = "系统推荐";

const TICK: Duration = Duration::from_millis(500);
/// Clients get this long to buffer before playback starts.
const PUSH_DELAY_MS: i64 = 200;
const IDLE_TIMEOUT_MS: i64 = 5 * 60 * 1000;
/// No auto-recommendation right after a user order, he is probably not done.
const ORDER_GUARD_MS: i64 = 10 * 1000;
const MAX_PLAYLIST: usize = 10;

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlayMode {
    #[default]
    Sequential,
    Random,
}

impl PlayMode {
    /// Unknown strings are ignored by the handler, hence the `Option`.
    pub fn parse(s: &str) -> Option<PlayMode> {
        match s {
            "sequential" => Some(PlayMode::Sequential),
            "random" => Some(PlayMode::Random),
            _ => None,
        }
    }
}

/// One queue entry.
#[derive(Clone, Debug, Default)]
pub struct Order {
    pub source: String,
    pub id: String,
    pub user: User,
    pub likes: i64,
}

#[derive(Debug)]
pub enum PickError {
    Duplicate,
    PlaylistFull,
}

pub enum VoteOutcome {
    AlreadyVoted,
    /// (votes, required) — threshold not reached yet.
    Tally(usize, usize),
    /// (votes, required) — the skip fired.
    Passed(usize, usize),
}

/// Everything mutable about a room, guarded by one mutex.
pub struct HouseState {
    pub mode: PlayMode,
    pub current: Order,
    /// Absolute wall-clock millis at which `current` ends.
    pub end: i64,
    /// Absolute wall-clock millis at which clients should start playback.
    pub push_time: i64,
    pub playlist: Vec<Order>,
    pub vote_skip: Vec<User>,
    pub connections: Vec<Arc<Connection>>,
    pub last_active: i64,
    pub last_order: i64,
}

/// A listening room: one queue, one current track, many listeners sharing a
/// playback clock. A single pump task per room serializes fan-out and runs
/// the 500 ms tick.
pub struct House {
    pub id: String,
    pub name: String,
    pub desc: String,
    pub password: String,
    pub ultimate: bool,
    pub create_time: i64,
    pub limits: HouseLimits,
    pub recommender: Recommender,
    api: Arc<MusicApi>,
    pub(crate) state: Mutex<HouseState>,
    queue: UnboundedSender<ByteString>,
    close_tx: std::sync::Mutex<Option<mpsc::Sender<()>>>,
    pump: std::sync::Mutex<Option<PumpParts>>,
}

struct PumpParts {
    queue_rx: mpsc::Receiver<ByteString>,
    close_rx: mpsc::Receiver<()>,
}

impl House {
    pub fn new(
        id: String,
        name: String,
        desc: String,
        password: String,
        ultimate: bool,
        api: Arc<MusicApi>,
    ) -> Arc<House> {
        let (queue, queue_rx) = channel::unbounded(8);
        let (close_tx, close_rx) = mpsc::channel(1);
        let now = now_ms();
        Arc::new(House {
            id,
            name,
            desc,
            password,
            ultimate,
            create_time: now,
            limits: HouseLimits::new(ultimate),
            recommender: Recommender::new(),
            api,
            state: Mutex::new(HouseState {
                mode: PlayMode::default(),
                current: Order::default(),
                end: 0,
                push_time: 0,
                playlist: Vec::new(),
                vote_skip: Vec::new(),
                connections: Vec::new(),
                last_active: now,
                last_order: 0,
            }),
            queue,
            close_tx: std::sync::Mutex::new(Some(close_tx)),
            pump: std::sync::Mutex::new(Some(PumpParts { queue_rx, close_rx })),
        })
    }

    pub fn api(&self) -> &MusicApi {
        &self.api
    }

    /// Spawns the room's broadcast pump. Ran exactly once, by the registry.
    pub(super) fn start(self: &Arc<Self>, registry: Arc<Registry>) {
        let Some(PumpParts {
            mut queue_rx,
            mut close_rx,
        }) = self.pump.lock().unwrap().take()
        else {
            return;
        };

        let house = Arc::clone(self);
        actix_rt::spawn(async move {
            let mut ticker = tokio::time::interval(TICK);
            loop {
                tokio::select! {
                    _ = close_rx.recv() => break,
                    frame = queue_rx.recv() => {
                        match frame {
                            Some(frame) => house.fan_out(frame).await,
                            None => break,
                        }
                    }
                    _ = ticker.tick() => house.update(&registry).await,
                }
            }
            debug!("[{}] pump stopped", house.id);
        });
    }

    /// Delivery set is whoever is connected when the frame is dequeued, not
    /// when it was broadcast.
    async fn fan_out(&self, frame: ByteString) {
        let state = self.state.lock().await;
        for conn in state.connections.iter() {
            conn.send_raw(frame.clone()).await;
        }
    }

    /// Called by the registry, under the registry lock.
    pub(super) fn shutdown(&self) {
        self.queue.close();
        self.close_tx.lock().unwrap().take();
    }

    pub fn is_closed(&self) -> bool {
        self.close_tx.lock().unwrap().is_none()
    }

    /// Encodes once and hands the frame to the pump.
    pub async fn broadcast(&self, msg: &Value) {
        self.queue.send(enc_json(msg)).await;
    }

    /// One tick: advance past an ended track, or self-destruct after sitting
    /// empty for too long.
    pub async fn update(&self, registry: &Registry) {
        let now = now_ms();
        let (skip_needed, should_close) = {
            let state = self.state.lock().await;
            (
                state.current.id.is_empty() || state.end < now,
                !self.ultimate
                    && state.connections.is_empty()
                    && now - state.last_active > IDLE_TIMEOUT_MS,
            )
        };

        if should_close {
            registry.close_house(&self.id);
            return;
        }
        if skip_needed {
            self.skip(false).await;
        }
    }

    /// Advances to the next queued track. Without `force` the play state is
    /// re-checked under the lock, two ticks may both have seen an ended song.
    pub async fn skip(&self, force: bool) {
        let next = {
            let mut state = self.state.lock().await;
            if !force && !state.current.id.is_empty() && state.end > now_ms() {
                return;
            }
            state.vote_skip.clear();
            if state.playlist.is_empty() {
                return;
            }
            let index = match state.mode {
                PlayMode::Sequential => 0,
                PlayMode::Random => rand::rng().random_range(0..state.playlist.len()),
            };
            let next = state.playlist.remove(index);
            state.current = next.clone();
            next
        };

        self.push(&next).await;

        if next.source == "wy" {
            if next.user.name == SYSTEM_PICKER {
                self.recommender.mark(&next.id);
            } else {
                self.recommender.add_history(&next.id);
            }
        }

        self.top_up().await;
        self.push_playlist().await;
    }

    /// Broadcasts the now-playing envelope with an absolute start time
    /// slightly in the future and records when the track ends.
    async fn push(&self, order: &Order) {
        // playback urls expire, refetch for the broadcast
        let m = self.api.get_music(&order.source, &order.id, false).await;
        if !Js::new(&m).get("duration").exists() {
            return;
        }
        let duration = Js::new(&m).get("duration").int();

        let now = now_ms();
        {
            let mut state = self.state.lock().await;
            state.push_time = now + PUSH_DELAY_MS;
            state.end = now + duration;
        }

        let envelope = merge(m, json!({"pushTime": now + PUSH_DELAY_MS}));
        self.broadcast(&envelope).await;
    }

    /// Queues one recommended track when the playlist just ran dry, listeners
    /// are around, and nobody ordered anything in the last few seconds.
    async fn top_up(&self) {
        let queued = {
            let state = self.state.lock().await;
            let idle = state.playlist.is_empty()
                && !state.connections.is_empty()
                && now_ms() - state.last_order > ORDER_GUARD_MS;
            if !idle {
                return;
            }
            let mut queued = Vec::with_capacity(state.playlist.len() + 1);
            if !state.current.id.is_empty() {
                queued.push(state.current.id.clone());
            }
            queued.extend(state.playlist.iter().map(|o| o.id.clone()));
            queued
        };

        if !self.recommender.enabled() {
            return;
        }
        let candidates = self.recommender.recommend(&self.api, &queued).await;
        if candidates.is_empty() {
            return;
        }
        let pick = candidates[rand::rng().random_range(0..candidates.len())].clone();

        let mut state = self.state.lock().await;
        if state.current.id == pick || state.playlist.iter().any(|o| o.id == pick) {
            return;
        }
        debug!("[{}] queueing recommendation {pick}", self.id);
        state.playlist.push(Order {
            source: "wy".to_owned(),
            id: pick,
            user: User::new(SYSTEM_PICKER),
            likes: 0,
        });
    }

    /// Registers a listener and brings him up to speed: current track with
    /// its original push time, playlist snapshot, and the new roster for
    /// everyone.
    pub async fn enter(&self, conn: &Arc<Connection>) {
        let (current, push_time, orders, users, online) = {
            let mut state = self.state.lock().await;
            state.connections.push(Arc::clone(conn));
            state.last_active = now_ms();
            (
                state.current.clone(),
                state.push_time,
                orders_snapshot(&state),
                users_snapshot(&state),
                state.connections.len(),
            )
        };

        if !current.id.is_empty() {
            let m = self.api.get_music(&current.source, &current.id, true).await;
            conn.send(&merge(m, json!({"pushTime": push_time}))).await;
        }

        let list = self.render_playlist(&orders).await;
        conn.send(&json!({"type": "pick", "data": list, "online_count": online}))
            .await;
        self.broadcast(&json!({"type": "house_user", "data": users}))
            .await;
    }

    /// Unregisters a listener, matching on the connection itself, not the
    /// user: one person can sit in a room twice.
    pub async fn leave(&self, conn: &Arc<Connection>) {
        let users = {
            let mut state = self.state.lock().await;
            state.connections.retain(|c| !Arc::ptr_eq(c, conn));
            if state.connections.is_empty() {
                state.last_active = now_ms();
            }
            conn.close();
            users_snapshot(&state)
        };

        self.broadcast(&json!({"type": "house_user", "data": users}))
            .await;
    }

    pub async fn snapshot_users(&self) -> Vec<Value> {
        users_snapshot(&*self.state.lock().await)
    }

    pub async fn population(&self) -> usize {
        self.state.lock().await.connections.len()
    }

    pub async fn current(&self) -> (Order, i64) {
        let state = self.state.lock().await;
        (state.current.clone(), state.push_time)
    }

    pub async fn set_mode(&self, mode: PlayMode) {
        self.state.lock().await.mode = mode;
    }

    /// Ids of the current track plus everything queued, for the recommender.
    pub async fn queued_ids(&self) -> Vec<String> {
        let state = self.state.lock().await;
        let mut ids = Vec::with_capacity(state.playlist.len() + 1);
        if !state.current.id.is_empty() {
            ids.push(state.current.id.clone());
        }
        ids.extend(state.playlist.iter().map(|o| o.id.clone()));
        ids
    }

    /// Quick pre-network probe; the authoritative check happens in
    /// [`House::add_order`].
    pub async fn can_order(&self) -> bool {
        self.ultimate || self.state.lock().await.playlist.len() < MAX_PLAYLIST
    }

    /// Appends an order, rejecting duplicates of the current track or any
    /// queued one.
    pub async fn add_order(&self, order: Order) -> Result<(), PickError> {
        let mut state = self.state.lock().await;
        if !self.ultimate && state.playlist.len() >= MAX_PLAYLIST {
            return Err(PickError::PlaylistFull);
        }
        if state.current.id == order.id || state.playlist.iter().any(|o| o.id == order.id) {
            return Err(PickError::Duplicate);
        }
        state.playlist.push(order);
        state.last_order = now_ms();
        Ok(())
    }

    /// `index` is 1-based over the queue as the client displays it. The
    /// stable re-sort keeps equally-liked tracks in pick order.
    pub async fn like(&self, index: i64) -> Result<(), &'static str> {
        let mut state = self.state.lock().await;
        let index = index - 1;
        if index < 0 || index as usize >= state.playlist.len() {
            return Err("无效的歌曲序号");
        }
        state.playlist[index as usize].likes += 1;
        state.playlist.sort_by(|a, b| b.likes.cmp(&a.likes));
        Ok(())
    }

    /// One vote per user; a third of the room (at least one listener) forces
    /// the skip.
    pub async fn vote_skip(&self, user: User) -> VoteOutcome {
        let outcome = {
            let mut state = self.state.lock().await;
            if state.vote_skip.iter().any(|u| *u == user) {
                return VoteOutcome::AlreadyVoted;
            }
            state.vote_skip.push(user);
            let required = state.connections.len().div_ceil(3).max(1);
            let votes = state.vote_skip.len();
            if votes >= required {
                VoteOutcome::Passed(votes, required)
            } else {
                VoteOutcome::Tally(votes, required)
            }
        };

        if let VoteOutcome::Passed(..) = outcome {
            self.skip(true).await;
        }
        outcome
    }

    /// Removes the first queued track whose title matches. Titles are how the
    /// client protocol names songs for deletion; duplicates resolve to
    /// whichever comes first.
    pub async fn delete_by_name(&self, name: &str) -> bool {
        let orders = { self.state.lock().await.playlist.clone() };

        let mut target = None;
        for order in &orders {
            let m = self.api.get_music(&order.source, &order.id, true).await;
            if Js::new(&m).get("name").string() == name {
                target = Some(order.id.clone());
                break;
            }
        }
        let Some(id) = target else {
            return false;
        };

        let removed = {
            let mut state = self.state.lock().await;
            match state.playlist.iter().position(|o| o.id == id) {
                Some(pos) => {
                    state.playlist.remove(pos);
                    true
                }
                None => false,
            }
        };

        if removed {
            self.push_playlist().await;
        }
        removed
    }

    /// Broadcasts the rendered queue to the whole room.
    pub async fn push_playlist(&self) {
        let (orders, online) = {
            let state = self.state.lock().await;
            (orders_snapshot(&state), state.connections.len())
        };
        let list = self.render_playlist(&orders).await;
        self.broadcast(&json!({"type": "pick", "data": list, "online_count": online}))
            .await;
    }

    /// Rendered queue plus listener count, for a single caller.
    pub async fn playlist_snapshot(&self) -> (Vec<Value>, usize) {
        let (orders, online) = {
            let state = self.state.lock().await;
            (orders_snapshot(&state), state.connections.len())
        };
        (self.render_playlist(&orders).await, online)
    }

    /// Short projection of each track; the playback url stays out of the
    /// queue envelope on purpose.
    async fn render_playlist(&self, orders: &[Order]) -> Vec<Value> {
        let mut list = Vec::with_capacity(orders.len());
        for order in orders {
            if order.id.is_empty() {
                continue;
            }
            let m = self.api.get_music(&order.source, &order.id, true).await;
            let m = Js::new(&m);
            list.push(json!({
                "type": "music",
                "id": order.id,
                "source": order.source,
                "name": m.get("name").string(),
                "artist": m.get("artist").string(),
                "album": {
                    "name": m.get("album.name").string(),
                },
                "duration": m.get("duration").int(),
                "pictureUrl": m.get("pictureUrl").string(),
                "webUrl": m.get("webUrl").string(),
                "nickName": order.user.name,
                "likes": order.likes,
            }));
        }
        list
    }
}

/// Current track first, then the queue.
fn orders_snapshot(state: &HouseState) -> Vec<Order> {
    let mut orders = Vec::with_capacity(state.playlist.len() + 1);
    if !state.current.id.is_empty() {
        orders.push(state.current.clone());
    }
    orders.extend(state.playlist.iter().cloned());
    orders
}

fn users_snapshot(state: &HouseState) -> Vec<Value> {
    state
        .connections
        .iter()
        .map(|conn| {
            let user = conn.user();
            json!({
                "name": conn.display_name(),
                "email": user.email.unwrap_or_default(),
            })
        })
        .collect()
}
