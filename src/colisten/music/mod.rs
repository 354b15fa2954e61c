mod kuwo;
mod netease;
mod qq;
mod remote;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use serde::Serialize;
use serde_json::{Value, json};

use super::config::MusicConfig;
use super::task::Dispatcher;

/// One row of a song search result.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Music {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub album: Album,
    pub duration: i64,
    pub privilege: Privilege,
    pub cover: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source: String,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Album {
    pub name: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Privilege {
    pub st: i32,
    pub fl: i32,
}

impl Default for Privilege {
    fn default() -> Privilege {
        Privilege { st: 1, fl: 1 }
    }
}

/// One row of a playlist search result.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde(rename = "pictureUrl")]
    pub picture_url: String,
    pub desc: String,
    pub creator: String,
    #[serde(rename = "creatorUid")]
    pub creator_uid: String,
    #[serde(rename = "playCount")]
    pub play_count: i64,
    #[serde(rename = "songCount")]
    pub song_count: i64,
}

#[derive(Clone, Debug, Default)]
pub struct SearchOption {
    pub id: String,
    pub source: String,
    pub keyword: String,
    pub page: i64,
    pub page_size: i64,
}

impl SearchOption {
    /// (rows to skip, rows to keep) for total-known pagination.
    pub(super) fn bounds(&self) -> (usize, usize) {
        let size = if self.page_size <= 0 {
            10
        } else {
            self.page_size as usize
        };
        let page = if self.page <= 0 { 1 } else { self.page as usize };
        ((page - 1) * size, size)
    }
}

#[derive(Clone, Debug, Default)]
pub struct SearchResult<T> {
    pub total: i64,
    pub data: Vec<T>,
}

/// Uniform facade over the upstream music providers, with an expiring LRU in
/// front of the per-track lookups. `db` (Bilibili) and `url_common` tracks are
/// resolved by remote workers through the task dispatcher.
pub struct MusicApi {
    pub(super) client: reqwest::Client,
    pub(super) conf: MusicConfig,
    pub(super) dispatcher: Arc<Dispatcher>,
    cache: Cache<String, Value>,
}

impl MusicApi {
    pub fn new(conf: MusicConfig, dispatcher: Arc<Dispatcher>) -> MusicApi {
        MusicApi {
            client: reqwest::Client::new(),
            conf,
            dispatcher,
            cache: Cache::builder()
                .max_capacity(256)
                .time_to_live(Duration::from_secs(30 * 60))
                .build(),
        }
    }

    /// Flat `type:"music"` envelope for one track, or an empty object when
    /// the provider fails. Netease playback urls are time-limited, which is
    /// why callers can bypass the cached copy with `use_cache = false`.
    pub async fn get_music(&self, source: &str, id: &str, use_cache: bool) -> Value {
        let key = format!("{source}OvO{id}");
        if use_cache {
            if let Some(hit) = self.cache.get(&key) {
                return hit;
            }
        }

        let fetched = match source {
            "wy" => netease::get_music(self, id).await,
            "qq" => qq::get_music(self, id).await,
            "db" => {
                let payload = HashMap::from([("bvid".to_owned(), id.to_owned())]);
                remote::get_music(self, "bilibili:get_music", payload).await
            }
            "url_common" => {
                let payload = HashMap::from([("url".to_owned(), id.to_owned())]);
                remote::get_music(self, "url_common:get_music", payload).await
            }
            _ => Err(format!("未知音源 {source}")),
        };

        match fetched {
            Ok(m) => {
                self.cache.insert(key, m.clone());
                m
            }
            Err(err) => {
                warn!("get music {source}/{id}: {err}");
                json!({})
            }
        }
    }

    pub async fn search_music(&self, o: &SearchOption) -> SearchResult<Music> {
        let found = match o.source.as_str() {
            "wy" => netease::search_music(self, o).await,
            "qq" => qq::search_music(self, o).await,
            "db" => remote::search_music(self, o).await,
            _ => Ok(SearchResult::default()),
        };
        found.unwrap_or_else(|err| {
            warn!("search {} {:?}: {err}", o.source, o.keyword);
            SearchResult::default()
        })
    }

    pub async fn search_playlist(&self, o: &SearchOption) -> SearchResult<Playlist> {
        let found = match o.source.as_str() {
            "wy" => netease::search_playlist(self, o).await,
            "qq" => qq::search_playlist(self, o).await,
            "qq_user" => qq::search_user_playlist(self, o).await,
            _ => Ok(SearchResult::default()),
        };
        found.unwrap_or_else(|err| {
            warn!("search playlist {} {:?}: {err}", o.source, o.keyword);
            SearchResult::default()
        })
    }

    /// Songs inside one provider playlist.
    pub async fn get_song_list(&self, o: &SearchOption) -> SearchResult<Music> {
        let found = match o.source.as_str() {
            "wy" => netease::get_song_list(self, o).await,
            "qq" => qq::get_song_list(self, o).await,
            _ => Ok(SearchResult::default()),
        };
        found.unwrap_or_else(|err| {
            warn!("song list {} {:?}: {err}", o.source, o.id);
            SearchResult::default()
        })
    }

    /// Track ids similar to `id`, for the recommender. Failures degrade to an
    /// empty list.
    pub async fn similar_songs(&self, id: &str) -> Vec<String> {
        match netease::similar(self, id).await {
            Ok(ids) => ids,
            Err(err) => {
                warn!("similar songs {id}: {err}");
                Vec::new()
            }
        }
    }
}

pub fn web_url(source: &str, id: &str) -> String {
    match source {
        "wy" | "netease" => format!("https://music.163.com/#/song?id={id}"),
        "qq" => format!("https://y.qq.com/n/ryqq/songDetail{id}"),
        "db" => format!("https://www.bilibili.com/video/{id}"),
        _ => String::new(),
    }
}
