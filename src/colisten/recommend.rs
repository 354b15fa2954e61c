use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use moka::sync::Cache;

use super::music::MusicApi;

const MAX_HISTORY: usize = 32;
const MAX_RECOMMENDED: usize = 128;

/// History-based candidate generator that keeps a room's queue from running
/// dry while listeners are present. Tracks picked by users feed the history;
/// tracks picked by the recommender itself are only marked so they don't come
/// back around.
pub struct Recommender {
    inner: Mutex<Inner>,
    /// similar-songs lookups per seed, the upstream answer barely changes
    cache: Cache<String, Vec<String>>,
}

#[derive(Default)]
struct Inner {
    history: VecDeque<String>,
    recommended: VecDeque<String>,
}

impl Recommender {
    pub fn new() -> Recommender {
        Recommender {
            inner: Mutex::new(Inner::default()),
            cache: Cache::builder()
                .max_capacity(128)
                .time_to_live(Duration::from_secs(30 * 60))
                .build(),
        }
    }

    pub fn add_history(&self, id: &str) {
        if id.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.history.iter().any(|m| m == id) {
            return;
        }
        if inner.history.len() >= MAX_HISTORY {
            inner.history.pop_front();
        }
        inner.history.push_back(id.to_owned());
    }

    /// Remembers an auto-picked track so it is not suggested again.
    pub fn mark(&self, id: &str) {
        if id.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.recommended.iter().any(|m| m == id) {
            return;
        }
        if inner.recommended.len() >= MAX_RECOMMENDED {
            inner.recommended.pop_front();
        }
        inner.recommended.push_back(id.to_owned());
    }

    pub fn enabled(&self) -> bool {
        self.inner.lock().unwrap().history.len() >= 3
    }

    /// Up to 10 candidate ids, in insertion order, none of which are in the
    /// history, the already-recommended set, or `playlist`.
    pub async fn recommend(&self, api: &MusicApi, playlist: &[String]) -> Vec<String> {
        let (mut seeds, mut visited) = {
            let inner = self.inner.lock().unwrap();
            let seeds: Vec<String> = inner.history.iter().cloned().collect();
            let mut visited: HashSet<String> = inner.history.iter().cloned().collect();
            visited.extend(inner.recommended.iter().cloned());
            (seeds, visited)
        };
        for id in playlist {
            if visited.insert(id.clone()) {
                seeds.push(id.clone());
            }
        }

        let mut found = Vec::new();
        let mut seen = HashSet::new();
        for seed in &seeds {
            if found.len() > 25 {
                break;
            }
            let similar = match self.cache.get(seed) {
                Some(hit) => hit,
                None => {
                    let fetched = api.similar_songs(seed).await;
                    self.cache.insert(seed.clone(), fetched.clone());
                    fetched
                }
            };
            for id in similar {
                if !visited.contains(&id) && seen.insert(id.clone()) {
                    found.push(id);
                }
            }
        }

        found.truncate(10);
        found
    }
}

impl Default for Recommender {
    fn default() -> Recommender {
        Recommender::new()
    }
}
