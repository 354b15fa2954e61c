use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use uuid::Uuid;

use super::config::PersistHouse;
use super::house::House;
use super::music::MusicApi;

/// Process-wide id→room map. Rooms are created over HTTP (ephemeral) or from
/// the `persist` config list at boot (ultimate).
pub struct Registry {
    houses: Mutex<HashMap<String, Arc<House>>>,
    api: Arc<MusicApi>,
}

impl Registry {
    pub fn new(api: Arc<MusicApi>) -> Arc<Registry> {
        Arc::new(Registry {
            houses: Mutex::new(HashMap::new()),
            api,
        })
    }

    pub fn create_house(
        self: &Arc<Self>,
        id: Option<String>,
        name: String,
        desc: String,
        password: String,
        ultimate: bool,
    ) -> Arc<House> {
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let house = House::new(
            id.clone(),
            name,
            desc,
            password,
            ultimate,
            Arc::clone(&self.api),
        );
        self.houses.lock().unwrap().insert(id, Arc::clone(&house));
        house.start(Arc::clone(self));
        debug!("[{}] house {} created", house.id, house.name);
        house
    }

    pub fn get(&self, id: &str) -> Option<Arc<House>> {
        self.houses.lock().unwrap().get(id).cloned()
    }

    /// Removes and shuts a room down under the map lock, so a concurrent
    /// lookup can't hand out a live handle to an already-closed room.
    pub fn close_house(&self, id: &str) {
        let mut houses = self.houses.lock().unwrap();
        if let Some(house) = houses.remove(id) {
            house.shutdown();
            debug!("[{}] house {} destroyed", house.id, house.name);
        }
    }

    pub fn bootstrap(self: &Arc<Self>, persist: &[PersistHouse]) {
        for p in persist {
            self.create_house(
                Some(p.id.clone()),
                p.name.clone(),
                p.desc.clone(),
                p.password.clone(),
                true,
            );
        }
    }

    /// Room directory entries for `GET /house/search`.
    pub async fn search(&self) -> Vec<Value> {
        let houses: Vec<Arc<House>> = self.houses.lock().unwrap().values().cloned().collect();
        let mut entries = Vec::with_capacity(houses.len());
        for house in houses {
            entries.push(json!({
                "id": house.id,
                "name": house.name,
                "desc": house.desc,
                "population": house.population().await,
                "createTime": house.create_time,
                "needPwd": !house.password.is_empty(),
                "ultimate": house.ultimate,
            }));
        }
        entries
    }
}
