//! On-demand map cache. Maps are loaded from the maps directory the first
//! time something asks for them; a preload pass at boot pulls in the start
//! zones so first logins never pay the load.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::db::game_data::GameData;
use crate::world::map::Map;

pub struct MapManager {
    maps_directory: PathBuf,
    loaded: HashMap<i32, Map>,
}

impl MapManager {
    pub fn new(maps_directory: impl Into<PathBuf>) -> MapManager {
        MapManager {
            maps_directory: maps_directory.into(),
            loaded: HashMap::new(),
        }
    }

    /// Fetch a map, loading it from disk on first access.
    pub fn get_map(&mut self, data: &GameData, map_id: i32) -> Option<&Map> {
        if !self.loaded.contains_key(&map_id) {
            let template = data.get_map(map_id)?;
            let path = self.maps_directory.join(format!("{}.map", template.name));
            match Map::load(map_id, &path) {
                Ok(map) => {
                    self.loaded.insert(map_id, map);
                }
                Err(e) => {
                    log::error!("MapManager: failed to load map {map_id}: {e:#}");
                    return None;
                }
            }
        }
        self.loaded.get(&map_id)
    }

    pub fn get_loaded(&self, map_id: i32) -> Option<&Map> {
        self.loaded.get(&map_id)
    }

    pub fn is_loaded(&self, map_id: i32) -> bool {
        self.loaded.contains_key(&map_id)
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    pub fn preload(&mut self, data: &GameData, map_ids: &[i32]) {
        log::info!("MapManager: preloading {} maps...", map_ids.len());
        for &map_id in map_ids {
            if self.get_map(data, map_id).is_none() {
                log::warn!("MapManager: failed to preload map {map_id}");
            }
        }
    }

    /// Insert a prebuilt map, e.g. a synthetic grid in tests.
    pub fn insert(&mut self, map: Map) {
        self.loaded.insert(map.id(), map);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::map::Map;

    #[test]
    fn inserted_maps_are_served() {
        let mut manager = MapManager::new("maps");
        manager.insert(Map::empty(3, 8));

        assert!(manager.is_loaded(3));
        assert_eq!(manager.get_loaded(3).unwrap().width(), 8);
        assert_eq!(manager.loaded_count(), 1);
    }

    #[test]
    fn unknown_map_is_none() {
        let mut manager = MapManager::new("maps");
        let data = GameData::default();
        assert!(manager.get_map(&data, 42).is_none());
    }
}
