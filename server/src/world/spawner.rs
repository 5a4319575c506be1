//! NPC spawner: instantiates spawn rows per map on first access, primes AI
//! and waypoint state, and runs the respawn timers, including linked-group
//! propagation.

use std::collections::{HashMap, HashSet};

use duskmere_core::defines::npc::Movement;

use crate::db::game_data::GameData;
use crate::session_manager::SessionManager;
use crate::world::world_manager::WorldManager;

pub struct Spawner {
    loaded_maps: HashSet<i32>,
    spawn_to_npc: HashMap<i32, u32>,
    respawn_timers: HashMap<i32, f32>,
}

impl Spawner {
    pub fn new() -> Spawner {
        Spawner {
            loaded_maps: HashSet::new(),
            spawn_to_npc: HashMap::new(),
            respawn_timers: HashMap::new(),
        }
    }

    pub fn npc_for_spawn(&self, spawn_id: i32) -> Option<u32> {
        self.spawn_to_npc.get(&spawn_id).copied()
    }

    pub fn pending_respawns(&self) -> usize {
        self.respawn_timers.len()
    }

    fn instantiate(
        &mut self,
        data: &GameData,
        world: &mut WorldManager,
        spawn_id: i32,
    ) -> Option<u32> {
        let spawn = data.spawns.get(&spawn_id)?;
        let template = data.get_npc(spawn.npc_entry).or_else(|| {
            log::warn!("Spawner: missing NPC template entry {}", spawn.npc_entry);
            None
        })?;

        let guid = world.spawn_npc(template, spawn.map_id, spawn.x, spawn.y, spawn.orientation);

        let movement = if spawn.movement_type != 0 {
            Movement::from_id(spawn.movement_type)
        } else {
            template.movement_type
        };
        let path_id = if spawn.path_id != 0 {
            spawn.path_id
        } else {
            template.path_id
        };

        if let Some(npc) = world.npc_mut(guid) {
            npc.spawn_id = spawn_id;
            npc.respawn_secs = spawn.respawn_secs;
            npc.movement = movement;
            npc.wander_radius = spawn.wander_distance;
            npc.call_for_help = spawn.call_for_help;
            npc.waypoints = data.waypoints_for_path(path_id).to_vec();
            npc.ai_state = match movement {
                Movement::Random => crate::world::npc::AiState::Wandering,
                _ => crate::world::npc::AiState::Idle,
            };
        }

        self.spawn_to_npc.insert(spawn_id, guid);
        Some(guid)
    }

    /// Load and spawn every row for a map the first time it is touched.
    pub fn load_spawns_for_map(
        &mut self,
        data: &GameData,
        world: &mut WorldManager,
        sessions: &mut SessionManager,
        map_id: i32,
    ) {
        if !self.loaded_maps.insert(map_id) {
            return;
        }

        let spawn_ids: Vec<i32> = data.spawn_ids_for_map(map_id).to_vec();
        let mut spawned = 0;
        for spawn_id in spawn_ids {
            if self.spawn_to_npc.contains_key(&spawn_id) {
                continue;
            }
            if let Some(guid) = self.instantiate(data, world, spawn_id) {
                world.broadcast_npc_spawn(guid, sessions);
                spawned += 1;
            }
        }
        log::info!("Spawner: spawned {spawned} NPCs for map {map_id}");
    }

    /// Record a death: start this spawn's timer and, for members of the
    /// same linked group flagged `linked_respawn`, theirs too.
    pub fn record_death(&mut self, data: &GameData, spawn_id: i32, respawn_secs: i32) {
        if spawn_id <= 0 || respawn_secs <= 0 {
            return;
        }

        let leader = data
            .spawn_to_group_leader
            .get(&spawn_id)
            .copied()
            .unwrap_or(spawn_id);

        let mut linked = false;
        if let Some(members) = data.groups_by_leader.get(&leader) {
            for member in members {
                if member.linked_respawn {
                    linked = true;
                    self.respawn_timers
                        .entry(member.member_spawn_id)
                        .or_insert(respawn_secs as f32);
                }
            }
        }

        self.respawn_timers.insert(spawn_id, respawn_secs as f32);
        if linked {
            self.respawn_timers
                .entry(leader)
                .or_insert(respawn_secs as f32);
        }
    }

    /// Tick the respawn timers; at zero the spawn is revived in place (or
    /// re-instantiated) and announced.
    pub fn update(
        &mut self,
        dt_secs: f32,
        data: &GameData,
        world: &mut WorldManager,
        sessions: &mut SessionManager,
    ) {
        if self.respawn_timers.is_empty() {
            return;
        }

        let mut due: Vec<i32> = Vec::new();
        for (&spawn_id, timer) in self.respawn_timers.iter_mut() {
            *timer -= dt_secs;
            if *timer <= 0.0 {
                due.push(spawn_id);
            }
        }
        due.sort_unstable();

        for spawn_id in due {
            self.respawn_timers.remove(&spawn_id);
            self.respawn(data, world, sessions, spawn_id);
        }
    }

    fn respawn(
        &mut self,
        data: &GameData,
        world: &mut WorldManager,
        sessions: &mut SessionManager,
        spawn_id: i32,
    ) {
        let existing = self
            .spawn_to_npc
            .get(&spawn_id)
            .copied()
            .filter(|guid| world.npc(*guid).is_some());

        match existing {
            Some(guid) => {
                // The corpse instance is still registered: revive it where
                // it spawned and re-announce.
                let was_indexed = world
                    .npc(guid)
                    .map(|npc| npc.core.spawned)
                    .unwrap_or(false);
                if let Some(npc) = world.npc_mut(guid) {
                    npc.revive();
                }
                if was_indexed {
                    world.broadcast_npc_spawn(guid, sessions);
                } else {
                    world.reinstate_npc(guid, sessions);
                }
            }
            None => {
                if let Some(guid) = self.instantiate(data, world, spawn_id) {
                    world.broadcast_npc_spawn(guid, sessions);
                }
            }
        }
    }
}

impl Default for Spawner {
    fn default() -> Self {
        Spawner::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::game_data::{GroupEntry, SpawnRow};
    use crate::world::npc::tests::goblin_template;
    use crate::world::npc::AiState;

    fn fixture() -> (GameData, WorldManager, SessionManager, Spawner) {
        let mut data = GameData::default();
        data.npcs.insert(2001, goblin_template());
        for (spawn_id, x) in [(11, 100.0f32), (12, 200.0)] {
            data.spawns.insert(
                spawn_id,
                SpawnRow {
                    spawn_id,
                    npc_entry: 2001,
                    map_id: 1,
                    x,
                    y: 100.0,
                    respawn_secs: 30,
                    ..Default::default()
                },
            );
            data.spawns_by_map.entry(1).or_default().push(spawn_id);
        }

        (
            data,
            WorldManager::new(0.0, 7),
            SessionManager::new(),
            Spawner::new(),
        )
    }

    #[test]
    fn first_access_spawns_every_row_once() {
        let (data, mut world, mut sessions, mut spawner) = fixture();

        spawner.load_spawns_for_map(&data, &mut world, &mut sessions, 1);
        assert_eq!(world.npc_count(), 2);

        // Second load is a no-op.
        spawner.load_spawns_for_map(&data, &mut world, &mut sessions, 1);
        assert_eq!(world.npc_count(), 2);

        let guid = spawner.npc_for_spawn(11).unwrap();
        assert_eq!(world.npc(guid).unwrap().spawn_id, 11);
        assert_eq!(world.npc(guid).unwrap().respawn_secs, 30);
    }

    #[test]
    fn respawn_timer_revives_in_place() {
        let (data, mut world, mut sessions, mut spawner) = fixture();
        spawner.load_spawns_for_map(&data, &mut world, &mut sessions, 1);
        let guid = spawner.npc_for_spawn(11).unwrap();

        {
            let npc = world.npc_mut(guid).unwrap();
            npc.core.dead = true;
            npc.ai_state = AiState::Dead;
        }
        spawner.record_death(&data, 11, 30);
        assert_eq!(spawner.pending_respawns(), 1);

        spawner.update(29.0, &data, &mut world, &mut sessions);
        assert!(world.npc(guid).unwrap().core.dead);

        spawner.update(1.5, &data, &mut world, &mut sessions);
        assert_eq!(spawner.pending_respawns(), 0);
        let npc = world.npc(guid).unwrap();
        assert!(!npc.core.dead);
        assert_eq!(npc.core.health(), npc.core.max_health());
    }

    #[test]
    fn linked_group_members_respawn_together() {
        let (mut data, mut world, mut sessions, mut spawner) = fixture();
        data.spawn_to_group_leader.insert(12, 11);
        data.groups_by_leader.insert(
            11,
            vec![GroupEntry {
                member_spawn_id: 12,
                linked_respawn: true,
                linked_loot: false,
            }],
        );
        spawner.load_spawns_for_map(&data, &mut world, &mut sessions, 1);

        spawner.record_death(&data, 12, 30);
        // The member's death also schedules the leader.
        assert_eq!(spawner.pending_respawns(), 2);
    }

    #[test]
    fn unknown_template_is_skipped() {
        let (mut data, mut world, mut sessions, mut spawner) = fixture();
        data.spawns.insert(
            13,
            SpawnRow {
                spawn_id: 13,
                npc_entry: 9999,
                map_id: 1,
                respawn_secs: 30,
                ..Default::default()
            },
        );
        data.spawns_by_map.entry(1).or_default().push(13);

        spawner.load_spawns_for_map(&data, &mut world, &mut sessions, 1);
        assert_eq!(world.npc_count(), 2);
        assert!(spawner.npc_for_spawn(13).is_none());
    }
}
