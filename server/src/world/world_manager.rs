//! World registry: owns live NPCs and in-world players, indexes both per
//! map, and carries every visibility-filtered broadcast.
//!
//! All mutation happens on the world thread. Cross-references between
//! gameplay objects are GUIDs resolved through this registry; broadcast
//! iteration walks sorted GUID lists so identical inputs produce identical
//! packet streams.

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::db::game_data::NpcTemplate;
use crate::packets;
use crate::session_manager::SessionManager;
use crate::world::entity::{is_npc_guid, EntityCore, NPC_GUID_BASE};
use crate::world::npc::{AiState, Npc};
use crate::world::player::Player;

/// Hysteresis band: a visible pair stays visible until it leaves 110% of
/// the view distance, so border jitter cannot toggle spawn packets every
/// frame.
const VIEW_HYSTERESIS: f32 = 1.1;

pub struct WorldManager {
    players: HashMap<u32, Player>,
    npcs: HashMap<u32, Npc>,
    players_by_map: HashMap<i32, HashSet<u32>>,
    npcs_by_map: HashMap<i32, HashSet<u32>>,
    next_npc_guid: u32,
    /// 0 means unbounded visibility within a map.
    view_distance: f32,
    /// Player pairs currently visible to each other (low GUID first);
    /// only maintained for a non-zero view distance.
    visible_pairs: HashSet<(u32, u32)>,
    pub rng: StdRng,
}

fn pair_key(a: u32, b: u32) -> (u32, u32) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

impl WorldManager {
    pub fn new(view_distance: f32, rng_seed: u64) -> WorldManager {
        WorldManager {
            players: HashMap::new(),
            npcs: HashMap::new(),
            players_by_map: HashMap::new(),
            npcs_by_map: HashMap::new(),
            next_npc_guid: NPC_GUID_BASE,
            view_distance,
            visible_pairs: HashSet::new(),
            rng: StdRng::seed_from_u64(rng_seed),
        }
    }

    // ------------------------------------------------------------------
    //  Lookup
    // ------------------------------------------------------------------

    pub fn player(&self, guid: u32) -> Option<&Player> {
        self.players.get(&guid)
    }

    pub fn player_mut(&mut self, guid: u32) -> Option<&mut Player> {
        self.players.get_mut(&guid)
    }

    pub fn player_by_name(&self, name: &str) -> Option<&Player> {
        self.players
            .values()
            .find(|p| p.core.name.eq_ignore_ascii_case(name))
    }

    pub fn npc(&self, guid: u32) -> Option<&Npc> {
        self.npcs.get(&guid)
    }

    pub fn npc_mut(&mut self, guid: u32) -> Option<&mut Npc> {
        self.npcs.get_mut(&guid)
    }

    /// Kind-dispatched entity core access.
    pub fn entity_core(&self, guid: u32) -> Option<&EntityCore> {
        if is_npc_guid(guid) {
            self.npcs.get(&guid).map(|n| &n.core)
        } else {
            self.players.get(&guid).map(|p| &p.core)
        }
    }

    pub fn entity_core_mut(&mut self, guid: u32) -> Option<&mut EntityCore> {
        if is_npc_guid(guid) {
            self.npcs.get_mut(&guid).map(|n| &mut n.core)
        } else {
            self.players.get_mut(&guid).map(|p| &mut p.core)
        }
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn npc_count(&self) -> usize {
        self.npcs.len()
    }

    /// Sorted for deterministic iteration.
    pub fn players_on_map(&self, map_id: i32) -> Vec<u32> {
        let mut guids: Vec<u32> = self
            .players_by_map
            .get(&map_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        guids.sort_unstable();
        guids
    }

    pub fn npcs_on_map(&self, map_id: i32) -> Vec<u32> {
        let mut guids: Vec<u32> = self
            .npcs_by_map
            .get(&map_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        guids.sort_unstable();
        guids
    }

    pub fn all_player_guids(&self) -> Vec<u32> {
        let mut guids: Vec<u32> = self.players.keys().copied().collect();
        guids.sort_unstable();
        guids
    }

    pub fn all_npc_guids(&self) -> Vec<u32> {
        let mut guids: Vec<u32> = self.npcs.keys().copied().collect();
        guids.sort_unstable();
        guids
    }

    // ------------------------------------------------------------------
    //  Visibility
    // ------------------------------------------------------------------

    /// Can `a` currently see `b`? With view distance 0 everyone on the
    /// same map is mutually visible; otherwise a Euclidean range test with
    /// hysteresis on already-visible pairs.
    pub fn can_see(&self, a: u32, b: u32) -> bool {
        if a == b {
            return true;
        }
        let (Some(ca), Some(cb)) = (self.entity_core(a), self.entity_core(b)) else {
            return false;
        };
        if ca.map_id != cb.map_id {
            return false;
        }
        if self.view_distance <= 0.0 {
            return true;
        }
        let threshold = if self.visible_pairs.contains(&pair_key(a, b)) {
            self.view_distance * VIEW_HYSTERESIS
        } else {
            self.view_distance
        };
        ca.distance_to_entity(cb) <= threshold
    }

    /// Re-evaluate which players can see `guid`, emitting spawn/destroy
    /// pairs for transitions. Only meaningful for a non-zero view
    /// distance.
    pub fn update_visibility(&mut self, guid: u32, sessions: &mut SessionManager) {
        if self.view_distance <= 0.0 {
            return;
        }
        let Some(player) = self.players.get(&guid) else {
            return;
        };
        let map_id = player.core.map_id;

        for other in self.players_on_map(map_id) {
            if other == guid {
                continue;
            }
            let key = pair_key(guid, other);
            let was_visible = self.visible_pairs.contains(&key);
            let now_visible = self.can_see(guid, other);
            if was_visible == now_visible {
                continue;
            }

            let (a, b) = (self.players.get(&guid), self.players.get(&other));
            let (Some(a), Some(b)) = (a, b) else { continue };
            if now_visible {
                self.visible_pairs.insert(key);
                sessions.send(a.session_id, &packets::player_spawn(b));
                sessions.send(b.session_id, &packets::player_spawn(a));
            } else {
                self.visible_pairs.remove(&key);
                sessions.send(a.session_id, &packets::destroy_object(other));
                sessions.send(b.session_id, &packets::destroy_object(guid));
            }
        }
    }

    fn drop_visibility_of(&mut self, guid: u32) {
        if self.view_distance > 0.0 {
            self.visible_pairs.retain(|&(a, b)| a != guid && b != guid);
        }
    }

    // ------------------------------------------------------------------
    //  Player spawn / despawn
    // ------------------------------------------------------------------

    /// Insert a player into the world: index it, announce it to every
    /// observer that can see it, and send the new player everything it can
    /// see. Within the tick, a given observer sees this spawn exactly
    /// once.
    pub fn spawn_player(&mut self, mut player: Player, sessions: &mut SessionManager) {
        let guid = player.guid();
        let map_id = player.core.map_id;
        player.core.spawned = true;
        self.players.insert(guid, player);
        self.players_by_map.entry(map_id).or_default().insert(guid);

        for other in self.players_on_map(map_id) {
            if other == guid || !self.can_see(guid, other) {
                continue;
            }
            if self.view_distance > 0.0 {
                self.visible_pairs.insert(pair_key(guid, other));
            }
            let (Some(new_player), Some(existing)) =
                (self.players.get(&guid), self.players.get(&other))
            else {
                continue;
            };
            sessions.send(existing.session_id, &packets::player_spawn(new_player));
            sessions.send(new_player.session_id, &packets::player_spawn(existing));
        }

        let session_id = self.players[&guid].session_id;
        for npc_guid in self.npcs_on_map(map_id) {
            if !self.can_see(guid, npc_guid) {
                continue;
            }
            if let Some(npc) = self.npcs.get(&npc_guid) {
                sessions.send(session_id, &packets::npc_spawn(npc));
            }
        }

        log::info!(
            "World: player '{}' ({guid:#x}) entered map {map_id}",
            self.players[&guid].core.name
        );
    }

    /// Announce a despawn to everyone else on the map and unindex the
    /// player. A GUID that is not live is a no-op.
    pub fn despawn_player(&mut self, guid: u32, sessions: &mut SessionManager) {
        let Some(player) = self.players.get(&guid) else {
            return;
        };
        if !player.core.spawned {
            return;
        }
        let map_id = player.core.map_id;

        for other in self.players_on_map(map_id) {
            if other == guid || !self.can_see(other, guid) {
                continue;
            }
            if let Some(observer) = self.players.get(&other) {
                sessions.send(observer.session_id, &packets::destroy_object(guid));
            }
        }

        self.drop_visibility_of(guid);
        if let Some(set) = self.players_by_map.get_mut(&map_id) {
            set.remove(&guid);
        }
        if let Some(player) = self.players.get_mut(&guid) {
            player.core.spawned = false;
        }
    }

    /// Remove the player entity, returning ownership to the caller (the
    /// session teardown path).
    pub fn remove_player(&mut self, guid: u32) -> Option<Player> {
        self.despawn_guard(guid);
        let player = self.players.remove(&guid)?;
        if let Some(set) = self.players_by_map.get_mut(&player.core.map_id) {
            set.remove(&guid);
        }
        self.drop_visibility_of(guid);
        Some(player)
    }

    fn despawn_guard(&self, guid: u32) {
        if let Some(player) = self.players.get(&guid) {
            debug_assert!(
                !player.core.spawned,
                "player must be despawned before removal"
            );
        }
    }

    /// Cross-map teleport: despawn/spawn pair plus a fresh world state for
    /// the moving client.
    pub fn change_player_map(
        &mut self,
        guid: u32,
        new_map: i32,
        x: f32,
        y: f32,
        orientation: f32,
        sessions: &mut SessionManager,
    ) {
        self.despawn_player(guid, sessions);
        let Some(player) = self.players.get_mut(&guid) else {
            return;
        };
        let old_map = player.core.map_id;
        if let Some(set) = self.players_by_map.get_mut(&old_map) {
            set.remove(&guid);
        }
        player.core.map_id = new_map;
        player.core.set_position(x, y);
        player.core.orientation = orientation;
        player.mark_dirty();
        let session_id = player.session_id;
        sessions.send(session_id, &packets::new_world(new_map, x, y, orientation));

        let player = self.players.remove(&guid).expect("player fetched above");
        self.spawn_player(player, sessions);
    }

    /// Movement broadcast plus visibility maintenance.
    pub fn on_player_moved(&mut self, guid: u32, sessions: &mut SessionManager) {
        let Some(player) = self.players.get(&guid) else {
            return;
        };
        let frame = packets::unit_spline(guid, player.core.x, player.core.y, 300.0);
        self.broadcast_to_visible(sessions, guid, &frame, false);
        self.update_visibility(guid, sessions);
    }

    // ------------------------------------------------------------------
    //  NPCs
    // ------------------------------------------------------------------

    pub fn alloc_npc_guid(&mut self) -> u32 {
        let guid = self.next_npc_guid;
        self.next_npc_guid += 1;
        guid
    }

    /// Instantiate an NPC from its template. The spawner decides when to
    /// announce it.
    pub fn spawn_npc(
        &mut self,
        template: &NpcTemplate,
        map_id: i32,
        x: f32,
        y: f32,
        orientation: f32,
    ) -> u32 {
        let guid = self.alloc_npc_guid();
        let mut npc = Npc::from_template(guid, template, map_id, x, y, orientation);
        npc.core.spawned = true;
        self.npcs.insert(guid, npc);
        self.npcs_by_map.entry(map_id).or_default().insert(guid);
        guid
    }

    pub fn broadcast_npc_spawn(&self, guid: u32, sessions: &mut SessionManager) {
        if let Some(npc) = self.npcs.get(&guid) {
            let frame = packets::npc_spawn(npc);
            self.broadcast_to_map(sessions, npc.core.map_id, &frame, None);
        }
    }

    /// Take an NPC out of the world pending respawn; the instance stays
    /// registered so the spawner can revive it in place.
    pub fn despawn_npc(&mut self, guid: u32, sessions: &mut SessionManager) {
        let Some(npc) = self.npcs.get_mut(&guid) else {
            return;
        };
        if npc.ai_state == AiState::Despawned {
            return;
        }
        npc.ai_state = AiState::Despawned;
        npc.core.spawned = false;
        let map_id = npc.core.map_id;
        if let Some(set) = self.npcs_by_map.get_mut(&map_id) {
            set.remove(&guid);
        }
        let frame = packets::destroy_object(guid);
        self.broadcast_to_map(sessions, map_id, &frame, None);
    }

    /// Re-index a revived NPC and announce it.
    pub fn reinstate_npc(&mut self, guid: u32, sessions: &mut SessionManager) {
        let Some(npc) = self.npcs.get_mut(&guid) else {
            return;
        };
        npc.core.spawned = true;
        let map_id = npc.core.map_id;
        self.npcs_by_map.entry(map_id).or_default().insert(guid);
        self.broadcast_npc_spawn(guid, sessions);
    }

    /// Remove an NPC completely (shutdown or permanent removal).
    pub fn remove_npc(&mut self, guid: u32) -> Option<Npc> {
        let npc = self.npcs.remove(&guid)?;
        if let Some(set) = self.npcs_by_map.get_mut(&npc.core.map_id) {
            set.remove(&guid);
        }
        Some(npc)
    }

    // ------------------------------------------------------------------
    //  Broadcasts
    // ------------------------------------------------------------------

    pub fn broadcast_to_map(
        &self,
        sessions: &mut SessionManager,
        map_id: i32,
        frame: &[u8],
        exclude: Option<u32>,
    ) {
        for guid in self.players_on_map(map_id) {
            if Some(guid) == exclude {
                continue;
            }
            if let Some(player) = self.players.get(&guid) {
                sessions.send(player.session_id, frame);
            }
        }
    }

    /// Deliver to every player that can see `guid` (optionally including
    /// its own session).
    pub fn broadcast_to_visible(
        &self,
        sessions: &mut SessionManager,
        guid: u32,
        frame: &[u8],
        include_self: bool,
    ) {
        let Some(core) = self.entity_core(guid) else {
            return;
        };
        for other in self.players_on_map(core.map_id) {
            if other == guid && !include_self {
                continue;
            }
            if !self.can_see(other, guid) {
                continue;
            }
            if let Some(observer) = self.players.get(&other) {
                sessions.send(observer.session_id, frame);
            }
        }
    }

    pub fn broadcast_global(
        &self,
        sessions: &mut SessionManager,
        frame: &[u8],
        exclude: Option<u32>,
    ) {
        for guid in self.all_player_guids() {
            if Some(guid) == exclude {
                continue;
            }
            if let Some(player) = self.players.get(&guid) {
                sessions.send(player.session_id, frame);
            }
        }
    }

    /// Flush every entity's variable change set as object-variable
    /// broadcasts, once per tick.
    pub fn flush_dirty_variables(&mut self, sessions: &mut SessionManager) {
        let mut updates: Vec<(u32, Vec<(u16, i32)>)> = Vec::new();

        for guid in self.all_player_guids() {
            if let Some(player) = self.players.get_mut(&guid) {
                if player.core.has_dirty_vars() {
                    updates.push((guid, player.core.take_dirty_vars()));
                }
            }
        }
        for guid in self.all_npc_guids() {
            if let Some(npc) = self.npcs.get_mut(&guid) {
                if npc.core.has_dirty_vars() {
                    updates.push((guid, npc.core.take_dirty_vars()));
                }
            }
        }

        for (guid, vars) in updates {
            for (id, value) in vars {
                let frame = packets::object_variable(guid, id, value);
                self.broadcast_to_visible(sessions, guid, &frame, true);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::characters::CharacterRecord;
    use crate::world::npc::tests::goblin_template;

    fn make_player(guid: i32, session_id: u32, map_id: i32, x: f32) -> Player {
        let record = CharacterRecord {
            guid,
            account_id: guid,
            name: format!("Hero{guid}"),
            class_id: 1,
            level: 5,
            map_id,
            pos_x: x,
            pos_y: 100.0,
            health: 100,
            mana: 50,
            ..Default::default()
        };
        Player::from_record(&record, session_id, &[], &[], &[], &[], &[])
    }

    fn world() -> WorldManager {
        WorldManager::new(0.0, 1)
    }

    #[test]
    fn spawn_announces_both_ways() {
        let mut w = world();
        let mut sessions = SessionManager::new();
        let s1 = sessions.create(0);
        let s2 = sessions.create(0);

        w.spawn_player(make_player(1, s1, 1, 100.0), &mut sessions);
        assert!(sessions.get(s1).unwrap().pending_output().is_empty());

        w.spawn_player(make_player(2, s2, 1, 200.0), &mut sessions);
        // The first player hears about the second, and vice versa.
        assert!(!sessions.get(s1).unwrap().pending_output().is_empty());
        assert!(!sessions.get(s2).unwrap().pending_output().is_empty());
    }

    #[test]
    fn players_on_other_maps_are_invisible() {
        let mut w = world();
        let mut sessions = SessionManager::new();
        let s1 = sessions.create(0);
        let s2 = sessions.create(0);

        w.spawn_player(make_player(1, s1, 1, 100.0), &mut sessions);
        w.spawn_player(make_player(2, s2, 2, 100.0), &mut sessions);

        assert!(sessions.get(s1).unwrap().pending_output().is_empty());
        assert!(sessions.get(s2).unwrap().pending_output().is_empty());
        assert!(!w.can_see(1, 2));
    }

    #[test]
    fn despawn_of_unknown_guid_is_a_noop() {
        let mut w = world();
        let mut sessions = SessionManager::new();
        w.despawn_player(999, &mut sessions);
    }

    #[test]
    fn despawn_twice_emits_once() {
        let mut w = world();
        let mut sessions = SessionManager::new();
        let s1 = sessions.create(0);
        let s2 = sessions.create(0);
        w.spawn_player(make_player(1, s1, 1, 100.0), &mut sessions);
        w.spawn_player(make_player(2, s2, 1, 200.0), &mut sessions);
        sessions.get_mut(s1).unwrap().take_pending_output();

        w.despawn_player(2, &mut sessions);
        let first = sessions.get_mut(s1).unwrap().take_pending_output();
        assert!(!first.is_empty());

        w.despawn_player(2, &mut sessions);
        assert!(sessions.get(s1).unwrap().pending_output().is_empty());
    }

    #[test]
    fn view_distance_limits_visibility_with_hysteresis() {
        let mut w = WorldManager::new(100.0, 1);
        let mut sessions = SessionManager::new();
        let s1 = sessions.create(0);
        let s2 = sessions.create(0);

        w.spawn_player(make_player(1, s1, 1, 0.0), &mut sessions);
        w.spawn_player(make_player(2, s2, 1, 90.0), &mut sessions);
        assert!(w.can_see(1, 2));

        // Drift just past the plain threshold: the pair stays visible
        // inside the hysteresis band.
        w.player_mut(2).unwrap().core.set_position(105.0, 100.0);
        assert!(w.can_see(1, 2));

        // Past the band the pair drops out.
        w.player_mut(2).unwrap().core.set_position(115.0, 100.0);
        w.update_visibility(2, &mut sessions);
        assert!(!w.can_see(1, 2));

        // And must come all the way back inside the plain distance.
        w.player_mut(2).unwrap().core.set_position(105.0, 100.0);
        assert!(!w.can_see(1, 2));
        w.player_mut(2).unwrap().core.set_position(95.0, 100.0);
        assert!(w.can_see(1, 2));
    }

    #[test]
    fn map_change_reindexes_and_rebroadcasts() {
        let mut w = world();
        let mut sessions = SessionManager::new();
        let s1 = sessions.create(0);
        let s2 = sessions.create(0);
        w.spawn_player(make_player(1, s1, 1, 100.0), &mut sessions);
        w.spawn_player(make_player(2, s2, 1, 200.0), &mut sessions);
        sessions.get_mut(s2).unwrap().take_pending_output();

        w.change_player_map(1, 2, 300.0, 300.0, 0.0, &mut sessions);

        assert_eq!(w.players_on_map(1), vec![2]);
        assert_eq!(w.players_on_map(2), vec![1]);
        let moved = w.player(1).unwrap();
        assert_eq!(moved.core.map_id, 2);
        assert_eq!(moved.core.x, 300.0);
        // The stay-behind observer saw the despawn.
        assert!(!sessions.get(s2).unwrap().pending_output().is_empty());
        assert!(!w.can_see(1, 2));
    }

    #[test]
    fn npc_guids_allocate_from_the_high_range() {
        let mut w = world();
        let guid = w.spawn_npc(&goblin_template(), 1, 50.0, 50.0, 0.0);
        assert!(is_npc_guid(guid));
        assert_eq!(w.npcs_on_map(1), vec![guid]);
        assert!(w.entity_core(guid).is_some());
    }

    #[test]
    fn despawned_npc_leaves_the_map_index_but_not_the_registry() {
        let mut w = world();
        let mut sessions = SessionManager::new();
        let guid = w.spawn_npc(&goblin_template(), 1, 50.0, 50.0, 0.0);

        w.despawn_npc(guid, &mut sessions);
        assert!(w.npcs_on_map(1).is_empty());
        assert!(w.npc(guid).is_some());

        w.reinstate_npc(guid, &mut sessions);
        assert_eq!(w.npcs_on_map(1), vec![guid]);
    }

    #[test]
    fn dirty_variables_flush_once() {
        let mut w = world();
        let mut sessions = SessionManager::new();
        let s1 = sessions.create(0);
        w.spawn_player(make_player(1, s1, 1, 100.0), &mut sessions);

        w.player_mut(1)
            .unwrap()
            .core
            .set_var(duskmere_core::defines::object::Variable::Health, 55);
        w.flush_dirty_variables(&mut sessions);
        assert!(!sessions.get(s1).unwrap().pending_output().is_empty());

        sessions.get_mut(s1).unwrap().take_pending_output();
        w.flush_dirty_variables(&mut sessions);
        assert!(sessions.get(s1).unwrap().pending_output().is_empty());
    }
}
