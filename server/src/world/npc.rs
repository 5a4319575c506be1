//! NPC instance state: AI, threat, movement bookkeeping, corpse loot.

use duskmere_core::defines::npc::Movement;
use duskmere_core::defines::object::Variable;

use crate::combat::threat::ThreatTable;
use crate::db::game_data::{NpcTemplate, Waypoint};
use crate::world::entity::{EntityCore, EntityKind};

/// Distance from the spawn point beyond which combat is abandoned.
pub const LEASH_DISTANCE: f32 = 1600.0;

/// Melee reach in world units.
pub const MELEE_RANGE: f32 = 96.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiState {
    Idle,
    Wandering,
    Chasing,
    Combat,
    Evading,
    Dead,
    Despawned,
}

#[derive(Debug, Clone)]
pub struct LootItem {
    pub entry: i32,
    pub count: i32,
    pub looted: bool,
}

/// Per-corpse loot, populated from the template's loot table on death.
#[derive(Debug, Clone)]
pub struct LootContainer {
    pub items: Vec<LootItem>,
    /// Only the killer may pick the corpse.
    pub owner_guid: u32,
}

impl LootContainer {
    pub fn is_empty(&self) -> bool {
        self.items.iter().all(|item| item.looted)
    }
}

pub struct Npc {
    pub core: EntityCore,
    pub entry: i32,
    pub spawn_id: i32,
    pub ai_state: AiState,
    pub threat: ThreatTable,
    pub movement: Movement,
    pub waypoints: Vec<Waypoint>,
    pub waypoint_index: usize,
    pub waypoint_wait_ms: i32,
    pub home_x: f32,
    pub home_y: f32,
    pub home_orientation: f32,
    pub wander_radius: f32,
    pub wander_timer_ms: i32,
    pub wander_target: Option<(f32, f32)>,
    pub attack_timer_ms: i32,
    pub call_for_help: bool,
    pub called_for_help: bool,
    pub respawn_secs: i32,
    pub loot: Option<LootContainer>,
}

impl Npc {
    pub fn from_template(
        guid: u32,
        template: &NpcTemplate,
        map_id: i32,
        x: f32,
        y: f32,
        orientation: f32,
    ) -> Npc {
        let mut core = EntityCore::new(guid, EntityKind::Npc, &template.name);
        core.map_id = map_id;
        core.set_position(x, y);
        core.orientation = orientation;
        core.set_var(Variable::Level, template.level);
        core.set_var(Variable::MaxHealth, template.max_health.max(1));
        core.set_var(Variable::Health, template.max_health.max(1));
        core.set_var(Variable::MaxMana, template.max_mana.max(0));
        core.set_var(Variable::Mana, template.max_mana.max(0));
        core.set_var(Variable::Faction, template.faction as i32);
        core.set_var(Variable::ModelId, template.model_id);
        core.base_model_id = template.model_id;
        core.take_dirty_vars();

        Npc {
            core,
            entry: template.entry,
            spawn_id: 0,
            ai_state: match template.movement_type {
                Movement::Random => AiState::Wandering,
                _ => AiState::Idle,
            },
            threat: ThreatTable::new(),
            movement: template.movement_type,
            waypoints: Vec::new(),
            waypoint_index: 0,
            waypoint_wait_ms: 0,
            home_x: x,
            home_y: y,
            home_orientation: orientation,
            wander_radius: 0.0,
            wander_timer_ms: 0,
            wander_target: None,
            attack_timer_ms: 0,
            call_for_help: false,
            called_for_help: false,
            respawn_secs: 60,
            loot: None,
        }
    }

    pub fn guid(&self) -> u32 {
        self.core.guid
    }

    pub fn is_alive(&self) -> bool {
        !self.core.dead && self.ai_state != AiState::Despawned
    }

    /// Restore to full at the spawn point; used for in-place respawn and
    /// at the end of an evade.
    pub fn revive(&mut self) {
        self.core.dead = false;
        self.core.set_position(self.home_x, self.home_y);
        self.core.orientation = self.home_orientation;
        let max_health = self.core.max_health();
        let max_mana = self.core.max_mana();
        self.core.set_var(Variable::Health, max_health);
        self.core.set_var(Variable::Mana, max_mana);
        self.core.set_var(Variable::IsDead, 0);
        self.threat.clear();
        self.loot = None;
        self.called_for_help = false;
        self.waypoint_index = 0;
        self.waypoint_wait_ms = 0;
        self.wander_target = None;
        self.attack_timer_ms = 0;
        self.ai_state = match self.movement {
            Movement::Random => AiState::Wandering,
            _ => AiState::Idle,
        };
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use duskmere_core::defines::unit::{Faction, NpcFlags};

    pub(crate) fn goblin_template() -> NpcTemplate {
        NpcTemplate {
            entry: 2001,
            name: "Goblin".to_string(),
            level: 6,
            faction: Faction::Hostile,
            flags: NpcFlags::empty(),
            max_health: 40,
            max_mana: 0,
            min_damage: 2,
            max_damage: 4,
            armor: 5,
            attack_period_ms: 2000,
            aggro_radius: 320.0,
            move_speed: 150.0,
            movement_type: Movement::None,
            path_id: 0,
            loot_id: 0,
            gossip_menu_id: 0,
            model_id: 12,
        }
    }

    #[test]
    fn template_instantiation_primes_variables() {
        let npc = Npc::from_template(0x8000_0001, &goblin_template(), 1, 50.0, 60.0, 0.5);
        assert_eq!(npc.guid(), 0x8000_0001);
        assert_eq!(npc.core.level(), 6);
        assert_eq!(npc.core.health(), 40);
        assert_eq!(npc.core.var(Variable::Faction), Faction::Hostile as i32);
        assert_eq!(npc.home_x, 50.0);
        assert!(npc.is_alive());
        assert!(!npc.core.has_dirty_vars());
    }

    #[test]
    fn revive_restores_spawn_state() {
        let mut npc = Npc::from_template(0x8000_0001, &goblin_template(), 1, 50.0, 60.0, 0.5);
        npc.core.set_position(500.0, 500.0);
        npc.core.set_var(Variable::Health, 0);
        npc.core.dead = true;
        npc.ai_state = AiState::Dead;
        npc.threat.add(1, 100);
        npc.loot = Some(LootContainer {
            items: vec![],
            owner_guid: 1,
        });

        npc.revive();
        assert!(npc.is_alive());
        assert_eq!(npc.core.health(), 40);
        assert_eq!(npc.core.x, 50.0);
        assert_eq!(npc.ai_state, AiState::Idle);
        assert!(!npc.threat.has_threat());
        assert!(npc.loot.is_none());
    }
}
