//! Player entity: an entity core plus everything a connected character
//! owns: inventory, equipment, bank, quest log, stat investments,
//! cooldowns, the pending cast, and save bookkeeping.

use std::collections::{HashMap, HashSet, VecDeque};

use duskmere_core::defines::object::{stat_variable, Variable};
use duskmere_core::defines::player::{Class, BANK_SLOTS, INVENTORY_SLOTS};
use duskmere_core::defines::unit::Stat;

use crate::combat::auras;
use crate::combat::cooldowns::CooldownHolder;
use crate::db::characters::{CharacterRecord, ItemRow, PlayerSnapshot, QuestRow};
use crate::db::game_data::GameData;
use crate::systems::equipment::Equipment;
use crate::systems::inventory::Inventory;
use crate::systems::quests::QuestLog;
use crate::systems::vendor::BuybackEntry;
use crate::world::entity::{EntityCore, EntityKind};

/// Seconds between periodic saves of a dirty player.
pub const SAVE_INTERVAL_SECS: f32 = 30.0;

#[derive(Debug, Clone, Copy)]
pub struct PendingCast {
    pub spell_id: i32,
    pub target_guid: u32,
    pub remaining_ms: i32,
}

pub struct Player {
    pub core: EntityCore,
    /// Owning session; resolved through the session registry, never stored
    /// as a pointer.
    pub session_id: u32,
    pub account_id: i32,
    pub class: Class,
    pub gender: u8,
    pub portrait_id: i32,
    pub inventory: Inventory,
    pub equipment: Equipment,
    pub bank: Inventory,
    pub quest_log: QuestLog,
    /// Manually invested level-up points per stat id.
    stat_bonuses: HashMap<u16, i32>,
    pub unspent_stat_points: i32,
    pub cooldowns: CooldownHolder,
    pub pending_cast: Option<PendingCast>,
    pub selected_target: u32,
    pub gossip_target: u32,
    pub buyback: HashMap<i32, VecDeque<BuybackEntry>>,
    pub ignore_list: HashSet<u32>,
    pub chat_timestamps: VecDeque<i64>,
    pub moving: bool,
    pub played_time: i32,
    pub save_timer: f32,
    dirty: bool,
}

impl Player {
    /// Build a live player from its character record and sub-store rows.
    pub fn from_record(
        record: &CharacterRecord,
        session_id: u32,
        inventory_rows: &[ItemRow],
        bank_rows: &[ItemRow],
        equipment_rows: &[ItemRow],
        quest_rows: &[QuestRow],
        stat_bonus_rows: &[(u16, i32)],
    ) -> Player {
        let mut core = EntityCore::new(record.guid as u32, EntityKind::Player, &record.name);
        core.map_id = record.map_id;
        core.set_position(record.pos_x, record.pos_y);
        core.orientation = record.facing;
        core.set_var(Variable::Level, record.level);
        core.set_var(Variable::Experience, record.experience);
        core.set_var(Variable::Gold, record.gold);
        core.set_var(Variable::MaxHealth, record.health.max(1));
        core.set_var(Variable::Health, record.health.max(1));
        core.set_var(Variable::MaxMana, record.mana.max(0));
        core.set_var(Variable::Mana, record.mana.max(0));
        core.dead = false;
        // Construction writes are baseline state, not changes to announce.
        core.take_dirty_vars();

        let mut inventory = Inventory::new(INVENTORY_SLOTS);
        inventory.load_rows(inventory_rows);
        let mut bank = Inventory::new(BANK_SLOTS);
        bank.load_rows(bank_rows);
        let mut equipment = Equipment::new();
        equipment.load_rows(equipment_rows);
        let mut quest_log = QuestLog::new();
        quest_log.load_rows(quest_rows);

        // One point per level gained; whatever is not in the bonus table is
        // still unspent.
        let invested: i32 = stat_bonus_rows.iter().map(|(_, v)| v).sum();
        let unspent = ((record.level - 1) - invested).max(0);

        Player {
            core,
            session_id,
            account_id: record.account_id,
            class: Class::from_id(record.class_id).unwrap_or(Class::Paladin),
            gender: record.gender,
            portrait_id: record.portrait_id,
            inventory,
            equipment,
            bank,
            quest_log,
            stat_bonuses: stat_bonus_rows.iter().copied().collect(),
            unspent_stat_points: unspent,
            cooldowns: CooldownHolder::new(),
            pending_cast: None,
            selected_target: 0,
            gossip_target: 0,
            buyback: HashMap::new(),
            ignore_list: HashSet::new(),
            chat_timestamps: VecDeque::new(),
            moving: false,
            played_time: record.played_time,
            save_timer: 0.0,
            dirty: false,
        }
    }

    pub fn guid(&self) -> u32 {
        self.core.guid
    }

    pub fn level(&self) -> i32 {
        self.core.level()
    }

    pub fn gold(&self) -> i32 {
        self.core.var(Variable::Gold)
    }

    pub fn add_gold(&mut self, amount: i32) {
        let gold = self.gold().saturating_add(amount).max(0);
        self.core.set_var(Variable::Gold, gold);
        self.mark_dirty();
    }

    /// Spend gold; false (and no change) when short.
    pub fn spend_gold(&mut self, amount: i32) -> bool {
        if amount < 0 || self.gold() < amount {
            return false;
        }
        self.core.set_var(Variable::Gold, self.gold() - amount);
        self.mark_dirty();
        true
    }

    // ------------------------------------------------------------------
    //  Stat investment
    // ------------------------------------------------------------------

    pub fn invested(&self, stat: Stat) -> i32 {
        self.stat_bonuses
            .get(&(stat as u16))
            .copied()
            .unwrap_or(0)
    }

    pub fn invested_total(&self) -> i32 {
        self.stat_bonuses.values().sum()
    }

    /// Spend one unspent point on a primary stat.
    pub fn invest_point(&mut self, stat: Stat) -> bool {
        if self.unspent_stat_points <= 0 {
            return false;
        }
        self.unspent_stat_points -= 1;
        *self.stat_bonuses.entry(stat as u16).or_insert(0) += 1;
        self.mark_dirty();
        true
    }

    /// Refund every invested point.
    pub fn respec(&mut self) -> i32 {
        let refunded = self.invested_total();
        self.stat_bonuses.clear();
        self.unspent_stat_points += refunded;
        self.mark_dirty();
        refunded
    }

    /// Manual investments + worn equipment + stat auras, the total the
    /// level table is combined with.
    pub fn total_stat_bonus(&self, data: &GameData, stat: Stat) -> i32 {
        self.invested(stat) + self.equipment.stat_bonus(data, stat) + auras::stat_bonus(&self.core, stat)
    }

    pub fn stat_value(&self, stat: Stat) -> i32 {
        self.core.var_id(stat_variable(stat))
    }

    // ------------------------------------------------------------------
    //  Save bookkeeping
    // ------------------------------------------------------------------

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
        self.save_timer = 0.0;
    }

    /// Capture the full persistent state as plain rows.
    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            character: CharacterRecord {
                guid: self.guid() as i32,
                account_id: self.account_id,
                name: self.core.name.clone(),
                class_id: self.class as u8,
                gender: self.gender,
                portrait_id: self.portrait_id,
                level: self.level(),
                experience: self.core.var(Variable::Experience),
                gold: self.gold(),
                map_id: self.core.map_id,
                pos_x: self.core.x,
                pos_y: self.core.y,
                facing: self.core.orientation,
                health: self.core.health(),
                mana: self.core.mana(),
                played_time: self.played_time,
            },
            inventory: self.inventory.to_rows(),
            bank: self.bank.to_rows(),
            equipment: self.equipment.to_rows(),
            quests: self.quest_log.to_rows(),
            stat_bonuses: {
                let mut rows: Vec<(u16, i32)> = self
                    .stat_bonuses
                    .iter()
                    .filter(|(_, &v)| v != 0)
                    .map(|(&k, &v)| (k, v))
                    .collect();
                rows.sort_unstable();
                rows
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_record() -> CharacterRecord {
        CharacterRecord {
            guid: 7,
            account_id: 1,
            name: "Anna".to_string(),
            class_id: 1,
            level: 5,
            experience: 120,
            gold: 40,
            map_id: 1,
            pos_x: 100.0,
            pos_y: 100.0,
            health: 100,
            mana: 60,
            ..Default::default()
        }
    }

    fn player() -> Player {
        Player::from_record(&sample_record(), 1, &[], &[], &[], &[], &[])
    }

    #[test]
    fn construction_maps_record_into_variables() {
        let p = player();
        assert_eq!(p.guid(), 7);
        assert_eq!(p.level(), 5);
        assert_eq!(p.gold(), 40);
        assert_eq!(p.core.health(), 100);
        assert_eq!(p.core.mana(), 60);
        // Baseline writes must not look like per-tick changes.
        assert!(!p.core.has_dirty_vars());
    }

    #[test]
    fn gold_spending_is_guarded() {
        let mut p = player();
        assert!(!p.spend_gold(41));
        assert_eq!(p.gold(), 40);
        assert!(p.spend_gold(15));
        assert_eq!(p.gold(), 25);
    }

    #[test]
    fn stat_investment_spends_earned_points() {
        // Level 5 grants four points; none invested yet.
        let mut p = player();
        assert_eq!(p.unspent_stat_points, 4);

        for _ in 0..4 {
            assert!(p.invest_point(Stat::Strength));
        }
        assert!(!p.invest_point(Stat::Agility));

        assert_eq!(p.invested(Stat::Strength), 4);
        assert_eq!(p.invested_total(), 4);

        assert_eq!(p.respec(), 4);
        assert_eq!(p.invested_total(), 0);
        assert_eq!(p.unspent_stat_points, 4);
    }

    #[test]
    fn loaded_bonuses_reduce_unspent_points() {
        let p = Player::from_record(&sample_record(), 1, &[], &[], &[], &[], &[(4, 3)]);
        assert_eq!(p.invested(Stat::Strength), 3);
        assert_eq!(p.unspent_stat_points, 1);
    }

    #[test]
    fn snapshot_round_trips_through_from_record() {
        let mut p = player();
        p.inventory.add(501, 3, 10, 0);
        p.add_gold(10);

        let snapshot = p.snapshot();
        assert_eq!(snapshot.character.gold, 50);
        assert_eq!(snapshot.inventory.len(), 1);

        let clone = Player::from_record(
            &snapshot.character,
            9,
            &snapshot.inventory,
            &snapshot.bank,
            &snapshot.equipment,
            &snapshot.quests,
            &snapshot.stat_bonuses,
        );
        assert_eq!(clone.gold(), 50);
        assert_eq!(clone.inventory.count_of(501), 3);
    }
}
