//! Read-only content cache.
//!
//! Loaded once at startup from the content store into immutable in-memory
//! tables keyed by entry id. Lookups hand out references; nothing mutates
//! after load. Spell formulas are compiled here so resolve-time evaluation
//! never parses.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

use duskmere_core::defines::npc::Movement;
use duskmere_core::defines::spell::{
    AuraType, EffectKind, InterruptFlags, School, SpellAttributes, TargetType, NUM_EFFECTS,
};
use duskmere_core::defines::unit::{EquipSlot, Faction, NpcFlags, Stat};

use crate::combat::cooldowns::DEFAULT_GCD_MS;
use crate::combat::expr::Program;
use crate::db::database::Database;

#[derive(Debug, Clone, Default)]
pub struct ItemStat {
    pub stat: Stat,
    pub amount: i32,
}

#[derive(Debug, Clone)]
pub struct ItemTemplate {
    pub entry: i32,
    pub name: String,
    /// `None` for items that cannot be worn.
    pub equip_slot: Option<EquipSlot>,
    pub armor: i32,
    pub min_damage: i32,
    pub max_damage: i32,
    pub max_stack: i32,
    pub required_level: i32,
    /// Bitmask of allowed class ids (bit N = class id N); 0 allows all.
    pub allowed_classes: u32,
    pub buy_price: i32,
    pub sell_price: i32,
    pub max_durability: i32,
    pub quality: u8,
    pub use_spell: i32,
    pub stats: Vec<ItemStat>,
}

#[derive(Debug, Clone, Default)]
pub struct SpellEffect {
    pub kind: EffectKind,
    pub base_points: i32,
    pub random_points: i32,
    pub formula: Option<Program>,
    pub target_type: TargetType,
    pub aura: AuraType,
    pub aura_period_ms: i32,
    pub misc: i32,
}

#[derive(Debug, Clone)]
pub struct SpellTemplate {
    pub entry: i32,
    pub name: String,
    pub school: School,
    pub attributes: SpellAttributes,
    pub interrupt_flags: InterruptFlags,
    pub cast_time_ms: i32,
    pub cooldown_ms: i32,
    pub category: i32,
    pub category_cooldown_ms: i32,
    pub gcd_ms: i32,
    pub mana_cost: i32,
    pub range: f32,
    pub radius: f32,
    pub duration_ms: i32,
    pub max_stacks: i32,
    pub crit_multiplier: f32,
    pub threat_override: i32,
    pub effects: [SpellEffect; NUM_EFFECTS],
}

impl Default for SpellTemplate {
    fn default() -> Self {
        SpellTemplate {
            entry: 0,
            name: String::new(),
            school: School::Physical,
            attributes: SpellAttributes::empty(),
            interrupt_flags: InterruptFlags::empty(),
            cast_time_ms: 0,
            cooldown_ms: 0,
            category: 0,
            category_cooldown_ms: 0,
            gcd_ms: DEFAULT_GCD_MS,
            mana_cost: 0,
            range: 0.0,
            radius: 0.0,
            duration_ms: 0,
            max_stacks: 1,
            crit_multiplier: 2.0,
            threat_override: 0,
            effects: Default::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NpcTemplate {
    pub entry: i32,
    pub name: String,
    pub level: i32,
    pub faction: Faction,
    pub flags: NpcFlags,
    pub max_health: i32,
    pub max_mana: i32,
    pub min_damage: i32,
    pub max_damage: i32,
    pub armor: i32,
    pub attack_period_ms: i32,
    pub aggro_radius: f32,
    pub move_speed: f32,
    pub movement_type: Movement,
    pub path_id: i32,
    pub loot_id: i32,
    pub gossip_menu_id: i32,
    pub model_id: i32,
}

#[derive(Debug, Clone, Default)]
pub struct QuestTemplate {
    pub entry: i32,
    pub title: String,
    pub min_level: i32,
    pub prev_quests: [i32; 3],
    pub start_npc: i32,
    pub end_npc: i32,
    pub req_npc: [i32; 4],
    pub req_item: [i32; 4],
    pub req_spell: [i32; 4],
    pub req_count: [i32; 4],
    pub reward_xp: i32,
    pub reward_gold: i32,
    pub reward_item: i32,
    pub reward_item_count: i32,
    pub flags: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ClassLevelStats {
    pub health: i32,
    pub mana: i32,
    pub strength: i32,
    pub agility: i32,
    pub willpower: i32,
    pub intelligence: i32,
    pub courage: i32,
}

#[derive(Debug, Clone, Default)]
pub struct ExpLevelInfo {
    /// Experience needed to advance past this level.
    pub required_exp: i32,
    /// Base experience granted for killing an NPC of this level.
    pub kill_exp: i32,
}

#[derive(Debug, Clone)]
pub struct LootEntry {
    pub item_entry: i32,
    /// Independent drop chance in percent.
    pub chance: f32,
    pub min_count: i32,
    pub max_count: i32,
}

#[derive(Debug, Clone, Default)]
pub struct GossipMenu {
    pub id: i32,
    pub text_id: i32,
}

#[derive(Debug, Clone)]
pub struct GossipOption {
    pub id: i32,
    pub icon: i32,
    pub text: String,
    pub action: i32,
}

#[derive(Debug, Clone)]
pub struct VendorItem {
    pub slot: i32,
    pub item_entry: i32,
}

#[derive(Debug, Clone, Default)]
pub struct SpawnRow {
    pub spawn_id: i32,
    pub npc_entry: i32,
    pub map_id: i32,
    pub x: f32,
    pub y: f32,
    pub orientation: f32,
    pub respawn_secs: i32,
    pub movement_type: i32,
    pub path_id: i32,
    pub wander_distance: f32,
    pub call_for_help: bool,
}

#[derive(Debug, Clone, Default)]
pub struct GroupEntry {
    pub member_spawn_id: i32,
    pub linked_respawn: bool,
    pub linked_loot: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Waypoint {
    pub x: f32,
    pub y: f32,
    pub orientation: f32,
    pub wait_ms: i32,
}

#[derive(Debug, Clone, Default)]
pub struct MapTemplate {
    pub id: i32,
    pub name: String,
    pub start_x: f32,
    pub start_y: f32,
    pub start_facing: f32,
    pub preload: bool,
}

/// All template tables, immutable after load.
#[derive(Default)]
pub struct GameData {
    pub items: HashMap<i32, ItemTemplate>,
    pub spells: HashMap<i32, SpellTemplate>,
    pub npcs: HashMap<i32, NpcTemplate>,
    pub quests: HashMap<i32, QuestTemplate>,
    pub class_stats: HashMap<(u8, i32), ClassLevelStats>,
    pub exp_levels: HashMap<i32, ExpLevelInfo>,
    pub max_level: i32,
    pub loot_tables: HashMap<i32, Vec<LootEntry>>,
    pub gossip_menus: HashMap<i32, GossipMenu>,
    pub gossip_options: HashMap<i32, Vec<GossipOption>>,
    pub vendor_stock: HashMap<i32, Vec<VendorItem>>,
    pub spawns: HashMap<i32, SpawnRow>,
    pub spawns_by_map: HashMap<i32, Vec<i32>>,
    pub groups_by_leader: HashMap<i32, Vec<GroupEntry>>,
    pub spawn_to_group_leader: HashMap<i32, i32>,
    pub waypoints: HashMap<i32, Vec<Waypoint>>,
    pub maps: HashMap<i32, MapTemplate>,
}

impl GameData {
    pub fn get_item(&self, entry: i32) -> Option<&ItemTemplate> {
        self.items.get(&entry)
    }

    pub fn get_spell(&self, entry: i32) -> Option<&SpellTemplate> {
        self.spells.get(&entry)
    }

    pub fn get_npc(&self, entry: i32) -> Option<&NpcTemplate> {
        self.npcs.get(&entry)
    }

    pub fn get_quest(&self, entry: i32) -> Option<&QuestTemplate> {
        self.quests.get(&entry)
    }

    pub fn get_class_stats(&self, class_id: u8, level: i32) -> Option<&ClassLevelStats> {
        self.class_stats.get(&(class_id, level))
    }

    /// Experience needed to advance past `level`; 0 when unknown.
    pub fn exp_for_level(&self, level: i32) -> i32 {
        self.exp_levels
            .get(&level)
            .map(|info| info.required_exp)
            .unwrap_or(0)
    }

    /// Base experience a kill of an NPC of `level` is worth.
    pub fn kill_base_exp(&self, level: i32) -> i32 {
        self.exp_levels
            .get(&level)
            .map(|info| info.kill_exp)
            .unwrap_or(0)
    }

    pub fn loot_entries(&self, loot_id: i32) -> &[LootEntry] {
        self.loot_tables
            .get(&loot_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn gossip_options(&self, menu_id: i32) -> &[GossipOption] {
        self.gossip_options
            .get(&menu_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn vendor_items(&self, npc_entry: i32) -> &[VendorItem] {
        self.vendor_stock
            .get(&npc_entry)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn spawn_ids_for_map(&self, map_id: i32) -> &[i32] {
        self.spawns_by_map
            .get(&map_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn waypoints_for_path(&self, path_id: i32) -> &[Waypoint] {
        self.waypoints
            .get(&path_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn get_map(&self, map_id: i32) -> Option<&MapTemplate> {
        self.maps.get(&map_id)
    }

    /// Map ids flagged for preloading at boot (start zones).
    pub fn preload_map_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self
            .maps
            .values()
            .filter(|m| m.preload)
            .map(|m| m.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Load every template table from the read-only content store.
    pub fn load_from_database(path: impl AsRef<Path>) -> Result<GameData> {
        let path = path.as_ref();
        let db = Database::open_read_only(path)
            .with_context(|| format!("could not open content store {}", path.display()))?;

        let mut data = GameData::default();
        data.load_items(&db)?;
        data.load_spells(&db)?;
        data.load_npcs(&db)?;
        data.load_quests(&db)?;
        data.load_class_stats(&db)?;
        data.load_exp_levels(&db)?;
        data.load_loot_tables(&db)?;
        data.load_gossip(&db)?;
        data.load_vendor_stock(&db)?;
        data.load_spawns(&db)?;
        data.load_groups(&db)?;
        data.load_waypoints(&db)?;
        data.load_maps(&db)?;

        log::info!(
            "Game data loaded: {} items, {} spells, {} NPCs, {} quests, {} maps, {} spawns",
            data.items.len(),
            data.spells.len(),
            data.npcs.len(),
            data.quests.len(),
            data.maps.len(),
            data.spawns.len(),
        );

        Ok(data)
    }

    fn load_items(&mut self, db: &Database) -> Result<()> {
        self.items = db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT entry, name, equip_slot, armor, min_damage, max_damage, max_stack, \
                 required_level, allowed_classes, buy_price, sell_price, max_durability, \
                 quality, use_spell, \
                 stat0_type, stat0_value, stat1_type, stat1_value, stat2_type, stat2_value \
                 FROM item_template",
            )?;
            let rows = stmt.query_map([], |r| {
                let mut stats = Vec::new();
                for i in 0..3 {
                    let stat_type: i32 = r.get(14 + i * 2)?;
                    let amount: i32 = r.get(15 + i * 2)?;
                    if let Some(stat) = Stat::from_id(stat_type as u16) {
                        if amount != 0 {
                            stats.push(ItemStat { stat, amount });
                        }
                    }
                }
                Ok(ItemTemplate {
                    entry: r.get(0)?,
                    name: r.get(1)?,
                    equip_slot: EquipSlot::from_id(r.get::<_, i32>(2)? as u8),
                    armor: r.get(3)?,
                    min_damage: r.get(4)?,
                    max_damage: r.get(5)?,
                    max_stack: r.get::<_, i32>(6)?.max(1),
                    required_level: r.get(7)?,
                    allowed_classes: r.get::<_, i64>(8)? as u32,
                    buy_price: r.get(9)?,
                    sell_price: r.get(10)?,
                    max_durability: r.get(11)?,
                    quality: r.get::<_, i32>(12)? as u8,
                    use_spell: r.get(13)?,
                    stats,
                })
            })?;
            rows.map(|row| row.map(|item| (item.entry, item))).collect()
        })?;
        Ok(())
    }

    fn load_spells(&mut self, db: &Database) -> Result<()> {
        self.spells = db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT entry, name, school, attributes, interrupt_flags, cast_time_ms, \
                 cooldown_ms, category, category_cooldown_ms, gcd_ms, mana_cost, range, radius, \
                 duration_ms, max_stacks, crit_multiplier, threat_override, \
                 effect0_type, effect0_base, effect0_random, effect0_formula, effect0_target, \
                 effect0_aura, effect0_period_ms, effect0_misc, \
                 effect1_type, effect1_base, effect1_random, effect1_formula, effect1_target, \
                 effect1_aura, effect1_period_ms, effect1_misc, \
                 effect2_type, effect2_base, effect2_random, effect2_formula, effect2_target, \
                 effect2_aura, effect2_period_ms, effect2_misc \
                 FROM spell_template",
            )?;
            let rows = stmt.query_map([], |r| {
                let mut effects: [SpellEffect; NUM_EFFECTS] = Default::default();
                for (i, effect) in effects.iter_mut().enumerate() {
                    let base = 17 + i * 8;
                    let formula_text: Option<String> = r.get(base + 3)?;
                    *effect = SpellEffect {
                        kind: EffectKind::from_id(r.get(base)?),
                        base_points: r.get(base + 1)?,
                        random_points: r.get(base + 2)?,
                        formula: formula_text.as_deref().filter(|t| !t.is_empty()).and_then(
                            |text| match Program::parse(text) {
                                Ok(program) => Some(program),
                                Err(e) => {
                                    log::error!("Bad spell formula '{text}': {e}");
                                    None
                                }
                            },
                        ),
                        target_type: TargetType::from_id(r.get(base + 4)?),
                        aura: AuraType::from_id(r.get(base + 5)?),
                        aura_period_ms: r.get(base + 6)?,
                        misc: r.get(base + 7)?,
                    };
                }
                let gcd_ms: i32 = r.get(9)?;
                Ok(SpellTemplate {
                    entry: r.get(0)?,
                    name: r.get(1)?,
                    school: School::from_id(r.get::<_, i32>(2)? as u8),
                    attributes: SpellAttributes::from_bits_truncate(r.get::<_, i64>(3)? as u64),
                    interrupt_flags: InterruptFlags::from_bits_truncate(
                        r.get::<_, i64>(4)? as u32
                    ),
                    cast_time_ms: r.get(5)?,
                    cooldown_ms: r.get(6)?,
                    category: r.get(7)?,
                    category_cooldown_ms: r.get(8)?,
                    gcd_ms: if gcd_ms < 0 { DEFAULT_GCD_MS } else { gcd_ms },
                    mana_cost: r.get(10)?,
                    range: r.get::<_, f64>(11)? as f32,
                    radius: r.get::<_, f64>(12)? as f32,
                    duration_ms: r.get(13)?,
                    max_stacks: r.get::<_, i32>(14)?.max(1),
                    crit_multiplier: r.get::<_, f64>(15)? as f32,
                    threat_override: r.get(16)?,
                    effects,
                })
            })?;
            rows.map(|row| row.map(|spell| (spell.entry, spell))).collect()
        })?;
        Ok(())
    }

    fn load_npcs(&mut self, db: &Database) -> Result<()> {
        self.npcs = db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT entry, name, level, faction, npc_flags, max_health, max_mana, \
                 min_damage, max_damage, armor, attack_period_ms, aggro_radius, move_speed, \
                 movement_type, path_id, loot_id, gossip_menu_id, model_id FROM npc_template",
            )?;
            let rows = stmt.query_map([], |r| {
                Ok(NpcTemplate {
                    entry: r.get(0)?,
                    name: r.get(1)?,
                    level: r.get(2)?,
                    faction: Faction::from_id(r.get::<_, i32>(3)? as u8),
                    flags: NpcFlags::from_bits_truncate(r.get::<_, i64>(4)? as u32),
                    max_health: r.get(5)?,
                    max_mana: r.get(6)?,
                    min_damage: r.get(7)?,
                    max_damage: r.get(8)?,
                    armor: r.get(9)?,
                    attack_period_ms: r.get::<_, i32>(10)?.max(500),
                    aggro_radius: r.get::<_, f64>(11)? as f32,
                    move_speed: r.get::<_, f64>(12)? as f32,
                    movement_type: Movement::from_id(r.get(13)?),
                    path_id: r.get(14)?,
                    loot_id: r.get(15)?,
                    gossip_menu_id: r.get(16)?,
                    model_id: r.get(17)?,
                })
            })?;
            rows.map(|row| row.map(|npc| (npc.entry, npc))).collect()
        })?;
        Ok(())
    }

    fn load_quests(&mut self, db: &Database) -> Result<()> {
        self.quests = db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT entry, title, min_level, prev_quest0, prev_quest1, prev_quest2, \
                 start_npc, end_npc, \
                 req_npc0, req_npc1, req_npc2, req_npc3, \
                 req_item0, req_item1, req_item2, req_item3, \
                 req_spell0, req_spell1, req_spell2, req_spell3, \
                 req_count0, req_count1, req_count2, req_count3, \
                 reward_xp, reward_gold, reward_item, reward_item_count, flags \
                 FROM quest_template",
            )?;
            let rows = stmt.query_map([], |r| {
                Ok(QuestTemplate {
                    entry: r.get(0)?,
                    title: r.get(1)?,
                    min_level: r.get(2)?,
                    prev_quests: [r.get(3)?, r.get(4)?, r.get(5)?],
                    start_npc: r.get(6)?,
                    end_npc: r.get(7)?,
                    req_npc: [r.get(8)?, r.get(9)?, r.get(10)?, r.get(11)?],
                    req_item: [r.get(12)?, r.get(13)?, r.get(14)?, r.get(15)?],
                    req_spell: [r.get(16)?, r.get(17)?, r.get(18)?, r.get(19)?],
                    req_count: [r.get(20)?, r.get(21)?, r.get(22)?, r.get(23)?],
                    reward_xp: r.get(24)?,
                    reward_gold: r.get(25)?,
                    reward_item: r.get(26)?,
                    reward_item_count: r.get(27)?,
                    flags: r.get::<_, i64>(28)? as u32,
                })
            })?;
            rows.map(|row| row.map(|quest| (quest.entry, quest))).collect()
        })?;
        Ok(())
    }

    fn load_class_stats(&mut self, db: &Database) -> Result<()> {
        self.class_stats = db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT class_id, level, health, mana, strength, agility, willpower, \
                 intelligence, courage FROM class_level_stats",
            )?;
            let rows = stmt.query_map([], |r| {
                Ok((
                    (r.get::<_, i32>(0)? as u8, r.get::<_, i32>(1)?),
                    ClassLevelStats {
                        health: r.get(2)?,
                        mana: r.get(3)?,
                        strength: r.get(4)?,
                        agility: r.get(5)?,
                        willpower: r.get(6)?,
                        intelligence: r.get(7)?,
                        courage: r.get(8)?,
                    },
                ))
            })?;
            rows.collect()
        })?;
        Ok(())
    }

    fn load_exp_levels(&mut self, db: &Database) -> Result<()> {
        self.exp_levels = db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT level, required_exp, kill_exp FROM exp_level")?;
            let rows = stmt.query_map([], |r| {
                Ok((
                    r.get::<_, i32>(0)?,
                    ExpLevelInfo {
                        required_exp: r.get(1)?,
                        kill_exp: r.get(2)?,
                    },
                ))
            })?;
            rows.collect()
        })?;
        self.max_level = self.exp_levels.keys().copied().max().unwrap_or(1);
        Ok(())
    }

    fn load_loot_tables(&mut self, db: &Database) -> Result<()> {
        db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT loot_id, item_entry, chance, min_count, max_count FROM loot_table",
            )?;
            let mut rows = stmt.query([])?;
            while let Some(r) = rows.next()? {
                let loot_id: i32 = r.get(0)?;
                self.loot_tables.entry(loot_id).or_default().push(LootEntry {
                    item_entry: r.get(1)?,
                    chance: r.get::<_, f64>(2)? as f32,
                    min_count: r.get::<_, i32>(3)?.max(1),
                    max_count: r.get::<_, i32>(4)?.max(1),
                });
            }
            Ok(())
        })
    }

    fn load_gossip(&mut self, db: &Database) -> Result<()> {
        self.gossip_menus = db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, text_id FROM gossip_menu")?;
            let rows = stmt.query_map([], |r| {
                Ok((
                    r.get::<_, i32>(0)?,
                    GossipMenu {
                        id: r.get(0)?,
                        text_id: r.get(1)?,
                    },
                ))
            })?;
            rows.collect()
        })?;

        db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT menu_id, id, icon, text, action FROM gossip_option ORDER BY menu_id, id",
            )?;
            let mut rows = stmt.query([])?;
            while let Some(r) = rows.next()? {
                let menu_id: i32 = r.get(0)?;
                self.gossip_options
                    .entry(menu_id)
                    .or_default()
                    .push(GossipOption {
                        id: r.get(1)?,
                        icon: r.get(2)?,
                        text: r.get(3)?,
                        action: r.get(4)?,
                    });
            }
            Ok(())
        })
    }

    fn load_vendor_stock(&mut self, db: &Database) -> Result<()> {
        db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT npc_entry, slot, item_entry FROM vendor_stock ORDER BY npc_entry, slot",
            )?;
            let mut rows = stmt.query([])?;
            while let Some(r) = rows.next()? {
                let npc_entry: i32 = r.get(0)?;
                self.vendor_stock
                    .entry(npc_entry)
                    .or_default()
                    .push(VendorItem {
                        slot: r.get(1)?,
                        item_entry: r.get(2)?,
                    });
            }
            Ok(())
        })
    }

    fn load_spawns(&mut self, db: &Database) -> Result<()> {
        db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT guid, entry, map, position_x, position_y, orientation, respawn_time, \
                 movement_type, path_id, wander_distance, call_for_help FROM npc",
            )?;
            let mut rows = stmt.query([])?;
            while let Some(r) = rows.next()? {
                let spawn = SpawnRow {
                    spawn_id: r.get(0)?,
                    npc_entry: r.get(1)?,
                    map_id: r.get(2)?,
                    x: r.get::<_, f64>(3)? as f32,
                    y: r.get::<_, f64>(4)? as f32,
                    orientation: r.get::<_, f64>(5)? as f32,
                    respawn_secs: {
                        let secs: i32 = r.get(6)?;
                        if secs <= 0 {
                            60
                        } else {
                            secs
                        }
                    },
                    movement_type: r.get(7)?,
                    path_id: r.get(8)?,
                    wander_distance: r.get::<_, f64>(9)? as f32,
                    call_for_help: r.get::<_, i32>(10)? != 0,
                };
                self.spawns_by_map
                    .entry(spawn.map_id)
                    .or_default()
                    .push(spawn.spawn_id);
                self.spawns.insert(spawn.spawn_id, spawn);
            }
            Ok(())
        })
    }

    fn load_groups(&mut self, db: &Database) -> Result<()> {
        db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT guid_leader, guid_member, linked_respawn, linked_loot FROM npc_groups",
            )?;
            let mut rows = stmt.query([])?;
            while let Some(r) = rows.next()? {
                let leader: i32 = r.get(0)?;
                let entry = GroupEntry {
                    member_spawn_id: r.get(1)?,
                    linked_respawn: r.get::<_, i32>(2)? != 0,
                    linked_loot: r.get::<_, i32>(3)? != 0,
                };
                self.spawn_to_group_leader
                    .insert(entry.member_spawn_id, leader);
                self.groups_by_leader.entry(leader).or_default().push(entry);
            }
            Ok(())
        })
    }

    fn load_waypoints(&mut self, db: &Database) -> Result<()> {
        db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, position_x, position_y, orientation, wait_time FROM npc_waypoints \
                 ORDER BY id, point",
            )?;
            let mut rows = stmt.query([])?;
            while let Some(r) = rows.next()? {
                let path_id: i32 = r.get(0)?;
                self.waypoints.entry(path_id).or_default().push(Waypoint {
                    x: r.get::<_, f64>(1)? as f32,
                    y: r.get::<_, f64>(2)? as f32,
                    orientation: r.get::<_, f64>(3)? as f32,
                    wait_ms: r.get(4)?,
                });
            }
            Ok(())
        })
    }

    fn load_maps(&mut self, db: &Database) -> Result<()> {
        self.maps = db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, start_x, start_y, start_o, preload FROM map_template",
            )?;
            let rows = stmt.query_map([], |r| {
                Ok((
                    r.get::<_, i32>(0)?,
                    MapTemplate {
                        id: r.get(0)?,
                        name: r.get(1)?,
                        start_x: r.get::<_, f64>(2)? as f32,
                        start_y: r.get::<_, f64>(3)? as f32,
                        start_facing: r.get::<_, f64>(4)? as f32,
                        preload: r.get::<_, i32>(5)? != 0,
                    },
                ))
            })?;
            rows.collect()
        })?;
        Ok(())
    }
}
