//! Corpse loot: weighted rolls from the template's loot table into a
//! per-corpse container, with pickup limited to the killer.

use rand::rngs::StdRng;
use rand::Rng;

use duskmere_core::defines::object::Variable;
use duskmere_core::defines::player::WorldError;

use crate::context::Ctx;
use crate::db::game_data::GameData;
use crate::packets;
use crate::systems::quests;
use crate::world::npc::{LootContainer, LootItem, MELEE_RANGE};

/// Roll each loot entry independently; an empty result still creates a
/// container so the corpse can be flagged consistently.
pub fn roll_loot(data: &GameData, rng: &mut StdRng, loot_id: i32, killer_guid: u32) -> LootContainer {
    let mut items = Vec::new();
    for entry in data.loot_entries(loot_id) {
        let roll: f32 = rng.gen_range(0.0..100.0);
        if roll >= entry.chance {
            continue;
        }
        let count = if entry.max_count > entry.min_count {
            rng.gen_range(entry.min_count..=entry.max_count)
        } else {
            entry.min_count
        };
        items.push(LootItem {
            entry: entry.item_entry,
            count,
            looted: false,
        });
    }
    LootContainer {
        items,
        owner_guid: killer_guid,
    }
}

/// Fill a dead NPC's loot container and mark the corpse lootable for the
/// killer.
pub fn populate_corpse(ctx: &mut Ctx, npc_guid: u32, killer_guid: u32) {
    let loot_id = match ctx.world.npc(npc_guid) {
        Some(npc) => ctx.data.get_npc(npc.entry).map(|t| t.loot_id).unwrap_or(0),
        None => return,
    };

    let container = roll_loot(ctx.data, &mut ctx.world.rng, loot_id, killer_guid);
    let lootable = !container.items.is_empty();

    if let Some(npc) = ctx.world.npc_mut(npc_guid) {
        npc.loot = Some(container);
        npc.core
            .set_var(Variable::DynLootable, if lootable { 1 } else { 0 });
    }
}

/// Open the corpse's loot window for its owner.
pub fn open_loot(ctx: &mut Ctx, player_guid: u32, npc_guid: u32) -> Result<(), WorldError> {
    let Some(player) = ctx.world.player(player_guid) else {
        return Err(WorldError::InvalidTarget);
    };
    let session_id = player.session_id;
    let Some(npc) = ctx.world.npc(npc_guid) else {
        return Err(WorldError::InvalidTarget);
    };
    if !npc.core.dead {
        return Err(WorldError::InvalidTarget);
    }
    if !player.core.in_range(&npc.core, MELEE_RANGE * 2.0) {
        return Err(WorldError::OutOfRange);
    }
    let Some(loot) = npc.loot.as_ref() else {
        return Err(WorldError::AlreadyLooted);
    };
    if loot.owner_guid != player_guid {
        return Err(WorldError::InvalidTarget);
    }

    ctx.sessions
        .send(session_id, &packets::open_loot_window(npc_guid, &loot.items));
    Ok(())
}

/// Take one loot slot from a corpse.
pub fn loot_item(
    ctx: &mut Ctx,
    player_guid: u32,
    npc_guid: u32,
    slot: usize,
) -> Result<(), WorldError> {
    let (entry, count) = {
        let Some(npc) = ctx.world.npc(npc_guid) else {
            return Err(WorldError::InvalidTarget);
        };
        let Some(loot) = npc.loot.as_ref() else {
            return Err(WorldError::AlreadyLooted);
        };
        if loot.owner_guid != player_guid {
            return Err(WorldError::InvalidTarget);
        }
        let Some(item) = loot.items.get(slot) else {
            return Err(WorldError::InvalidSlot);
        };
        if item.looted {
            return Err(WorldError::AlreadyLooted);
        }
        (item.entry, item.count)
    };

    let (max_stack, durability) = ctx
        .data
        .get_item(entry)
        .map(|t| (t.max_stack, t.max_durability))
        .unwrap_or((1, 0));

    let Some(player) = ctx.world.player_mut(player_guid) else {
        return Err(WorldError::InvalidTarget);
    };
    if !player.inventory.can_fit(entry, count, max_stack) {
        return Err(WorldError::InventoryFull);
    }
    player.inventory.add(entry, count, max_stack, durability);
    player.mark_dirty();
    let session_id = player.session_id;

    let mut corpse_empty = false;
    if let Some(npc) = ctx.world.npc_mut(npc_guid) {
        if let Some(loot) = npc.loot.as_mut() {
            loot.items[slot].looted = true;
            corpse_empty = loot.is_empty();
        }
        if corpse_empty {
            npc.loot = None;
            npc.core.set_var(Variable::DynLootable, 0);
        }
    }

    ctx.sessions
        .send(session_id, &packets::notify_item_add(entry, count));
    ctx.sessions
        .send(session_id, &packets::object_was_looted(npc_guid, slot as u8));

    quests::on_inventory_changed(ctx, player_guid);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::game_data::LootEntry;
    use rand::SeedableRng;

    fn table() -> GameData {
        let mut data = GameData::default();
        data.loot_tables.insert(
            7,
            vec![
                LootEntry {
                    item_entry: 501,
                    chance: 100.0,
                    min_count: 1,
                    max_count: 1,
                },
                LootEntry {
                    item_entry: 502,
                    chance: 0.0,
                    min_count: 1,
                    max_count: 1,
                },
                LootEntry {
                    item_entry: 503,
                    chance: 50.0,
                    min_count: 2,
                    max_count: 4,
                },
            ],
        );
        data
    }

    #[test]
    fn guaranteed_and_impossible_entries() {
        let data = table();
        let mut rng = StdRng::seed_from_u64(3);
        let loot = roll_loot(&data, &mut rng, 7, 1);

        assert!(loot.items.iter().any(|i| i.entry == 501));
        assert!(!loot.items.iter().any(|i| i.entry == 502));
        assert_eq!(loot.owner_guid, 1);
    }

    #[test]
    fn counts_stay_in_declared_bounds() {
        let data = table();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let loot = roll_loot(&data, &mut rng, 7, 1);
            for item in loot.items.iter().filter(|i| i.entry == 503) {
                assert!((2..=4).contains(&item.count));
            }
        }
    }

    #[test]
    fn identical_seeds_roll_identically() {
        let data = table();
        let mut a = StdRng::seed_from_u64(9);
        let mut b = StdRng::seed_from_u64(9);
        for _ in 0..20 {
            let la = roll_loot(&data, &mut a, 7, 1);
            let lb = roll_loot(&data, &mut b, 7, 1);
            let counts_a: Vec<(i32, i32)> = la.items.iter().map(|i| (i.entry, i.count)).collect();
            let counts_b: Vec<(i32, i32)> = lb.items.iter().map(|i| (i.entry, i.count)).collect();
            assert_eq!(counts_a, counts_b);
        }
    }

    #[test]
    fn unknown_loot_id_gives_an_empty_container() {
        let data = table();
        let mut rng = StdRng::seed_from_u64(1);
        let loot = roll_loot(&data, &mut rng, 999, 1);
        assert!(loot.items.is_empty());
        assert!(loot.is_empty());
    }
}
