//! Vendor trade: template-driven stock, sell, and the per-player buyback
//! ring (most recent ten sold items per vendor, oldest evicted).

use std::collections::VecDeque;

use duskmere_core::defines::player::{WorldError, BUYBACK_SLOTS};
use duskmere_core::defines::unit::NpcFlags;

use crate::context::Ctx;
use crate::packets;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuybackEntry {
    pub item_entry: i32,
    pub count: i32,
    pub durability: i32,
    /// Gold the vendor paid; buying back costs the same.
    pub price: i32,
}

/// Stock list as (item entry, unit price) pairs for the client.
pub fn stock_for_npc(ctx: &Ctx, npc_entry: i32) -> Vec<(i32, i32)> {
    ctx.data
        .vendor_items(npc_entry)
        .iter()
        .filter_map(|v| {
            ctx.data
                .get_item(v.item_entry)
                .map(|t| (v.item_entry, t.buy_price))
        })
        .collect()
}

fn vendor_entry(ctx: &Ctx, player_guid: u32, npc_guid: u32) -> Result<i32, WorldError> {
    let Some(npc) = ctx.world.npc(npc_guid) else {
        return Err(WorldError::InvalidTarget);
    };
    if !npc.is_alive() {
        return Err(WorldError::TargetDead);
    }
    let Some(template) = ctx.data.get_npc(npc.entry) else {
        return Err(WorldError::InvalidTarget);
    };
    if !template.flags.contains(NpcFlags::VENDOR) {
        return Err(WorldError::InvalidTarget);
    }
    let Some(player) = ctx.world.player(player_guid) else {
        return Err(WorldError::InvalidTarget);
    };
    if player.core.map_id != npc.core.map_id
        || !player.core.in_range(&npc.core, crate::world::npc::MELEE_RANGE * 3.0)
    {
        return Err(WorldError::OutOfRange);
    }
    Ok(npc.entry)
}

pub fn buy_item(
    ctx: &mut Ctx,
    player_guid: u32,
    npc_guid: u32,
    item_entry: i32,
    count: i32,
) -> Result<(), WorldError> {
    let npc_entry = vendor_entry(ctx, player_guid, npc_guid)?;
    let count = count.clamp(1, 100);

    if !ctx
        .data
        .vendor_items(npc_entry)
        .iter()
        .any(|v| v.item_entry == item_entry)
    {
        return Err(WorldError::OutOfStock);
    }
    let Some(template) = ctx.data.get_item(item_entry) else {
        return Err(WorldError::ItemNotFound);
    };
    let total_price = template.buy_price.saturating_mul(count);

    let player = ctx.world.player_mut(player_guid).expect("vendor gate");
    if player.gold() < total_price {
        return Err(WorldError::NotEnoughGold);
    }
    if !player.inventory.can_fit(item_entry, count, template.max_stack) {
        return Err(WorldError::InventoryFull);
    }

    player.spend_gold(total_price);
    player
        .inventory
        .add(item_entry, count, template.max_stack, template.max_durability);
    let session_id = player.session_id;
    let gold = player.gold();

    ctx.sessions.send(session_id, &packets::spent_gold(gold));
    ctx.sessions
        .send(session_id, &packets::notify_item_add(item_entry, count));
    ctx.sessions
        .send(session_id, &packets::inventory(&ctx.world.player(player_guid).expect("vendor gate").inventory));
    Ok(())
}

pub fn sell_item(
    ctx: &mut Ctx,
    player_guid: u32,
    npc_guid: u32,
    slot: usize,
) -> Result<(), WorldError> {
    let npc_entry = vendor_entry(ctx, player_guid, npc_guid)?;

    let player = ctx.world.player_mut(player_guid).expect("vendor gate");
    let Some(item) = player.inventory.slot(slot).copied() else {
        return Err(WorldError::ItemNotFound);
    };
    let Some(template) = ctx.data.get_item(item.entry) else {
        return Err(WorldError::ItemNotFound);
    };
    let price = template.sell_price.saturating_mul(item.count);

    player.inventory.take_slot(slot);
    player.add_gold(price);

    let ring = player.buyback.entry(npc_entry).or_default();
    ring.push_back(BuybackEntry {
        item_entry: item.entry,
        count: item.count,
        durability: item.durability,
        price,
    });
    while ring.len() > BUYBACK_SLOTS {
        ring.pop_front();
    }

    let session_id = player.session_id;
    let gold = player.gold();
    ctx.sessions.send(session_id, &packets::spent_gold(gold));
    ctx.sessions
        .send(session_id, &packets::inventory(&ctx.world.player(player_guid).expect("vendor gate").inventory));
    Ok(())
}

/// Buy back the most recent entries first; `index` counts from the newest.
pub fn buyback_item(
    ctx: &mut Ctx,
    player_guid: u32,
    npc_guid: u32,
    index: usize,
) -> Result<(), WorldError> {
    let npc_entry = vendor_entry(ctx, player_guid, npc_guid)?;

    let player = ctx.world.player_mut(player_guid).expect("vendor gate");
    let ring_len = player
        .buyback
        .get(&npc_entry)
        .map(VecDeque::len)
        .unwrap_or(0);
    if ring_len == 0 {
        return Err(WorldError::BuybackEmpty);
    }
    if index >= ring_len {
        return Err(WorldError::InvalidSlot);
    }
    let ring_index = ring_len - 1 - index;

    let entry = player.buyback.get(&npc_entry).expect("checked above")[ring_index].clone();
    if player.gold() < entry.price {
        return Err(WorldError::NotEnoughGold);
    }
    let max_stack = ctx
        .data
        .get_item(entry.item_entry)
        .map(|t| t.max_stack)
        .unwrap_or(1);
    if !player
        .inventory
        .can_fit(entry.item_entry, entry.count, max_stack)
    {
        return Err(WorldError::InventoryFull);
    }

    player.spend_gold(entry.price);
    player
        .inventory
        .add(entry.item_entry, entry.count, max_stack, entry.durability);
    player
        .buyback
        .get_mut(&npc_entry)
        .expect("checked above")
        .remove(ring_index);

    let session_id = player.session_id;
    let gold = player.gold();
    ctx.sessions.send(session_id, &packets::spent_gold(gold));
    ctx.sessions
        .send(session_id, &packets::notify_item_add(entry.item_entry, entry.count));
    ctx.sessions
        .send(session_id, &packets::inventory(&ctx.world.player(player_guid).expect("vendor gate").inventory));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buyback_ring_evicts_oldest() {
        let mut ring: VecDeque<BuybackEntry> = VecDeque::new();
        for i in 0..(BUYBACK_SLOTS as i32 + 3) {
            ring.push_back(BuybackEntry {
                item_entry: 100 + i,
                count: 1,
                durability: 0,
                price: 10,
            });
            while ring.len() > BUYBACK_SLOTS {
                ring.pop_front();
            }
        }
        assert_eq!(ring.len(), BUYBACK_SLOTS);
        assert_eq!(ring.front().unwrap().item_entry, 103);
        assert_eq!(ring.back().unwrap().item_entry, 112);
    }
}
