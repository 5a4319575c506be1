//! In-world handlers: movement, targeting, combat, items, bank, vendor,
//! loot, quests, chat, gossip, respawn, and stat points.

use anyhow::Result;

use duskmere_core::defines::chat::Channel;
use duskmere_core::defines::object::Variable;
use duskmere_core::defines::player::WorldError;
use duskmere_core::defines::unit::{EquipSlot, NpcFlags, Stat};
use duskmere_core::opcodes;
use duskmere_core::packet_buffer::PacketBuffer;

use crate::combat::{auras, spells};
use crate::context::Ctx;
use crate::packets;
use crate::router::PacketRouter;
use crate::session::SessionState;
use crate::systems::equipment::Equipment;
use crate::systems::{bank, chat, experience, gossip, loot, quests, vendor};

/// Longest single move request the server will accept, in world units.
const MAX_MOVE_STEP: f32 = 192.0;

pub fn register(router: &mut PacketRouter) {
    use SessionState::InWorld;

    router.register(opcodes::CL_REQUEST_MOVE, handle_request_move, InWorld, false);
    router.register(opcodes::CL_REQUEST_STOP, handle_request_stop, InWorld, false);
    router.register(opcodes::CL_SET_SELECTED, handle_set_selected, InWorld, false);
    router.register(opcodes::CL_CAST_SPELL, handle_cast_spell, InWorld, false);
    router.register(opcodes::CL_CANCEL_CAST, handle_cancel_cast, InWorld, false);
    router.register(opcodes::CL_CANCEL_BUFF, handle_cancel_buff, InWorld, false);
    router.register(opcodes::CL_CHAT_MSG, handle_chat_msg, InWorld, false);
    router.register(
        opcodes::CL_CLICKED_GOSSIP_OPTION,
        handle_gossip_option,
        InWorld,
        false,
    );
    router.register(opcodes::CL_ACCEPT_QUEST, handle_accept_quest, InWorld, false);
    router.register(opcodes::CL_ABANDON_QUEST, handle_abandon_quest, InWorld, false);
    router.register(opcodes::CL_COMPLETE_QUEST, handle_complete_quest, InWorld, false);
    router.register(opcodes::CL_EQUIP_ITEM, handle_equip_item, InWorld, false);
    router.register(opcodes::CL_UNEQUIP_ITEM, handle_unequip_item, InWorld, false);
    router.register(opcodes::CL_MOVE_ITEM, handle_move_item, InWorld, false);
    router.register(opcodes::CL_SPLIT_ITEM_STACK, handle_split_stack, InWorld, false);
    router.register(opcodes::CL_DESTROY_ITEM, handle_destroy_item, InWorld, false);
    router.register(opcodes::CL_USE_ITEM, handle_use_item, InWorld, false);
    router.register(opcodes::CL_SORT_INVENTORY, handle_sort_inventory, InWorld, false);
    router.register(opcodes::CL_OPEN_BANK, handle_open_bank, InWorld, false);
    router.register(
        opcodes::CL_MOVE_INVENTORY_TO_BANK,
        handle_inventory_to_bank,
        InWorld,
        false,
    );
    router.register(opcodes::CL_MOVE_BANK_TO_BANK, handle_bank_to_bank, InWorld, false);
    router.register(opcodes::CL_UNBANK_ITEM, handle_unbank_item, InWorld, false);
    router.register(opcodes::CL_SORT_BANK, handle_sort_bank, InWorld, false);
    router.register(opcodes::CL_BUY_VENDOR_ITEM, handle_buy_item, InWorld, false);
    router.register(opcodes::CL_SELL_ITEM, handle_sell_item, InWorld, false);
    router.register(opcodes::CL_BUYBACK, handle_buyback, InWorld, false);
    router.register(opcodes::CL_LOOT_ITEM, handle_loot_item, InWorld, false);
    router.register(opcodes::CL_REQUEST_RESPAWN, handle_request_respawn, InWorld, false);
    router.register(opcodes::CL_LEVEL_UP, handle_level_up, InWorld, false);
    router.register(opcodes::CL_RESPEC, handle_respec, InWorld, false);
    router.register(opcodes::CL_SET_IGNORE_PLAYER, handle_set_ignore, InWorld, false);
}

fn player_guid(ctx: &Ctx, session_id: u32) -> Option<u32> {
    ctx.sessions
        .get(session_id)
        .map(|s| s.player_guid)
        .filter(|&guid| guid != 0)
}

fn send_error(ctx: &mut Ctx, session_id: u32, error: WorldError) {
    ctx.sessions
        .send(session_id, &packets::world_error(error as u8));
}

fn send_inventory(ctx: &mut Ctx, session_id: u32, guid: u32) {
    if let Some(player) = ctx.world.player(guid) {
        let frame = packets::inventory(&player.inventory);
        ctx.sessions.send(session_id, &frame);
    }
}

fn send_bank(ctx: &mut Ctx, session_id: u32, guid: u32) {
    if let Some(player) = ctx.world.player(guid) {
        let frame = packets::bank(&player.bank);
        ctx.sessions.send(session_id, &frame);
    }
}

// ---------------------------------------------------------------------------
//  Movement
// ---------------------------------------------------------------------------

fn handle_request_move(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let x = buf.read_f32();
    let y = buf.read_f32();
    let Some(guid) = player_guid(ctx, session_id) else {
        return Ok(());
    };

    let verdict = {
        let Some(player) = ctx.world.player(guid) else {
            return Ok(());
        };
        if player.core.dead {
            Err(WorldError::CasterDead)
        } else if auras::is_stunned(&player.core) {
            Err(WorldError::Stunned)
        } else if auras::is_rooted(&player.core) {
            Err(WorldError::Rooted)
        } else if !x.is_finite()
            || !y.is_finite()
            || player.core.distance_to(x, y) > MAX_MOVE_STEP
        {
            Err(WorldError::InvalidTarget)
        } else {
            match ctx.maps.get_loaded(player.core.map_id) {
                Some(map) if !map.is_walkable_world(x, y) => Err(WorldError::InvalidTarget),
                _ => Ok(()),
            }
        }
    };

    if let Err(error) = verdict {
        send_error(ctx, session_id, error);
        return Ok(());
    }

    spells::interrupt_on_move(ctx, guid);

    if let Some(player) = ctx.world.player_mut(guid) {
        player.core.orient_towards(x, y);
        player.core.set_position(x, y);
        player.moving = true;
        player.mark_dirty();
    }
    ctx.world.on_player_moved(guid, ctx.sessions);
    Ok(())
}

fn handle_request_stop(ctx: &mut Ctx, session_id: u32, _buf: &mut PacketBuffer) -> Result<()> {
    let Some(guid) = player_guid(ctx, session_id) else {
        return Ok(());
    };
    let orientation = match ctx.world.player_mut(guid) {
        Some(player) => {
            player.moving = false;
            player.core.orientation
        }
        None => return Ok(()),
    };
    let frame = packets::unit_orientation(guid, orientation);
    ctx.world.broadcast_to_visible(ctx.sessions, guid, &frame, false);
    Ok(())
}

fn handle_set_selected(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let target = buf.read_u32();
    let Some(guid) = player_guid(ctx, session_id) else {
        return Ok(());
    };
    if let Some(player) = ctx.world.player_mut(guid) {
        player.selected_target = target;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
//  Combat
// ---------------------------------------------------------------------------

fn handle_cast_spell(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let spell_id = buf.read_i32();
    let mut target = buf.read_u32();
    let Some(guid) = player_guid(ctx, session_id) else {
        return Ok(());
    };

    if target == 0 {
        target = ctx
            .world
            .player(guid)
            .map(|p| p.selected_target)
            .unwrap_or(0);
    }

    if let Err(error) = spells::try_cast(ctx, guid, spell_id, target) {
        send_error(ctx, session_id, error);
    }
    Ok(())
}

fn handle_cancel_cast(ctx: &mut Ctx, session_id: u32, _buf: &mut PacketBuffer) -> Result<()> {
    if let Some(guid) = player_guid(ctx, session_id) {
        spells::cancel_cast(ctx, guid, true);
    }
    Ok(())
}

fn handle_cancel_buff(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let spell_id = buf.read_i32();
    let Some(guid) = player_guid(ctx, session_id) else {
        return Ok(());
    };

    let removed = {
        let Some(core) = ctx.world.entity_core_mut(guid) else {
            return Ok(());
        };
        let caster = core
            .auras
            .iter()
            .find(|a| a.spell_id == spell_id)
            .map(|a| a.caster_guid);
        match caster {
            Some(caster) => auras::remove(core, spell_id, caster).is_some(),
            None => false,
        }
    };

    if removed {
        let frame = {
            let core = ctx.world.entity_core(guid).expect("removed above");
            packets::unit_auras(guid, &core.auras)
        };
        ctx.world.broadcast_to_visible(ctx.sessions, guid, &frame, true);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
//  Chat & gossip
// ---------------------------------------------------------------------------

fn handle_chat_msg(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let channel_id = buf.read_u8();
    let target_name = buf.read_string();
    let text = buf.read_string();
    let Some(guid) = player_guid(ctx, session_id) else {
        return Ok(());
    };
    let Some(channel) = Channel::from_id(channel_id) else {
        return Ok(());
    };
    chat::handle_chat(ctx, guid, channel, &text, &target_name, crate::session::wall_now());
    Ok(())
}

fn handle_gossip_option(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let npc_guid = buf.read_u32();
    let option = buf.read_u8();
    let Some(guid) = player_guid(ctx, session_id) else {
        return Ok(());
    };

    // Option 0 opens (or re-opens) the menu; other options act on it.
    if option == 0 {
        if let Err(error) = gossip::open_gossip(ctx, guid, npc_guid) {
            send_error(ctx, session_id, error);
        }
        return Ok(());
    }

    let action = ctx
        .world
        .npc(npc_guid)
        .and_then(|npc| ctx.data.get_npc(npc.entry))
        .and_then(|template| {
            ctx.data
                .gossip_options(template.gossip_menu_id)
                .iter()
                .find(|o| o.id == option as i32)
                .map(|o| o.action)
        });

    match action {
        // Action 1: show the vendor window.
        Some(1) => {
            let entry = match gossip::gossip_npc_entry(ctx, guid) {
                Ok((_, entry)) => entry,
                Err(error) => {
                    send_error(ctx, session_id, error);
                    return Ok(());
                }
            };
            let stock = vendor::stock_for_npc(ctx, entry);
            ctx.sessions
                .send(session_id, &packets::update_vendor_stock(npc_guid, &stock));
        }
        // Action 2: open the bank.
        Some(2) => {
            ctx.sessions.send(session_id, &packets::open_bank());
            send_bank(ctx, session_id, guid);
        }
        _ => {}
    }
    Ok(())
}

// ---------------------------------------------------------------------------
//  Quests
// ---------------------------------------------------------------------------

fn handle_accept_quest(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let quest_id = buf.read_i32();
    let Some(guid) = player_guid(ctx, session_id) else {
        return Ok(());
    };
    if let Err(error) = quests::accept_quest(ctx, guid, quest_id) {
        send_error(ctx, session_id, error);
    }
    Ok(())
}

fn handle_abandon_quest(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let quest_id = buf.read_i32();
    if let Some(guid) = player_guid(ctx, session_id) {
        quests::abandon_quest(ctx, guid, quest_id);
    }
    Ok(())
}

fn handle_complete_quest(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let quest_id = buf.read_i32();
    let Some(guid) = player_guid(ctx, session_id) else {
        return Ok(());
    };
    let npc_entry = match gossip::gossip_npc_entry(ctx, guid) {
        Ok((_, entry)) => entry,
        Err(error) => {
            send_error(ctx, session_id, error);
            return Ok(());
        }
    };
    if let Err(error) = quests::complete_quest(ctx, guid, quest_id, npc_entry) {
        send_error(ctx, session_id, error);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
//  Items & equipment
// ---------------------------------------------------------------------------

fn handle_equip_item(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let slot = buf.read_u8() as usize;
    let Some(guid) = player_guid(ctx, session_id) else {
        return Ok(());
    };

    let verdict = {
        let Some(player) = ctx.world.player(guid) else {
            return Ok(());
        };
        match player.inventory.slot(slot) {
            Some(item) => match ctx.data.get_item(item.entry) {
                Some(template) => {
                    Equipment::can_equip(template, player.class as u8, player.level())
                        .map(|equip_slot| (*item, equip_slot))
                }
                None => Err(WorldError::ItemNotFound),
            },
            None => Err(WorldError::ItemNotFound),
        }
    };

    let (item, equip_slot) = match verdict {
        Ok(pair) => pair,
        Err(error) => {
            send_error(ctx, session_id, error);
            return Ok(());
        }
    };

    if let Some(player) = ctx.world.player_mut(guid) {
        player.inventory.take_slot(slot);
        // Whatever was worn swaps back into the freed slot.
        if let Some(previous) = player.equipment.take(equip_slot) {
            player.inventory.set_slot(slot, Some(previous));
        }
        player.equipment.set(equip_slot, Some(item));
        player.mark_dirty();
    }

    experience::apply_level_stats(ctx, guid, true);
    send_inventory(ctx, session_id, guid);
    if equip_slot.is_visible() {
        let frame = packets::equip_item(guid, equip_slot.id(), item.entry);
        ctx.world.broadcast_to_visible(ctx.sessions, guid, &frame, true);
    }
    quests::on_inventory_changed(ctx, guid);
    Ok(())
}

fn handle_unequip_item(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let Some(equip_slot) = EquipSlot::from_id(buf.read_u8()) else {
        send_error(ctx, session_id, WorldError::InvalidSlot);
        return Ok(());
    };
    let Some(guid) = player_guid(ctx, session_id) else {
        return Ok(());
    };

    let verdict = {
        let Some(player) = ctx.world.player(guid) else {
            return Ok(());
        };
        if player.equipment.worn(equip_slot).is_none() {
            Err(WorldError::ItemNotFound)
        } else if player.inventory.first_free().is_none() {
            Err(WorldError::InventoryFull)
        } else {
            Ok(())
        }
    };
    if let Err(error) = verdict {
        send_error(ctx, session_id, error);
        return Ok(());
    }

    if let Some(player) = ctx.world.player_mut(guid) {
        if let Some(item) = player.equipment.take(equip_slot) {
            let free = player.inventory.first_free().expect("checked above");
            player.inventory.set_slot(free, Some(item));
            player.mark_dirty();
        }
    }

    experience::apply_level_stats(ctx, guid, true);
    send_inventory(ctx, session_id, guid);
    if equip_slot.is_visible() {
        let frame = packets::equip_item(guid, equip_slot.id(), 0);
        ctx.world.broadcast_to_visible(ctx.sessions, guid, &frame, true);
    }
    quests::on_inventory_changed(ctx, guid);
    Ok(())
}

fn handle_move_item(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let from = buf.read_u8() as usize;
    let to = buf.read_u8() as usize;
    let Some(guid) = player_guid(ctx, session_id) else {
        return Ok(());
    };

    let max_stack = {
        let Some(player) = ctx.world.player(guid) else {
            return Ok(());
        };
        player
            .inventory
            .slot(from)
            .and_then(|item| ctx.data.get_item(item.entry))
            .map(|t| t.max_stack)
            .unwrap_or(1)
    };

    if let Some(player) = ctx.world.player_mut(guid) {
        if player.inventory.move_slot(from, to, max_stack) {
            player.mark_dirty();
        }
    }
    send_inventory(ctx, session_id, guid);
    Ok(())
}

fn handle_split_stack(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let from = buf.read_u8() as usize;
    let to = buf.read_u8() as usize;
    let count = buf.read_i32();
    let Some(guid) = player_guid(ctx, session_id) else {
        return Ok(());
    };

    if let Some(player) = ctx.world.player_mut(guid) {
        if player.inventory.split(from, to, count) {
            player.mark_dirty();
        } else {
            send_error(ctx, session_id, WorldError::InvalidSlot);
            return Ok(());
        }
    }
    send_inventory(ctx, session_id, guid);
    Ok(())
}

fn handle_destroy_item(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let slot = buf.read_u8() as usize;
    let Some(guid) = player_guid(ctx, session_id) else {
        return Ok(());
    };

    let destroyed = ctx
        .world
        .player_mut(guid)
        .and_then(|p| {
            let item = p.inventory.take_slot(slot);
            if item.is_some() {
                p.mark_dirty();
            }
            item
        })
        .is_some();

    if destroyed {
        send_inventory(ctx, session_id, guid);
        quests::on_inventory_changed(ctx, guid);
    }
    Ok(())
}

fn handle_use_item(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let slot = buf.read_u8() as usize;
    let Some(guid) = player_guid(ctx, session_id) else {
        return Ok(());
    };

    let (entry, use_spell) = {
        let Some(player) = ctx.world.player(guid) else {
            return Ok(());
        };
        match player.inventory.slot(slot) {
            Some(item) => {
                let spell = ctx
                    .data
                    .get_item(item.entry)
                    .map(|t| t.use_spell)
                    .unwrap_or(0);
                (item.entry, spell)
            }
            None => {
                send_error(ctx, session_id, WorldError::ItemNotFound);
                return Ok(());
            }
        }
    };

    if use_spell <= 0 {
        send_error(ctx, session_id, WorldError::ItemNotFound);
        return Ok(());
    }

    match spells::try_cast(ctx, guid, use_spell, guid) {
        Ok(()) => {
            // Consumables burn one charge per use.
            if let Some(player) = ctx.world.player_mut(guid) {
                player.inventory.remove(entry, 1);
                player.mark_dirty();
            }
            send_inventory(ctx, session_id, guid);
            quests::on_inventory_changed(ctx, guid);
        }
        Err(error) => send_error(ctx, session_id, error),
    }
    Ok(())
}

fn handle_sort_inventory(ctx: &mut Ctx, session_id: u32, _buf: &mut PacketBuffer) -> Result<()> {
    let Some(guid) = player_guid(ctx, session_id) else {
        return Ok(());
    };
    if let Some(player) = ctx.world.player_mut(guid) {
        player.inventory.sort();
        player.mark_dirty();
    }
    send_inventory(ctx, session_id, guid);
    Ok(())
}

// ---------------------------------------------------------------------------
//  Bank
// ---------------------------------------------------------------------------

fn banker_in_reach(ctx: &Ctx, guid: u32, npc_guid: u32) -> Result<(), WorldError> {
    let Some(player) = ctx.world.player(guid) else {
        return Err(WorldError::InvalidTarget);
    };
    let Some(npc) = ctx.world.npc(npc_guid) else {
        return Err(WorldError::InvalidTarget);
    };
    let Some(template) = ctx.data.get_npc(npc.entry) else {
        return Err(WorldError::InvalidTarget);
    };
    if !template.flags.contains(NpcFlags::BANKER) {
        return Err(WorldError::InvalidTarget);
    }
    if !npc.is_alive() || !player.core.in_range(&npc.core, gossip::GOSSIP_RANGE) {
        return Err(WorldError::OutOfRange);
    }
    Ok(())
}

fn handle_open_bank(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let npc_guid = buf.read_u32();
    let Some(guid) = player_guid(ctx, session_id) else {
        return Ok(());
    };
    if let Err(error) = banker_in_reach(ctx, guid, npc_guid) {
        send_error(ctx, session_id, error);
        return Ok(());
    }
    ctx.sessions.send(session_id, &packets::open_bank());
    send_bank(ctx, session_id, guid);
    Ok(())
}

fn handle_inventory_to_bank(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let slot = buf.read_u8() as usize;
    let Some(guid) = player_guid(ctx, session_id) else {
        return Ok(());
    };

    let moved = ctx
        .world
        .player_mut(guid)
        .map(|p| {
            let moved = bank::transfer_slot(&mut p.inventory, &mut p.bank, slot);
            if moved {
                p.mark_dirty();
            }
            moved
        })
        .unwrap_or(false);

    if moved {
        send_inventory(ctx, session_id, guid);
        send_bank(ctx, session_id, guid);
        quests::on_inventory_changed(ctx, guid);
    } else {
        send_error(ctx, session_id, WorldError::InventoryFull);
    }
    Ok(())
}

fn handle_bank_to_bank(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let from = buf.read_u8() as usize;
    let to = buf.read_u8() as usize;
    let Some(guid) = player_guid(ctx, session_id) else {
        return Ok(());
    };

    let max_stack = {
        let Some(player) = ctx.world.player(guid) else {
            return Ok(());
        };
        player
            .bank
            .slot(from)
            .and_then(|item| ctx.data.get_item(item.entry))
            .map(|t| t.max_stack)
            .unwrap_or(1)
    };

    if let Some(player) = ctx.world.player_mut(guid) {
        if player.bank.move_slot(from, to, max_stack) {
            player.mark_dirty();
        }
    }
    send_bank(ctx, session_id, guid);
    Ok(())
}

fn handle_unbank_item(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let slot = buf.read_u8() as usize;
    let Some(guid) = player_guid(ctx, session_id) else {
        return Ok(());
    };

    let moved = ctx
        .world
        .player_mut(guid)
        .map(|p| {
            let moved = bank::transfer_slot(&mut p.bank, &mut p.inventory, slot);
            if moved {
                p.mark_dirty();
            }
            moved
        })
        .unwrap_or(false);

    if moved {
        send_inventory(ctx, session_id, guid);
        send_bank(ctx, session_id, guid);
        quests::on_inventory_changed(ctx, guid);
    } else {
        send_error(ctx, session_id, WorldError::InventoryFull);
    }
    Ok(())
}

fn handle_sort_bank(ctx: &mut Ctx, session_id: u32, _buf: &mut PacketBuffer) -> Result<()> {
    let Some(guid) = player_guid(ctx, session_id) else {
        return Ok(());
    };
    if let Some(player) = ctx.world.player_mut(guid) {
        player.bank.sort();
        player.mark_dirty();
    }
    send_bank(ctx, session_id, guid);
    Ok(())
}

// ---------------------------------------------------------------------------
//  Vendor & loot
// ---------------------------------------------------------------------------

fn handle_buy_item(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let npc_guid = buf.read_u32();
    let item_entry = buf.read_i32();
    let count = buf.read_i32();
    let Some(guid) = player_guid(ctx, session_id) else {
        return Ok(());
    };
    if let Err(error) = vendor::buy_item(ctx, guid, npc_guid, item_entry, count) {
        send_error(ctx, session_id, error);
    } else {
        quests::on_inventory_changed(ctx, guid);
    }
    Ok(())
}

fn handle_sell_item(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let npc_guid = buf.read_u32();
    let slot = buf.read_u8() as usize;
    let Some(guid) = player_guid(ctx, session_id) else {
        return Ok(());
    };
    if let Err(error) = vendor::sell_item(ctx, guid, npc_guid, slot) {
        send_error(ctx, session_id, error);
    } else {
        quests::on_inventory_changed(ctx, guid);
    }
    Ok(())
}

fn handle_buyback(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let npc_guid = buf.read_u32();
    let index = buf.read_u8() as usize;
    let Some(guid) = player_guid(ctx, session_id) else {
        return Ok(());
    };
    if let Err(error) = vendor::buyback_item(ctx, guid, npc_guid, index) {
        send_error(ctx, session_id, error);
    } else {
        quests::on_inventory_changed(ctx, guid);
    }
    Ok(())
}

fn handle_loot_item(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let corpse = buf.read_u32();
    let slot = buf.read_u8();
    let Some(guid) = player_guid(ctx, session_id) else {
        return Ok(());
    };

    // Slot 0xFF opens the loot window; anything else takes that slot.
    let outcome = if slot == 0xFF {
        loot::open_loot(ctx, guid, corpse)
    } else {
        loot::loot_item(ctx, guid, corpse, slot as usize)
    };
    if let Err(error) = outcome {
        send_error(ctx, session_id, error);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
//  Respawn & stat points
// ---------------------------------------------------------------------------

fn handle_request_respawn(ctx: &mut Ctx, session_id: u32, _buf: &mut PacketBuffer) -> Result<()> {
    let Some(guid) = player_guid(ctx, session_id) else {
        return Ok(());
    };

    let map_id = {
        let Some(player) = ctx.world.player(guid) else {
            return Ok(());
        };
        if !player.core.dead {
            send_error(ctx, session_id, WorldError::InvalidTarget);
            return Ok(());
        }
        player.core.map_id
    };

    let (x, y, facing) = ctx
        .data
        .get_map(map_id)
        .map(|m| (m.start_x, m.start_y, m.start_facing))
        .unwrap_or((100.0, 100.0, 0.0));

    if let Some(player) = ctx.world.player_mut(guid) {
        player.core.dead = false;
        player.core.set_position(x, y);
        player.core.orientation = facing;
        let max_health = player.core.max_health();
        let max_mana = player.core.max_mana();
        player.core.set_var(Variable::Health, max_health);
        player.core.set_var(Variable::Mana, max_mana);
        player.core.set_var(Variable::IsDead, 0);
        player.mark_dirty();
    }

    ctx.sessions
        .send(session_id, &packets::respawn_response(map_id, x, y));
    let frame = packets::unit_teleport(guid, map_id, x, y, facing);
    ctx.world.broadcast_to_visible(ctx.sessions, guid, &frame, true);
    Ok(())
}

fn handle_level_up(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let stat_id = buf.read_u16();
    let Some(guid) = player_guid(ctx, session_id) else {
        return Ok(());
    };
    let Some(stat) = Stat::from_id(stat_id) else {
        send_error(ctx, session_id, WorldError::InvalidTarget);
        return Ok(());
    };
    if !experience::invest_stat_point(ctx, guid, stat) {
        send_error(ctx, session_id, WorldError::InvalidTarget);
    }
    Ok(())
}

fn handle_respec(ctx: &mut Ctx, session_id: u32, _buf: &mut PacketBuffer) -> Result<()> {
    if let Some(guid) = player_guid(ctx, session_id) {
        experience::respec(ctx, guid);
    }
    Ok(())
}

fn handle_set_ignore(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let target = buf.read_u32();
    let ignored = buf.read_bool();
    if let Some(guid) = player_guid(ctx, session_id) {
        chat::set_ignore(ctx, guid, target, ignored);
    }
    Ok(())
}
