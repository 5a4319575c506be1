//! Builders for server→client messages. Each returns a finished wire frame
//! ready for a session's outbound queue; payload layouts are a client
//! contract.

use duskmere_core::opcodes;
use duskmere_core::packet_buffer::PacketBuffer;

use crate::combat::auras::Aura;
use crate::db::characters::CharacterRecord;
use crate::systems::inventory::Inventory;
use crate::world::npc::{LootItem, Npc};
use crate::world::player::Player;

pub fn ping_reply(sequence: u32) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u32(sequence);
    buf.into_frame(opcodes::MUTUAL_PING)
}

// ---------------------------------------------------------------------------
//  Auth & characters
// ---------------------------------------------------------------------------

/// Authentication result codes.
pub const AUTH_OK: u8 = 0;
pub const AUTH_BAD_CREDENTIALS: u8 = 1;

pub fn auth_result(code: u8, account_id: i32) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u8(code);
    buf.write_i32(account_id);
    buf.into_frame(opcodes::SV_VALIDATE)
}

pub fn character_list(characters: &[CharacterRecord]) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u8(characters.len() as u8);
    for c in characters {
        buf.write_u32(c.guid as u32);
        buf.write_str(&c.name);
        buf.write_u8(c.class_id);
        buf.write_u8(c.gender);
        buf.write_i32(c.portrait_id);
        buf.write_i32(c.level);
        buf.write_i32(c.map_id);
    }
    buf.into_frame(opcodes::SV_CHARACTER_LIST)
}

/// Character creation result codes.
pub const CHAR_CREATE_OK: u8 = 0;
pub const CHAR_CREATE_BAD_NAME: u8 = 1;
pub const CHAR_CREATE_NAME_TAKEN: u8 = 2;
pub const CHAR_CREATE_LIMIT: u8 = 3;
pub const CHAR_CREATE_BAD_CLASS: u8 = 4;

pub fn char_create_result(code: u8, guid: u32) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u8(code);
    buf.write_u32(guid);
    buf.into_frame(opcodes::SV_CHAR_CREATE_RESULT)
}

pub fn new_world(map_id: i32, x: f32, y: f32, orientation: f32) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_i32(map_id);
    buf.write_f32(x);
    buf.write_f32(y);
    buf.write_f32(orientation);
    buf.into_frame(opcodes::SV_NEW_WORLD)
}

pub fn set_controller(guid: u32) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u32(guid);
    buf.into_frame(opcodes::SV_SET_CONTROLLER)
}

// ---------------------------------------------------------------------------
//  Object management
// ---------------------------------------------------------------------------

fn write_variables(buf: &mut PacketBuffer, variables: &[(u16, i32)]) {
    buf.write_u16(variables.len() as u16);
    for &(id, value) in variables {
        buf.write_u16(id);
        buf.write_i32(value);
    }
}

pub fn player_spawn(player: &Player) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u32(player.guid());
    buf.write_str(&player.core.name);
    buf.write_u8(player.class as u8);
    buf.write_u8(player.gender);
    buf.write_i32(player.portrait_id);
    buf.write_i32(player.core.map_id);
    buf.write_f32(player.core.x);
    buf.write_f32(player.core.y);
    buf.write_f32(player.core.orientation);
    write_variables(&mut buf, &player.core.all_variables());
    buf.into_frame(opcodes::SV_PLAYER)
}

pub fn npc_spawn(npc: &Npc) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u32(npc.guid());
    buf.write_i32(npc.entry);
    buf.write_str(&npc.core.name);
    buf.write_i32(npc.core.map_id);
    buf.write_f32(npc.core.x);
    buf.write_f32(npc.core.y);
    buf.write_f32(npc.core.orientation);
    buf.write_bool(npc.core.dead);
    write_variables(&mut buf, &npc.core.all_variables());
    buf.into_frame(opcodes::SV_NPC)
}

pub fn destroy_object(guid: u32) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u32(guid);
    buf.into_frame(opcodes::SV_DESTROY_OBJECT)
}

pub fn unit_spline(guid: u32, x: f32, y: f32, speed: f32) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u32(guid);
    buf.write_f32(x);
    buf.write_f32(y);
    buf.write_f32(speed);
    buf.into_frame(opcodes::SV_UNIT_SPLINE)
}

pub fn unit_teleport(guid: u32, map_id: i32, x: f32, y: f32, orientation: f32) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u32(guid);
    buf.write_i32(map_id);
    buf.write_f32(x);
    buf.write_f32(y);
    buf.write_f32(orientation);
    buf.into_frame(opcodes::SV_UNIT_TELEPORT)
}

pub fn unit_orientation(guid: u32, orientation: f32) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u32(guid);
    buf.write_f32(orientation);
    buf.into_frame(opcodes::SV_UNIT_ORIENTATION)
}

pub fn object_variable(guid: u32, variable_id: u16, value: i32) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u32(guid);
    buf.write_u16(variable_id);
    buf.write_i32(value);
    buf.into_frame(opcodes::SV_OBJECT_VARIABLE)
}

// ---------------------------------------------------------------------------
//  Combat
// ---------------------------------------------------------------------------

pub fn cast_start(caster: u32, spell_id: i32, cast_time_ms: i32, target: u32) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u32(caster);
    buf.write_i32(spell_id);
    buf.write_i32(cast_time_ms);
    buf.write_u32(target);
    buf.into_frame(opcodes::SV_CAST_START)
}

pub fn cast_stop(caster: u32) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u32(caster);
    buf.into_frame(opcodes::SV_CAST_STOP)
}

pub fn spell_go(caster: u32, spell_id: i32, target: u32) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u32(caster);
    buf.write_i32(spell_id);
    buf.write_u32(target);
    buf.into_frame(opcodes::SV_SPELL_GO)
}

#[allow(clippy::too_many_arguments)]
pub fn combat_msg(
    attacker: u32,
    target: u32,
    spell_id: i32,
    result: u8,
    amount: i32,
    school: u8,
    lethal: bool,
) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u32(attacker);
    buf.write_u32(target);
    buf.write_i32(spell_id);
    buf.write_u8(result);
    buf.write_i32(amount);
    buf.write_u8(school);
    buf.write_bool(lethal);
    buf.into_frame(opcodes::SV_COMBAT_MSG)
}

pub fn unit_auras(target: u32, auras: &[Aura]) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u32(target);
    buf.write_u8(auras.len() as u8);
    for aura in auras {
        buf.write_i32(aura.spell_id);
        buf.write_u32(aura.caster_guid);
        buf.write_i32(aura.remaining_ms);
        buf.write_u8(aura.stacks as u8);
    }
    buf.into_frame(opcodes::SV_UNIT_AURAS)
}

pub fn cooldown(spell_id: i32, duration_ms: i32, category: i32, category_ms: i32) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_i32(spell_id);
    buf.write_i32(duration_ms);
    buf.write_i32(category);
    buf.write_i32(category_ms);
    buf.into_frame(opcodes::SV_COOLDOWN)
}

pub fn aggro_mob(npc: u32, target: u32) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u32(npc);
    buf.write_u32(target);
    buf.into_frame(opcodes::SV_AGGRO_MOB)
}

pub fn respawn_response(map_id: i32, x: f32, y: f32) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_i32(map_id);
    buf.write_f32(x);
    buf.write_f32(y);
    buf.into_frame(opcodes::SV_RESPAWN_RESPONSE)
}

// ---------------------------------------------------------------------------
//  Items
// ---------------------------------------------------------------------------

fn item_store(opcode: u16, store: &Inventory) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u8(store.used_slots() as u8);
    for (slot, item) in store.iter() {
        buf.write_u8(slot as u8);
        buf.write_i32(item.entry);
        buf.write_i32(item.count);
        buf.write_i32(item.durability);
    }
    buf.into_frame(opcode)
}

pub fn inventory(store: &Inventory) -> Vec<u8> {
    item_store(opcodes::SV_INVENTORY, store)
}

pub fn bank(store: &Inventory) -> Vec<u8> {
    item_store(opcodes::SV_BANK, store)
}

pub fn open_bank() -> Vec<u8> {
    PacketBuffer::new().into_frame(opcodes::SV_OPEN_BANK)
}

pub fn equip_item(guid: u32, slot: u8, item_entry: i32) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u32(guid);
    buf.write_u8(slot);
    buf.write_i32(item_entry);
    buf.into_frame(opcodes::SV_EQUIP_ITEM)
}

pub fn notify_item_add(item_entry: i32, count: i32) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_i32(item_entry);
    buf.write_i32(count);
    buf.into_frame(opcodes::SV_NOTIFY_ITEM_ADD)
}

pub fn open_loot_window(corpse: u32, items: &[LootItem]) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u32(corpse);
    let open: Vec<(usize, &LootItem)> = items
        .iter()
        .enumerate()
        .filter(|(_, item)| !item.looted)
        .collect();
    buf.write_u8(open.len() as u8);
    for (slot, item) in open {
        buf.write_u8(slot as u8);
        buf.write_i32(item.entry);
        buf.write_i32(item.count);
    }
    buf.into_frame(opcodes::SV_OPEN_LOOT_WINDOW)
}

pub fn object_was_looted(corpse: u32, slot: u8) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u32(corpse);
    buf.write_u8(slot);
    buf.into_frame(opcodes::SV_OBJECT_WAS_LOOTED)
}

pub fn update_vendor_stock(npc: u32, items: &[(i32, i32)]) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u32(npc);
    buf.write_u8(items.len() as u8);
    for &(entry, price) in items {
        buf.write_i32(entry);
        buf.write_i32(price);
    }
    buf.into_frame(opcodes::SV_UPDATE_VENDOR_STOCK)
}

pub fn spent_gold(new_gold: i32) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_i32(new_gold);
    buf.into_frame(opcodes::SV_SPENT_GOLD)
}

// ---------------------------------------------------------------------------
//  Experience & levels
// ---------------------------------------------------------------------------

pub fn exp_notify(amount: i32, new_level: i32) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_i32(amount);
    buf.write_i32(new_level);
    buf.into_frame(opcodes::SV_EXP_NOTIFY)
}

pub fn lvl_response(stat: u16, new_value: i32, unspent_points: i32) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u16(stat);
    buf.write_i32(new_value);
    buf.write_i32(unspent_points);
    buf.into_frame(opcodes::SV_LVL_RESPONSE)
}

// ---------------------------------------------------------------------------
//  Quests
// ---------------------------------------------------------------------------

pub fn quest_list(entries: &[(i32, u8, [i32; 4])]) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u8(entries.len() as u8);
    for &(quest_id, status, progress) in entries {
        buf.write_i32(quest_id);
        buf.write_u8(status);
        for p in progress {
            buf.write_i32(p);
        }
    }
    buf.into_frame(opcodes::SV_QUEST_LIST)
}

pub fn accepted_quest(quest_id: i32) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_i32(quest_id);
    buf.into_frame(opcodes::SV_ACCEPTED_QUEST)
}

pub fn quest_tally(quest_id: i32, tally_type: u8, entry: i32, tally: i32) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_i32(quest_id);
    buf.write_u8(tally_type);
    buf.write_i32(entry);
    buf.write_i32(tally);
    buf.into_frame(opcodes::SV_QUEST_TALLY)
}

pub fn quest_complete(quest_id: i32, done: bool) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_i32(quest_id);
    buf.write_bool(done);
    buf.into_frame(opcodes::SV_QUEST_COMPLETE)
}

pub fn rewarded_quest(quest_id: i32) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_i32(quest_id);
    buf.into_frame(opcodes::SV_REWARDED_QUEST)
}

pub fn abandon_quest(quest_id: i32) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_i32(quest_id);
    buf.into_frame(opcodes::SV_ABANDON_QUEST)
}

// ---------------------------------------------------------------------------
//  Chat & gossip
// ---------------------------------------------------------------------------

pub fn chat_msg(channel: u8, sender: u32, sender_name: &str, text: &str) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u8(channel);
    buf.write_u32(sender);
    buf.write_str(sender_name);
    buf.write_str(text);
    buf.into_frame(opcodes::SV_CHAT_MSG)
}

pub fn chat_error(code: u8) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u8(code);
    buf.into_frame(opcodes::SV_CHAT_ERROR)
}

/// Gossip page: menu text, options, vendor stock, quest offers and
/// turn-ins, all in one message.
pub struct GossipPage {
    pub npc: u32,
    pub text_id: i32,
    pub options: Vec<(u8, u8, String)>,
    pub vendor_items: Vec<(i32, i32)>,
    pub quest_offers: Vec<(i32, String)>,
    pub quest_turnins: Vec<(i32, String)>,
}

pub fn gossip_menu(page: &GossipPage) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u32(page.npc);
    buf.write_i32(page.text_id);

    buf.write_u8(page.options.len() as u8);
    for (id, icon, text) in &page.options {
        buf.write_u8(*id);
        buf.write_u8(*icon);
        buf.write_str(text);
    }

    buf.write_u8(page.vendor_items.len() as u8);
    for &(entry, price) in &page.vendor_items {
        buf.write_i32(entry);
        buf.write_i32(price);
    }

    buf.write_u8(page.quest_offers.len() as u8);
    for (id, title) in &page.quest_offers {
        buf.write_i32(*id);
        buf.write_str(title);
    }

    buf.write_u8(page.quest_turnins.len() as u8);
    for (id, title) in &page.quest_turnins {
        buf.write_i32(*id);
        buf.write_str(title);
    }

    buf.into_frame(opcodes::SV_GOSSIP_MENU)
}

pub fn world_error(code: u8) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u8(code);
    buf.into_frame(opcodes::SV_WORLD_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use duskmere_core::packet_buffer::extract_frame;

    fn decode(mut frame: Vec<u8>) -> (u16, PacketBuffer) {
        extract_frame(&mut frame).unwrap().unwrap()
    }

    #[test]
    fn world_error_frame_decodes() {
        let (opcode, mut payload) = decode(world_error(30));
        assert_eq!(opcode, opcodes::SV_WORLD_ERROR);
        assert_eq!(payload.read_u8(), 30);
        assert_eq!(payload.remaining(), 0);
    }

    #[test]
    fn combat_msg_layout() {
        let (opcode, mut payload) = decode(combat_msg(7, 9, 101, 0, 30, 1, false));
        assert_eq!(opcode, opcodes::SV_COMBAT_MSG);
        assert_eq!(payload.read_u32(), 7);
        assert_eq!(payload.read_u32(), 9);
        assert_eq!(payload.read_i32(), 101);
        assert_eq!(payload.read_u8(), 0);
        assert_eq!(payload.read_i32(), 30);
        assert_eq!(payload.read_u8(), 1);
        assert!(!payload.read_bool());
        assert!(!payload.underrun());
    }

    #[test]
    fn character_list_counts_entries() {
        let records = vec![CharacterRecord {
            guid: 3,
            name: "Anna".to_string(),
            class_id: 1,
            level: 5,
            map_id: 1,
            ..Default::default()
        }];
        let (opcode, mut payload) = decode(character_list(&records));
        assert_eq!(opcode, opcodes::SV_CHARACTER_LIST);
        assert_eq!(payload.read_u8(), 1);
        assert_eq!(payload.read_u32(), 3);
        assert_eq!(payload.read_string(), "Anna");
    }
}
