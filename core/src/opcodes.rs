//! Wire opcode catalogue.
//!
//! Opcodes are 16-bit values partitioned into a bidirectional ping (0x00),
//! client-originated requests (0x01..=0x4B) and server-originated messages
//! (0x50..=0xA1). The full table is a protocol contract shared with the
//! client; unknown values are logged and dropped by the router.

/// Ping, valid in both directions.
pub const MUTUAL_PING: u16 = 0x00;

// ---------------------------------------------------------------------------
//  Client -> Server
// ---------------------------------------------------------------------------

pub const CL_PING: u16 = 0x01;
pub const CL_AUTHENTICATE: u16 = 0x02;
pub const CL_CHARACTER_LIST: u16 = 0x03;
pub const CL_CHAR_CREATE: u16 = 0x04;
pub const CL_DELETE_CHARACTER: u16 = 0x05;
pub const CL_ENTER_WORLD: u16 = 0x06;
pub const CL_CAST_SPELL: u16 = 0x07;
pub const CL_CANCEL_CAST: u16 = 0x08;
pub const CL_CANCEL_BUFF: u16 = 0x09;
pub const CL_CHAT_MSG: u16 = 0x0A;
pub const CL_CLICKED_GOSSIP_OPTION: u16 = 0x0B;
pub const CL_ACCEPT_QUEST: u16 = 0x0C;
pub const CL_ABANDON_QUEST: u16 = 0x0D;
pub const CL_COMPLETE_QUEST: u16 = 0x0E;
pub const CL_REQUEST_MOVE: u16 = 0x0F;
pub const CL_REQUEST_STOP: u16 = 0x10;
pub const CL_SET_SELECTED: u16 = 0x13;
pub const CL_EQUIP_ITEM: u16 = 0x14;
pub const CL_UNEQUIP_ITEM: u16 = 0x15;
pub const CL_MOVE_ITEM: u16 = 0x16;
pub const CL_SPLIT_ITEM_STACK: u16 = 0x17;
pub const CL_DESTROY_ITEM: u16 = 0x18;
pub const CL_USE_ITEM: u16 = 0x19;
pub const CL_SORT_INVENTORY: u16 = 0x1A;
pub const CL_MOVE_INVENTORY_TO_BANK: u16 = 0x1C;
pub const CL_OPEN_BANK: u16 = 0x1D;
pub const CL_MOVE_BANK_TO_BANK: u16 = 0x1E;
pub const CL_UNBANK_ITEM: u16 = 0x1F;
pub const CL_SORT_BANK: u16 = 0x20;
pub const CL_BUY_VENDOR_ITEM: u16 = 0x21;
pub const CL_SELL_ITEM: u16 = 0x22;
pub const CL_BUYBACK: u16 = 0x23;
pub const CL_LOOT_ITEM: u16 = 0x24;
pub const CL_RESPEC: u16 = 0x3D;
pub const CL_LEVEL_UP: u16 = 0x3E;
pub const CL_REQUEST_RESPAWN: u16 = 0x41;
pub const CL_SET_IGNORE_PLAYER: u16 = 0x4B;

// ---------------------------------------------------------------------------
//  Server -> Client
// ---------------------------------------------------------------------------

pub const SV_VALIDATE: u16 = 0x50;
pub const SV_CHARACTER_LIST: u16 = 0x52;
pub const SV_CHAR_CREATE_RESULT: u16 = 0x53;
pub const SV_NEW_WORLD: u16 = 0x54;
pub const SV_SET_CONTROLLER: u16 = 0x55;
pub const SV_DESTROY_OBJECT: u16 = 0x58;
pub const SV_UNIT_SPLINE: u16 = 0x5B;
pub const SV_PLAYER: u16 = 0x5C;
pub const SV_NPC: u16 = 0x5D;
pub const SV_UNIT_TELEPORT: u16 = 0x5E;
pub const SV_UNIT_ORIENTATION: u16 = 0x5F;
pub const SV_CAST_START: u16 = 0x60;
pub const SV_CAST_STOP: u16 = 0x61;
pub const SV_SPELL_GO: u16 = 0x62;
pub const SV_COMBAT_MSG: u16 = 0x63;
pub const SV_UNIT_AURAS: u16 = 0x64;
pub const SV_COOLDOWN: u16 = 0x65;
pub const SV_AGGRO_MOB: u16 = 0x66;
pub const SV_INVENTORY: u16 = 0x68;
pub const SV_BANK: u16 = 0x69;
pub const SV_OPEN_BANK: u16 = 0x6A;
pub const SV_EQUIP_ITEM: u16 = 0x6B;
pub const SV_NOTIFY_ITEM_ADD: u16 = 0x6C;
pub const SV_OPEN_LOOT_WINDOW: u16 = 0x6D;
pub const SV_OBJECT_WAS_LOOTED: u16 = 0x6E;
pub const SV_UPDATE_VENDOR_STOCK: u16 = 0x6F;
pub const SV_EXP_NOTIFY: u16 = 0x7B;
pub const SV_LVL_RESPONSE: u16 = 0x7C;
pub const SV_SPENT_GOLD: u16 = 0x7D;
pub const SV_QUEST_LIST: u16 = 0x80;
pub const SV_ACCEPTED_QUEST: u16 = 0x81;
pub const SV_QUEST_TALLY: u16 = 0x82;
pub const SV_QUEST_COMPLETE: u16 = 0x83;
pub const SV_REWARDED_QUEST: u16 = 0x84;
pub const SV_ABANDON_QUEST: u16 = 0x85;
pub const SV_CHAT_MSG: u16 = 0x87;
pub const SV_CHAT_ERROR: u16 = 0x88;
pub const SV_GOSSIP_MENU: u16 = 0x89;
pub const SV_OBJECT_VARIABLE: u16 = 0x90;
pub const SV_WORLD_ERROR: u16 = 0x9C;
pub const SV_RESPAWN_RESPONSE: u16 = 0x9F;

/// Display name for logging. Covers every opcode this server handles or
/// emits; anything else is `"Unknown"`.
pub fn opcode_name(opcode: u16) -> &'static str {
    match opcode {
        MUTUAL_PING => "Mutual_Ping",

        CL_PING => "Client_Ping",
        CL_AUTHENTICATE => "Client_Authenticate",
        CL_CHARACTER_LIST => "Client_CharacterList",
        CL_CHAR_CREATE => "Client_CharCreate",
        CL_DELETE_CHARACTER => "Client_DeleteCharacter",
        CL_ENTER_WORLD => "Client_EnterWorld",
        CL_CAST_SPELL => "Client_CastSpell",
        CL_CANCEL_CAST => "Client_CancelCast",
        CL_CANCEL_BUFF => "Client_CancelBuff",
        CL_CHAT_MSG => "Client_ChatMsg",
        CL_CLICKED_GOSSIP_OPTION => "Client_ClickedGossipOption",
        CL_ACCEPT_QUEST => "Client_AcceptQuest",
        CL_ABANDON_QUEST => "Client_AbandonQuest",
        CL_COMPLETE_QUEST => "Client_CompleteQuest",
        CL_REQUEST_MOVE => "Client_RequestMove",
        CL_REQUEST_STOP => "Client_RequestStop",
        CL_SET_SELECTED => "Client_SetSelected",
        CL_EQUIP_ITEM => "Client_EquipItem",
        CL_UNEQUIP_ITEM => "Client_UnequipItem",
        CL_MOVE_ITEM => "Client_MoveItem",
        CL_SPLIT_ITEM_STACK => "Client_SplitItemStack",
        CL_DESTROY_ITEM => "Client_DestroyItem",
        CL_USE_ITEM => "Client_UseItem",
        CL_SORT_INVENTORY => "Client_SortInventory",
        CL_MOVE_INVENTORY_TO_BANK => "Client_MoveInventoryToBank",
        CL_OPEN_BANK => "Client_OpenBank",
        CL_MOVE_BANK_TO_BANK => "Client_MoveBankToBank",
        CL_UNBANK_ITEM => "Client_UnBankItem",
        CL_SORT_BANK => "Client_SortBank",
        CL_BUY_VENDOR_ITEM => "Client_BuyVendorItem",
        CL_SELL_ITEM => "Client_SellItem",
        CL_BUYBACK => "Client_Buyback",
        CL_LOOT_ITEM => "Client_LootItem",
        CL_RESPEC => "Client_Respec",
        CL_LEVEL_UP => "Client_LevelUp",
        CL_REQUEST_RESPAWN => "Client_RequestRespawn",
        CL_SET_IGNORE_PLAYER => "Client_SetIgnorePlayer",

        SV_VALIDATE => "Server_Validate",
        SV_CHARACTER_LIST => "Server_CharacterList",
        SV_CHAR_CREATE_RESULT => "Server_CharaCreateResult",
        SV_NEW_WORLD => "Server_NewWorld",
        SV_SET_CONTROLLER => "Server_SetController",
        SV_DESTROY_OBJECT => "Server_DestroyObject",
        SV_UNIT_SPLINE => "Server_UnitSpline",
        SV_PLAYER => "Server_Player",
        SV_NPC => "Server_Npc",
        SV_UNIT_TELEPORT => "Server_UnitTeleport",
        SV_UNIT_ORIENTATION => "Server_UnitOrientation",
        SV_CAST_START => "Server_CastStart",
        SV_CAST_STOP => "Server_CastStop",
        SV_SPELL_GO => "Server_SpellGo",
        SV_COMBAT_MSG => "Server_CombatMsg",
        SV_UNIT_AURAS => "Server_UnitAuras",
        SV_COOLDOWN => "Server_Cooldown",
        SV_AGGRO_MOB => "Server_AggroMob",
        SV_INVENTORY => "Server_Inventory",
        SV_BANK => "Server_Bank",
        SV_OPEN_BANK => "Server_OpenBank",
        SV_EQUIP_ITEM => "Server_EquipItem",
        SV_NOTIFY_ITEM_ADD => "Server_NotifyItemAdd",
        SV_OPEN_LOOT_WINDOW => "Server_OpenLootWindow",
        SV_OBJECT_WAS_LOOTED => "Server_OnObjectWasLooted",
        SV_UPDATE_VENDOR_STOCK => "Server_UpdateVendorStock",
        SV_EXP_NOTIFY => "Server_ExpNotify",
        SV_LVL_RESPONSE => "Server_LvlResponse",
        SV_SPENT_GOLD => "Server_SpentGold",
        SV_QUEST_LIST => "Server_QuestList",
        SV_ACCEPTED_QUEST => "Server_AcceptedQuest",
        SV_QUEST_TALLY => "Server_QuestTally",
        SV_QUEST_COMPLETE => "Server_QuestComplete",
        SV_REWARDED_QUEST => "Server_RewardedQuest",
        SV_ABANDON_QUEST => "Server_AbandonQuest",
        SV_CHAT_MSG => "Server_ChatMsg",
        SV_CHAT_ERROR => "Server_ChatError",
        SV_GOSSIP_MENU => "Server_GossipMenu",
        SV_OBJECT_VARIABLE => "Server_ObjectVariable",
        SV_WORLD_ERROR => "Server_WorldError",
        SV_RESPAWN_RESPONSE => "Server_RespawnResponse",

        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_opcodes_have_names() {
        assert_eq!(opcode_name(MUTUAL_PING), "Mutual_Ping");
        assert_eq!(opcode_name(CL_CAST_SPELL), "Client_CastSpell");
        assert_eq!(opcode_name(SV_COMBAT_MSG), "Server_CombatMsg");
    }

    #[test]
    fn unknown_opcode_is_unknown() {
        assert_eq!(opcode_name(0xFFFF), "Unknown");
    }
}
