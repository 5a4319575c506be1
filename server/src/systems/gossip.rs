//! Gossip pages: for a given NPC, the gossip text, its options, and, when
//! the NPC is a vendor or quest giver, the vendor stock and the quest
//! offers/turn-ins, all in the same message.

use duskmere_core::defines::player::WorldError;
use duskmere_core::defines::unit::NpcFlags;

use crate::context::Ctx;
use crate::packets::{self, GossipPage};
use crate::systems::{quests, vendor};
use crate::world::npc::MELEE_RANGE;

/// Interaction reach for talking to an NPC.
pub const GOSSIP_RANGE: f32 = MELEE_RANGE * 3.0;

/// Build and send the gossip page for `npc_guid`, and remember it as the
/// player's gossip target for follow-up quest/vendor actions.
pub fn open_gossip(ctx: &mut Ctx, player_guid: u32, npc_guid: u32) -> Result<(), WorldError> {
    let (npc_entry, flags, gossip_menu_id) = {
        let Some(npc) = ctx.world.npc(npc_guid) else {
            return Err(WorldError::InvalidTarget);
        };
        if !npc.is_alive() {
            return Err(WorldError::TargetDead);
        }
        let Some(template) = ctx.data.get_npc(npc.entry) else {
            return Err(WorldError::InvalidTarget);
        };
        let Some(player) = ctx.world.player(player_guid) else {
            return Err(WorldError::InvalidTarget);
        };
        if player.core.map_id != npc.core.map_id || !player.core.in_range(&npc.core, GOSSIP_RANGE)
        {
            return Err(WorldError::OutOfRange);
        }
        (npc.entry, template.flags, template.gossip_menu_id)
    };

    let text_id = ctx
        .data
        .gossip_menus
        .get(&gossip_menu_id)
        .map(|menu| menu.text_id)
        .unwrap_or(0);
    let options: Vec<(u8, u8, String)> = ctx
        .data
        .gossip_options(gossip_menu_id)
        .iter()
        .map(|option| (option.id as u8, option.icon as u8, option.text.clone()))
        .collect();

    let vendor_items = if flags.contains(NpcFlags::VENDOR) {
        vendor::stock_for_npc(ctx, npc_entry)
    } else {
        Vec::new()
    };

    let (quest_offers, quest_turnins) = if flags.contains(NpcFlags::QUEST_GIVER) {
        let player = ctx.world.player(player_guid).expect("checked above");
        let (offers, turnins) =
            quests::quests_for_npc(ctx.data, &player.quest_log, player.level(), npc_entry);
        let title = |id: &i32| {
            ctx.data
                .get_quest(*id)
                .map(|q| q.title.clone())
                .unwrap_or_default()
        };
        (
            offers.iter().map(|id| (*id, title(id))).collect(),
            turnins.iter().map(|id| (*id, title(id))).collect(),
        )
    } else {
        (Vec::new(), Vec::new())
    };

    let page = GossipPage {
        npc: npc_guid,
        text_id,
        options,
        vendor_items,
        quest_offers,
        quest_turnins,
    };

    let Some(player) = ctx.world.player_mut(player_guid) else {
        return Err(WorldError::InvalidTarget);
    };
    player.gossip_target = npc_guid;
    let session_id = player.session_id;
    ctx.sessions.send(session_id, &packets::gossip_menu(&page));
    Ok(())
}

/// The player's current gossip NPC, revalidated for range and liveness.
pub fn gossip_npc_entry(ctx: &Ctx, player_guid: u32) -> Result<(u32, i32), WorldError> {
    let Some(player) = ctx.world.player(player_guid) else {
        return Err(WorldError::InvalidTarget);
    };
    let npc_guid = player.gossip_target;
    let Some(npc) = ctx.world.npc(npc_guid) else {
        return Err(WorldError::InvalidTarget);
    };
    if !npc.is_alive() {
        return Err(WorldError::TargetDead);
    }
    if !player.core.in_range(&npc.core, GOSSIP_RANGE) {
        return Err(WorldError::OutOfRange);
    }
    Ok((npc_guid, npc.entry))
}
