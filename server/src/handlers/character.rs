//! Character-select handlers: list, create, delete, enter world.

use anyhow::Result;

use duskmere_core::defines::object::Variable;
use duskmere_core::defines::player::Class;
use duskmere_core::opcodes;
use duskmere_core::packet_buffer::PacketBuffer;

use crate::context::Ctx;
use crate::db::characters::{self, CharacterRecord};
use crate::packets;
use crate::router::PacketRouter;
use crate::session::SessionState;
use crate::session_manager::clear_player;
use crate::systems::experience;
use crate::world::player::Player;

pub fn register(router: &mut PacketRouter) {
    // Requesting the list while in world is the voluntary leave-world
    // path, so higher states are allowed.
    router.register(
        opcodes::CL_CHARACTER_LIST,
        handle_character_list,
        SessionState::Authenticated,
        true,
    );
    router.register(
        opcodes::CL_CHAR_CREATE,
        handle_char_create,
        SessionState::Authenticated,
        false,
    );
    router.register(
        opcodes::CL_DELETE_CHARACTER,
        handle_delete_character,
        SessionState::Authenticated,
        false,
    );
    router.register(
        opcodes::CL_ENTER_WORLD,
        handle_enter_world,
        SessionState::Authenticated,
        false,
    );
}

fn send_character_list(ctx: &mut Ctx, session_id: u32, account_id: i32) -> Result<()> {
    let list = characters::characters_by_account(ctx.db, account_id)?;
    ctx.sessions.send(session_id, &packets::character_list(&list));
    Ok(())
}

fn handle_character_list(ctx: &mut Ctx, session_id: u32, _buf: &mut PacketBuffer) -> Result<()> {
    let account_id = match ctx.sessions.get(session_id) {
        Some(session) => session.account_id,
        None => return Ok(()),
    };

    // A player asking for the list from inside the world is leaving it;
    // the session drops back to character select.
    let in_world = ctx
        .sessions
        .get(session_id)
        .map(|s| s.state() == SessionState::InWorld)
        .unwrap_or(false);
    if in_world {
        clear_player(ctx, session_id);
    }

    send_character_list(ctx, session_id, account_id)
}

fn handle_char_create(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let name = buf.read_string();
    let class_id = buf.read_u8();
    let gender = buf.read_u8();
    let portrait_id = buf.read_i32();

    let account_id = match ctx.sessions.get(session_id) {
        Some(session) => session.account_id,
        None => return Ok(()),
    };

    if Class::from_id(class_id).is_none() {
        ctx.sessions.send(
            session_id,
            &packets::char_create_result(packets::CHAR_CREATE_BAD_CLASS, 0),
        );
        return Ok(());
    }
    if !characters::is_valid_name(&name) {
        ctx.sessions.send(
            session_id,
            &packets::char_create_result(packets::CHAR_CREATE_BAD_NAME, 0),
        );
        return Ok(());
    }
    if characters::is_name_taken(ctx.db, &name)? {
        ctx.sessions.send(
            session_id,
            &packets::char_create_result(packets::CHAR_CREATE_NAME_TAKEN, 0),
        );
        return Ok(());
    }

    // Starting vitals and position come from the class/level table and the
    // start map.
    let stats = ctx.data.get_class_stats(class_id, 1);
    let start = ctx
        .data
        .preload_map_ids()
        .first()
        .and_then(|&id| ctx.data.get_map(id));
    let record = CharacterRecord {
        account_id,
        name: name.clone(),
        class_id,
        gender: gender.min(1),
        portrait_id,
        level: 1,
        health: stats.map(|s| s.health).unwrap_or(100),
        mana: stats.map(|s| s.mana).unwrap_or(50),
        map_id: start.map(|m| m.id).unwrap_or(1),
        pos_x: start.map(|m| m.start_x).unwrap_or(100.0),
        pos_y: start.map(|m| m.start_y).unwrap_or(100.0),
        facing: start.map(|m| m.start_facing).unwrap_or(0.0),
        ..Default::default()
    };

    match characters::create_character(ctx.db, &record)? {
        Some(guid) => {
            log::info!("Account {account_id} created character '{name}' ({guid})");
            ctx.sessions.send(
                session_id,
                &packets::char_create_result(packets::CHAR_CREATE_OK, guid as u32),
            );
            send_character_list(ctx, session_id, account_id)?;
        }
        None => {
            ctx.sessions.send(
                session_id,
                &packets::char_create_result(packets::CHAR_CREATE_LIMIT, 0),
            );
        }
    }
    Ok(())
}

fn handle_delete_character(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let guid = buf.read_u32() as i32;
    let account_id = match ctx.sessions.get(session_id) {
        Some(session) => session.account_id,
        None => return Ok(()),
    };

    if characters::delete_character(ctx.db, guid, account_id)? {
        log::info!("Account {account_id} deleted character {guid}");
    }
    send_character_list(ctx, session_id, account_id)
}

fn handle_enter_world(ctx: &mut Ctx, session_id: u32, buf: &mut PacketBuffer) -> Result<()> {
    let guid = buf.read_u32() as i32;
    let account_id = match ctx.sessions.get(session_id) {
        Some(session) => session.account_id,
        None => return Ok(()),
    };

    let Some(record) = characters::character_by_guid(ctx.db, guid)? else {
        log::warn!("Session {session_id}: enter world with unknown character {guid}");
        return Ok(());
    };
    if record.account_id != account_id {
        log::warn!("Session {session_id}: enter world with foreign character {guid}");
        return Ok(());
    }

    // The zone must be resident before anything spawns in it.
    if ctx.maps.get_map(ctx.data, record.map_id).is_none() {
        log::error!("Session {session_id}: start map {} unavailable", record.map_id);
        return Ok(());
    }
    ctx.spawner
        .load_spawns_for_map(ctx.data, ctx.world, ctx.sessions, record.map_id);

    let (inventory, bank, equipment, quests, bonuses) = characters::load_subdata(ctx.db, guid)?;
    let player = Player::from_record(
        &record,
        session_id,
        &inventory,
        &bank,
        &equipment,
        &quests,
        &bonuses,
    );
    let player_guid = player.guid();

    if let Some(session) = ctx.sessions.get_mut(session_id) {
        session.player_guid = player_guid;
        session.set_state(SessionState::InWorld);
    }

    ctx.sessions.send(
        session_id,
        &packets::new_world(record.map_id, record.pos_x, record.pos_y, record.facing),
    );
    ctx.sessions.send(session_id, &packets::set_controller(player_guid));
    ctx.sessions.send(session_id, &packets::player_spawn(&player));
    ctx.sessions.send(session_id, &packets::inventory(&player.inventory));
    let quest_entries: Vec<(i32, u8, [i32; 4])> = player
        .quest_log
        .to_rows()
        .iter()
        .map(|row| (row.quest_id, row.status, row.progress))
        .collect();
    ctx.sessions.send(session_id, &packets::quest_list(&quest_entries));

    ctx.world.spawn_player(player, ctx.sessions);

    // Stat block and vitals from the class/level table, equipment, and
    // auras; deltas reach the client in this tick's variable flush.
    experience::apply_level_stats(ctx, player_guid, true);

    // GMs keep their invulnerability across logins.
    let gm = ctx
        .sessions
        .get(session_id)
        .map(|s| s.gm_level > 0)
        .unwrap_or(false);
    if gm {
        if let Some(player) = ctx.world.player_mut(player_guid) {
            player.core.invulnerable = true;
            player.core.set_var(Variable::GameMaster, 1);
        }
    }

    Ok(())
}
