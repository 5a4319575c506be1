//! End-to-end flows driven through the packet router against freshly
//! constructed services: login and world entry, combat, kill/loot/level-up,
//! duplicate-login eviction, and the quest loop.

use std::sync::Arc;

use duskmere_core::config::Config;
use duskmere_core::defines::player::WorldError;
use duskmere_core::defines::spell::{
    EffectKind, HitResult, School, SpellAttributes, TargetType,
};
use duskmere_core::defines::unit::{Faction, NpcFlags};
use duskmere_core::opcodes;
use duskmere_core::packet_buffer::{extract_frame, PacketBuffer};

use duskmere_server::clock::GameClock;
use duskmere_server::combat::spells;
use duskmere_server::context::Ctx;
use duskmere_server::db::async_saver::AsyncSaver;
use duskmere_server::db::database::Database;
use duskmere_server::db::game_data::{
    ClassLevelStats, ExpLevelInfo, GameData, GossipMenu, ItemTemplate, LootEntry, MapTemplate,
    NpcTemplate, QuestTemplate, SpellTemplate,
};
use duskmere_server::db::schema::SERVER_SCHEMA;
use duskmere_server::handlers;
use duskmere_server::router::PacketRouter;
use duskmere_server::session::SessionState;
use duskmere_server::session_manager::SessionManager;
use duskmere_server::world::ai;
use duskmere_server::world::map::Map;
use duskmere_server::world::map_manager::MapManager;
use duskmere_server::world::spawner::Spawner;
use duskmere_server::world::world_manager::WorldManager;

const FIREBALL: i32 = 101;
const GOBLIN: i32 = 2001;
const QUARTERMASTER: i32 = 3001;
const QUEST_CULL: i32 = 42;
const ITEM_EMBER: i32 = 501;

struct Harness {
    config: Config,
    data: GameData,
    db: Arc<Database>,
    saver: AsyncSaver,
    clock: GameClock,
    sessions: SessionManager,
    world: WorldManager,
    maps: MapManager,
    spawner: Spawner,
    router: PacketRouter,
    listener: std::net::TcpListener,
    /// Client-side loopback ends, held open so sessions stay connected.
    _clients: Vec<std::net::TcpStream>,
}

fn fixture_data() -> GameData {
    let mut data = GameData::default();

    data.maps.insert(
        1,
        MapTemplate {
            id: 1,
            name: "veilmarsh".to_string(),
            start_x: 100.0,
            start_y: 100.0,
            start_facing: 0.0,
            preload: true,
        },
    );

    for (level, health, mana) in [
        (1, 60, 40),
        (2, 70, 45),
        (3, 80, 50),
        (4, 90, 55),
        (5, 100, 60),
        (6, 120, 70),
    ] {
        data.class_stats.insert(
            (1, level),
            ClassLevelStats {
                health,
                mana,
                strength: 10 + level,
                agility: 8,
                willpower: 8,
                intelligence: 6,
                courage: 7,
            },
        );
    }

    // 1 -> 5 costs 230 XP in total; level 5 needs another 100.
    for (level, required, kill) in [
        (1, 50, 40),
        (2, 60, 50),
        (3, 60, 60),
        (4, 60, 80),
        (5, 100, 90),
        (6, 200, 100),
    ] {
        data.exp_levels.insert(
            level,
            ExpLevelInfo {
                required_exp: required,
                kill_exp: kill,
            },
        );
    }
    data.max_level = 10;

    // Deterministic test spell: every avoidance slot suppressed so a cast
    // always lands for its base points.
    let mut fireball = SpellTemplate {
        entry: FIREBALL,
        name: "Fireball".to_string(),
        school: School::Fire,
        cast_time_ms: 1500,
        cooldown_ms: 4500,
        mana_cost: 20,
        range: 640.0,
        ..Default::default()
    };
    fireball.attributes = SpellAttributes::IMPOSSIBLE_MISS
        | SpellAttributes::IMPOSSIBLE_DODGE
        | SpellAttributes::IMPOSSIBLE_PARRY
        | SpellAttributes::IMPOSSIBLE_BLOCK
        | SpellAttributes::CANT_CRIT;
    fireball.effects[0].kind = EffectKind::SchoolDamage;
    fireball.effects[0].base_points = 30;
    fireball.effects[0].target_type = TargetType::Hostile;
    data.spells.insert(FIREBALL, fireball);

    data.npcs.insert(
        GOBLIN,
        NpcTemplate {
            entry: GOBLIN,
            name: "Goblin".to_string(),
            level: 6,
            faction: Faction::Hostile,
            flags: NpcFlags::empty(),
            max_health: 40,
            max_mana: 0,
            min_damage: 2,
            max_damage: 4,
            armor: 0,
            attack_period_ms: 2000,
            aggro_radius: 0.0,
            move_speed: 150.0,
            movement_type: duskmere_core::defines::npc::Movement::None,
            path_id: 0,
            loot_id: 7,
            gossip_menu_id: 0,
            model_id: 3,
        },
    );
    data.npcs.insert(
        QUARTERMASTER,
        NpcTemplate {
            entry: QUARTERMASTER,
            name: "Quartermaster".to_string(),
            level: 10,
            faction: Faction::Friendly,
            flags: NpcFlags::GOSSIP | NpcFlags::QUEST_GIVER,
            max_health: 500,
            max_mana: 0,
            min_damage: 1,
            max_damage: 1,
            armor: 0,
            attack_period_ms: 2000,
            aggro_radius: 0.0,
            move_speed: 0.0,
            movement_type: duskmere_core::defines::npc::Movement::None,
            path_id: 0,
            loot_id: 0,
            gossip_menu_id: 9,
            model_id: 4,
        },
    );
    data.gossip_menus.insert(9, GossipMenu { id: 9, text_id: 900 });

    data.items.insert(
        ITEM_EMBER,
        ItemTemplate {
            entry: ITEM_EMBER,
            name: "Glowing Ember".to_string(),
            equip_slot: None,
            armor: 0,
            min_damage: 0,
            max_damage: 0,
            max_stack: 10,
            required_level: 0,
            allowed_classes: 0,
            buy_price: 20,
            sell_price: 5,
            max_durability: 0,
            quality: 1,
            use_spell: 0,
            stats: Vec::new(),
        },
    );
    data.loot_tables.insert(
        7,
        vec![LootEntry {
            item_entry: ITEM_EMBER,
            chance: 100.0,
            min_count: 1,
            max_count: 1,
        }],
    );

    data.quests.insert(
        QUEST_CULL,
        QuestTemplate {
            entry: QUEST_CULL,
            title: "Cull the Goblins".to_string(),
            min_level: 1,
            start_npc: QUARTERMASTER,
            end_npc: QUARTERMASTER,
            req_npc: [GOBLIN, 0, 0, 0],
            req_count: [3, 0, 0, 0],
            reward_xp: 50,
            reward_gold: 25,
            reward_item: ITEM_EMBER,
            reward_item_count: 1,
            ..Default::default()
        },
    );

    data
}

impl Harness {
    fn new() -> Harness {
        let db = Database::open_in_memory().unwrap();
        db.execute_batch(SERVER_SCHEMA).unwrap();
        duskmere_server::db::accounts::create_account(&db, "alice", "good", 0).unwrap();

        let mut router = PacketRouter::new();
        handlers::register_all(&mut router);

        let mut maps = MapManager::new("maps");
        maps.insert(Map::empty(1, 64));

        let mut clock = GameClock::new(20);
        clock.start();

        Harness {
            config: Config::default(),
            data: fixture_data(),
            db: Arc::new(db),
            saver: AsyncSaver::spawn(),
            clock,
            sessions: SessionManager::new(),
            world: WorldManager::new(0.0, 42),
            maps,
            spawner: Spawner::new(),
            router,
            listener: std::net::TcpListener::bind("127.0.0.1:0").unwrap(),
            _clients: Vec::new(),
        }
    }

    fn ctx(&mut self) -> Ctx<'_> {
        Ctx {
            config: &self.config,
            data: &self.data,
            db: &self.db,
            saver: &self.saver,
            clock: &self.clock,
            sessions: &mut self.sessions,
            world: &mut self.world,
            maps: &mut self.maps,
            spawner: &mut self.spawner,
        }
    }

    /// A session over a real loopback socket pair, so liveness checks
    /// behave as they do in production.
    fn connect(&mut self) -> u32 {
        let addr = self.listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        let (server_end, peer) = self.listener.accept().unwrap();
        server_end.set_nonblocking(true).unwrap();
        self._clients.push(client);

        let id = self.sessions.create(1_000);
        self.sessions
            .get_mut(id)
            .unwrap()
            .set_socket(server_end, peer);
        id
    }

    fn dispatch(&mut self, session_id: u32, opcode: u16, mut payload: PacketBuffer) {
        let router = std::mem::take(&mut self.router);
        {
            let mut ctx = self.ctx();
            router.dispatch(&mut ctx, session_id, opcode, &mut payload);
        }
        self.router = router;
    }

    fn drain(&mut self, session_id: u32) -> Vec<(u16, PacketBuffer)> {
        let mut bytes = self
            .sessions
            .get_mut(session_id)
            .map(|s| s.take_pending_output())
            .unwrap_or_default();
        let mut frames = Vec::new();
        while let Ok(Some(frame)) = extract_frame(&mut bytes) {
            frames.push(frame);
        }
        frames
    }

    fn opcodes_of(frames: &[(u16, PacketBuffer)]) -> Vec<u16> {
        frames.iter().map(|(op, _)| *op).collect()
    }

    /// Advance the world by one synthetic tick of `dt_ms`.
    fn tick(&mut self, dt_ms: i32) {
        {
            let mut ctx = self.ctx();
            spells::update_casts(&mut ctx, dt_ms);
            spells::update_auras(&mut ctx, dt_ms);
            ai::update_npcs(&mut ctx, dt_ms as f32 / 1000.0);
        }
        self.spawner.update(
            dt_ms as f32 / 1000.0,
            &self.data,
            &mut self.world,
            &mut self.sessions,
        );
        self.world.flush_dirty_variables(&mut self.sessions);
    }

    fn authenticate(&mut self, session_id: u32) {
        let mut buf = PacketBuffer::new();
        buf.write_str("alice");
        buf.write_str("good");
        self.dispatch(session_id, opcodes::CL_AUTHENTICATE, buf);
    }

    fn create_character(&mut self, session_id: u32, name: &str) -> u32 {
        let mut buf = PacketBuffer::new();
        buf.write_str(name);
        buf.write_u8(1); // paladin
        buf.write_u8(0);
        buf.write_i32(0);
        self.dispatch(session_id, opcodes::CL_CHAR_CREATE, buf);

        let frames = self.drain(session_id);
        let (_, result) = frames
            .iter()
            .find(|(op, _)| *op == opcodes::SV_CHAR_CREATE_RESULT)
            .expect("creation result");
        let mut result = result.clone();
        assert_eq!(result.read_u8(), 0, "creation should succeed");
        result.read_u32()
    }

    fn enter_world(&mut self, session_id: u32, guid: u32) {
        let mut buf = PacketBuffer::new();
        buf.write_u32(guid);
        self.dispatch(session_id, opcodes::CL_ENTER_WORLD, buf);
    }

    /// Full login path, returning the player's GUID.
    fn login(&mut self, session_id: u32, name: &str) -> u32 {
        self.authenticate(session_id);
        self.drain(session_id);
        let guid = self.create_character(session_id, name);
        self.enter_world(session_id, guid);
        guid
    }

    fn spawn_npc(&mut self, entry: i32, x: f32, y: f32) -> u32 {
        let template = self.data.get_npc(entry).unwrap().clone();
        let guid = self.world.spawn_npc(&template, 1, x, y, 0.0);
        self.world.broadcast_npc_spawn(guid, &mut self.sessions);
        guid
    }

    fn cast(&mut self, session_id: u32, spell: i32, target: u32) {
        let mut buf = PacketBuffer::new();
        buf.write_i32(spell);
        buf.write_u32(target);
        self.dispatch(session_id, opcodes::CL_CAST_SPELL, buf);
    }

    fn clear_cooldowns(&mut self, guid: u32) {
        self.world.player_mut(guid).unwrap().cooldowns.clear();
    }
}

#[test]
fn login_and_enter_world() {
    let mut h = Harness::new();
    let session = h.connect();

    h.authenticate(session);
    let frames = h.drain(session);
    let (_, mut validate) = frames
        .into_iter()
        .find(|(op, _)| *op == opcodes::SV_VALIDATE)
        .expect("auth result");
    assert_eq!(validate.read_u8(), 0);
    assert_eq!(
        h.sessions.get(session).unwrap().state(),
        SessionState::Authenticated
    );

    let guid = h.create_character(session, "Anna");
    h.enter_world(session, guid);

    let frames = h.drain(session);
    let ops = Harness::opcodes_of(&frames);
    assert!(ops.contains(&opcodes::SV_NEW_WORLD));
    assert!(ops.contains(&opcodes::SV_SET_CONTROLLER));
    assert!(ops.contains(&opcodes::SV_PLAYER));

    let (_, mut new_world) = frames
        .into_iter()
        .find(|(op, _)| *op == opcodes::SV_NEW_WORLD)
        .unwrap();
    assert_eq!(new_world.read_i32(), 1);
    assert_eq!(new_world.read_f32(), 100.0);
    assert_eq!(new_world.read_f32(), 100.0);

    assert_eq!(
        h.sessions.get(session).unwrap().state(),
        SessionState::InWorld
    );
    assert_eq!(h.world.player_count(), 1);
    let player = h.world.player(guid).unwrap();
    assert_eq!(player.core.map_id, 1);
    // Level-1 paladin vitals from the class table.
    assert_eq!(player.core.max_health(), 60);
}

#[test]
fn wrong_password_is_rejected() {
    let mut h = Harness::new();
    let session = h.connect();

    let mut buf = PacketBuffer::new();
    buf.write_str("alice");
    buf.write_str("wrong");
    h.dispatch(session, opcodes::CL_AUTHENTICATE, buf);

    let frames = h.drain(session);
    let (_, mut validate) = frames
        .into_iter()
        .find(|(op, _)| *op == opcodes::SV_VALIDATE)
        .unwrap();
    assert_ne!(validate.read_u8(), 0);
    assert_eq!(
        h.sessions.get(session).unwrap().state(),
        SessionState::Connected
    );
}

/// Scenario: cast fireball on a goblin. Cast bar runs 1.5 s, then the hit
/// lands for 30, mana drops by the cost, and the cooldown is announced.
#[test]
fn cast_fireball_on_goblin() {
    let mut h = Harness::new();
    let session = h.connect();
    let guid = h.login(session, "Anna");

    // Bring Anna to level 5 vitals for the scenario numbers.
    {
        let mut ctx = h.ctx();
        duskmere_server::systems::experience::give_experience(&mut ctx, guid, 280);
    }
    let player = h.world.player(guid).unwrap();
    assert_eq!(player.level(), 5);
    assert_eq!(player.core.max_mana(), 60);

    let goblin = h.spawn_npc(GOBLIN, 228.0, 100.0);
    h.drain(session);

    h.cast(session, FIREBALL, goblin);
    let frames = h.drain(session);
    assert!(Harness::opcodes_of(&frames).contains(&opcodes::SV_CAST_START));
    assert!(h.world.player(guid).unwrap().pending_cast.is_some());

    // 1.5 s of ticks later the cast resolves.
    for _ in 0..30 {
        h.tick(50);
    }
    assert!(h.world.player(guid).unwrap().pending_cast.is_none());

    let frames = h.drain(session);
    let ops = Harness::opcodes_of(&frames);
    assert!(ops.contains(&opcodes::SV_SPELL_GO));
    assert!(ops.contains(&opcodes::SV_COOLDOWN));

    let (_, mut combat) = frames
        .iter()
        .find(|(op, _)| *op == opcodes::SV_COMBAT_MSG)
        .cloned()
        .expect("combat message");
    assert_eq!(combat.read_u32(), guid);
    assert_eq!(combat.read_u32(), goblin);
    assert_eq!(combat.read_i32(), FIREBALL);
    assert_eq!(combat.read_u8(), HitResult::Normal as u8);
    assert_eq!(combat.read_i32(), 30);

    let (_, mut cooldown) = frames
        .iter()
        .find(|(op, _)| *op == opcodes::SV_COOLDOWN)
        .cloned()
        .unwrap();
    assert_eq!(cooldown.read_i32(), FIREBALL);
    assert_eq!(cooldown.read_i32(), 4500);

    assert_eq!(h.world.player(guid).unwrap().core.mana(), 40);
    assert_eq!(h.world.npc(goblin).unwrap().core.health(), 10);

    // A second cast inside the cooldown window is refused.
    h.cast(session, FIREBALL, goblin);
    let frames = h.drain(session);
    let (_, mut error) = frames
        .into_iter()
        .find(|(op, _)| *op == opcodes::SV_WORLD_ERROR)
        .expect("cooldown gate");
    assert_eq!(error.read_u8(), WorldError::SpellNotReady as u8);
}

/// Scenario: the second fireball kills the goblin; the corpse gets loot,
/// the killer gets XP and levels up.
#[test]
fn kill_loot_and_level_up() {
    let mut h = Harness::new();
    let session = h.connect();
    let guid = h.login(session, "Anna");
    {
        let mut ctx = h.ctx();
        duskmere_server::systems::experience::give_experience(&mut ctx, guid, 280);
    }
    assert_eq!(h.world.player(guid).unwrap().level(), 5);
    // 280 XP spends 230 on levels 1-4; 50 remain towards the 100 needed.
    let goblin = h.spawn_npc(GOBLIN, 228.0, 100.0);

    for round in 0..2 {
        h.clear_cooldowns(guid);
        h.cast(session, FIREBALL, goblin);
        for _ in 0..30 {
            h.tick(50);
        }
        if round == 0 {
            assert_eq!(h.world.npc(goblin).unwrap().core.health(), 10);
        }
    }

    let npc = h.world.npc(goblin).unwrap();
    assert_eq!(npc.core.health(), 0);
    assert!(npc.core.dead);

    // Kill experience: calc(5, 6, 100) = 110, crossing the level-5
    // threshold of 100.
    let player = h.world.player(guid).unwrap();
    assert_eq!(player.level(), 6);
    assert_eq!(player.core.max_health(), 120);
    assert_eq!(player.core.max_mana(), 70);

    let frames = h.drain(session);
    let (_, mut lethal) = frames
        .iter()
        .filter(|(op, _)| *op == opcodes::SV_COMBAT_MSG)
        .last()
        .cloned()
        .expect("lethal combat message");
    lethal.read_u32();
    lethal.read_u32();
    lethal.read_i32();
    lethal.read_u8();
    lethal.read_i32();
    lethal.read_u8();
    assert!(lethal.read_bool(), "final blow is flagged lethal");

    let (_, mut exp) = frames
        .iter()
        .filter(|(op, _)| *op == opcodes::SV_EXP_NOTIFY)
        .last()
        .cloned()
        .expect("exp notify");
    assert_eq!(exp.read_i32(), 110);
    assert_eq!(exp.read_i32(), 6);

    // The corpse carries the rolled loot for the killer only.
    let loot = h.world.npc(goblin).unwrap().loot.as_ref().expect("loot container");
    assert_eq!(loot.owner_guid, guid);
    assert!(loot.items.iter().any(|i| i.entry == ITEM_EMBER));

    // Looting moves the item into the inventory.
    let mut buf = PacketBuffer::new();
    buf.write_u32(goblin);
    buf.write_u8(0);
    h.dispatch(session, opcodes::CL_LOOT_ITEM, buf);
    assert_eq!(h.world.player(guid).unwrap().inventory.count_of(ITEM_EMBER), 1);
}

/// Scenario: duplicate login. The existing session is evicted with a
/// reason; the new session proceeds.
#[test]
fn duplicate_login_kicks_existing_session() {
    let mut h = Harness::new();
    let first = h.connect();
    h.login(first, "Anna");
    assert_eq!(h.world.player_count(), 1);
    h.drain(first);

    let second = h.connect();
    h.authenticate(second);

    let first_session = h.sessions.get(first).unwrap();
    assert_eq!(first_session.state(), SessionState::Disconnecting);
    assert_eq!(
        first_session.disconnect_reason(),
        "Logged in from another location"
    );
    // The evicted session's player was torn down and the world is clear
    // for the new login.
    assert_eq!(h.world.player_count(), 0);

    // The reason packet is queued for delivery ahead of the close.
    let frames = h.drain(first);
    assert!(Harness::opcodes_of(&frames).contains(&opcodes::SV_CHAT_MSG));

    assert_eq!(
        h.sessions.get(second).unwrap().state(),
        SessionState::Authenticated
    );
    assert_eq!(h.sessions.find_by_account(1), Some(second));
}

/// Scenario: quest pickup, kill credit, and turn-in with rewards.
#[test]
fn quest_pickup_credit_and_turn_in() {
    let mut h = Harness::new();
    let session = h.connect();
    let guid = h.login(session, "Anna");
    let quartermaster = h.spawn_npc(QUARTERMASTER, 150.0, 100.0);
    h.drain(session);

    // Talk to the quartermaster: the gossip page offers quest 42.
    let mut buf = PacketBuffer::new();
    buf.write_u32(quartermaster);
    buf.write_u8(0);
    h.dispatch(session, opcodes::CL_CLICKED_GOSSIP_OPTION, buf);

    let frames = h.drain(session);
    let (_, mut gossip) = frames
        .into_iter()
        .find(|(op, _)| *op == opcodes::SV_GOSSIP_MENU)
        .expect("gossip page");
    assert_eq!(gossip.read_u32(), quartermaster);
    assert_eq!(gossip.read_i32(), 900);
    let option_count = gossip.read_u8();
    for _ in 0..option_count {
        gossip.read_u8();
        gossip.read_u8();
        gossip.read_string();
    }
    let vendor_count = gossip.read_u8();
    assert_eq!(vendor_count, 0);
    let offer_count = gossip.read_u8();
    assert_eq!(offer_count, 1);
    assert_eq!(gossip.read_i32(), QUEST_CULL);

    // Accept; the quest starts with empty progress.
    let mut buf = PacketBuffer::new();
    buf.write_i32(QUEST_CULL);
    h.dispatch(session, opcodes::CL_ACCEPT_QUEST, buf);
    let frames = h.drain(session);
    assert!(Harness::opcodes_of(&frames).contains(&opcodes::SV_ACCEPTED_QUEST));
    assert_eq!(
        h.world.player(guid).unwrap().quest_log.get(QUEST_CULL).unwrap().progress,
        [0, 0, 0, 0]
    );

    // Three goblin kills: each advances slot 0; the third completes.
    for kill in 1..=3 {
        let goblin = h.spawn_npc(GOBLIN, 228.0, 100.0);
        h.drain(session);
        h.clear_cooldowns(guid);
        for _ in 0..2 {
            h.clear_cooldowns(guid);
            h.cast(session, FIREBALL, goblin);
            for _ in 0..30 {
                h.tick(50);
            }
        }
        assert!(h.world.npc(goblin).unwrap().core.dead);

        let frames = h.drain(session);
        let tally = frames
            .iter()
            .filter(|(op, _)| *op == opcodes::SV_QUEST_TALLY)
            .last()
            .cloned();
        let (_, mut tally) = tally.expect("kill tally");
        assert_eq!(tally.read_i32(), QUEST_CULL);
        tally.read_u8();
        tally.read_i32();
        assert_eq!(tally.read_i32(), kill);

        if kill == 3 {
            let (_, mut complete) = frames
                .iter()
                .find(|(op, _)| *op == opcodes::SV_QUEST_COMPLETE)
                .cloned()
                .expect("completion notice");
            assert_eq!(complete.read_i32(), QUEST_CULL);
            assert!(complete.read_bool());
        }
    }

    // Back to the quartermaster: the page now lists the turn-in.
    let mut buf = PacketBuffer::new();
    buf.write_u32(quartermaster);
    buf.write_u8(0);
    h.dispatch(session, opcodes::CL_CLICKED_GOSSIP_OPTION, buf);
    let frames = h.drain(session);
    let (_, mut gossip) = frames
        .into_iter()
        .find(|(op, _)| *op == opcodes::SV_GOSSIP_MENU)
        .unwrap();
    gossip.read_u32();
    gossip.read_i32();
    let options = gossip.read_u8();
    for _ in 0..options {
        gossip.read_u8();
        gossip.read_u8();
        gossip.read_string();
    }
    gossip.read_u8(); // vendor items
    assert_eq!(gossip.read_u8(), 0, "no more offers");
    assert_eq!(gossip.read_u8(), 1, "one turn-in");
    assert_eq!(gossip.read_i32(), QUEST_CULL);

    // Complete: rewards land and the quest can never be taken again.
    let gold_before = h.world.player(guid).unwrap().gold();
    let mut buf = PacketBuffer::new();
    buf.write_i32(QUEST_CULL);
    h.dispatch(session, opcodes::CL_COMPLETE_QUEST, buf);

    let frames = h.drain(session);
    assert!(Harness::opcodes_of(&frames).contains(&opcodes::SV_REWARDED_QUEST));

    let player = h.world.player(guid).unwrap();
    assert_eq!(player.gold(), gold_before + 25);
    assert!(player.inventory.count_of(ITEM_EMBER) >= 1);
    assert_eq!(
        player.quest_log.get(QUEST_CULL).unwrap().status,
        duskmere_core::defines::quest::QuestStatus::Rewarded
    );

    let (offers, turnins) = duskmere_server::systems::quests::quests_for_npc(
        &h.data,
        &h.world.player(guid).unwrap().quest_log,
        h.world.player(guid).unwrap().level(),
        QUARTERMASTER,
    );
    assert!(offers.is_empty());
    assert!(turnins.is_empty());
}

/// A move request into an unwalkable cell is rejected with a typed error
/// and the position does not change.
#[test]
fn move_into_unwalkable_cell_is_rejected() {
    let mut h = Harness::new();
    let session = h.connect();
    let guid = h.login(session, "Anna");
    h.drain(session);

    // Wall off the cell at world (160..224, 96..128).
    {
        let map = Map::empty(1, 64);
        let mut map = map;
        let cell = map.cell_id_from_world_pos(200.0, 100.0);
        map.set_cell_flags(cell, duskmere_server::world::map::CellFlags::UNWALKABLE);
        h.maps.insert(map);
    }

    let mut buf = PacketBuffer::new();
    buf.write_f32(200.0);
    buf.write_f32(100.0);
    h.dispatch(session, opcodes::CL_REQUEST_MOVE, buf);

    let frames = h.drain(session);
    let (_, mut error) = frames
        .into_iter()
        .find(|(op, _)| *op == opcodes::SV_WORLD_ERROR)
        .expect("validation failure");
    assert_eq!(error.read_u8(), WorldError::InvalidTarget as u8);
    assert_eq!(h.world.player(guid).unwrap().core.x, 100.0);

    // A legal step is accepted and the position follows.
    let mut buf = PacketBuffer::new();
    buf.write_f32(150.0);
    buf.write_f32(100.0);
    h.dispatch(session, opcodes::CL_REQUEST_MOVE, buf);
    let frames = h.drain(session);
    assert!(!Harness::opcodes_of(&frames).contains(&opcodes::SV_WORLD_ERROR));
    assert_eq!(h.world.player(guid).unwrap().core.x, 150.0);
}

/// Leaving the world by requesting the character list drops the session
/// back to character select and despawns the player.
#[test]
fn leave_world_returns_to_character_select() {
    let mut h = Harness::new();
    let session = h.connect();
    let guid = h.login(session, "Anna");
    assert!(h.world.player(guid).is_some());
    h.drain(session);

    h.dispatch(session, opcodes::CL_CHARACTER_LIST, PacketBuffer::new());

    assert!(h.world.player(guid).is_none());
    assert_eq!(
        h.sessions.get(session).unwrap().state(),
        SessionState::Authenticated
    );
    let frames = h.drain(session);
    assert!(Harness::opcodes_of(&frames).contains(&opcodes::SV_CHARACTER_LIST));

    // The logout save is queued; drain it and confirm the row moved.
    h.saver.flush();
    let record = duskmere_server::db::characters::character_by_guid(&h.db, guid as i32)
        .unwrap()
        .unwrap();
    assert_eq!(record.map_id, 1);
}
