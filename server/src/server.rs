//! The server core: connection accept, the per-session socket pump, frame
//! dispatch, the fixed-tick world update, and the shutdown drain.
//!
//! Single-threaded and cooperative: every handler, combat resolution, and
//! broadcast runs here. The only other threads are the signal listener and
//! the background save worker.

use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context as AnyhowContext, Result};

use duskmere_core::config::Config;

use crate::clock::GameClock;
use crate::combat::spells;
use crate::context::Ctx;
use crate::db::async_saver::AsyncSaver;
use crate::db::characters::save_snapshot;
use crate::db::database::Database;
use crate::db::game_data::GameData;
use crate::handlers;
use crate::router::PacketRouter;
use crate::session::wall_now;
use crate::session_manager::{self, SessionManager};
use crate::world::ai;
use crate::world::map_manager::MapManager;
use crate::world::player::SAVE_INTERVAL_SECS;
use crate::world::spawner::Spawner;
use crate::world::world_manager::WorldManager;

/// Idle sleep between loop iterations when no tick is due.
const IDLE_SLEEP: Duration = Duration::from_millis(2);

pub struct Server {
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
    listener: Option<TcpListener>,
    last_status_tick: u64,
    /// GUIDs whose queued save failed on the worker. The worker never
    /// touches live entities, so it reports here and the world thread
    /// re-flags the players on the next tick.
    failed_saves: Arc<Mutex<Vec<u32>>>,
}

impl Server {
    pub fn new(config: Config, data: GameData, db: Arc<Database>, rng_seed: u64) -> Server {
        let mut router = PacketRouter::new();
        handlers::register_all(&mut router);

        let world = WorldManager::new(config.view_distance, rng_seed);
        let maps = MapManager::new(config.maps_path.clone());

        Server {
            config,
            data,
            db,
            saver: AsyncSaver::spawn(),
            clock: GameClock::new(crate::clock::DEFAULT_TICK_RATE),
            sessions: SessionManager::new(),
            world,
            maps,
            spawner: Spawner::new(),
            router,
            listener: None,
            last_status_tick: 0,
            failed_saves: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Preload the start zones and their spawns so first logins never pay
    /// the map load.
    pub fn preload_start_zones(&mut self) {
        let ids = self.data.preload_map_ids();
        self.maps.preload(&self.data, &ids);
        for map_id in ids {
            self.spawner.load_spawns_for_map(
                &self.data,
                &mut self.world,
                &mut self.sessions,
                map_id,
            );
        }
    }

    pub fn start_listening(&mut self) -> Result<()> {
        let address = format!("0.0.0.0:{}", self.config.port);
        let listener = TcpListener::bind(&address)
            .with_context(|| format!("failed to bind to port {}", self.config.port))?;
        listener
            .set_nonblocking(true)
            .context("failed to set listener non-blocking")?;
        log::info!("Listening on port {}", self.config.port);
        self.listener = Some(listener);
        Ok(())
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

    /// Main loop: runs until the quit flag is raised.
    pub fn run(&mut self, quit: &Arc<AtomicBool>) {
        self.clock.start();
        log::info!("Server started.");

        while !quit.load(Ordering::SeqCst) {
            let should_tick = self.clock.tick();

            self.accept_new();
            self.pump_sessions();

            if should_tick {
                self.tick_update();
            } else {
                std::thread::sleep(IDLE_SLEEP);
            }
        }
    }

    fn accept_new(&mut self) {
        let Some(listener) = self.listener.as_ref() else {
            return;
        };
        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    if self.sessions.count() >= self.config.max_connections {
                        log::warn!("Connection from {addr} rejected (server full)");
                        drop(stream);
                        continue;
                    }
                    if let Err(e) = stream.set_nonblocking(true) {
                        log::warn!("Failed to set socket non-blocking: {e}");
                        continue;
                    }
                    let _ = stream.set_nodelay(true);
                    let id = self.sessions.create(wall_now());
                    if let Some(session) = self.sessions.get_mut(id) {
                        session.set_socket(stream, addr);
                    }
                    log::info!("Session {id} connected from {addr}");
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::error!("Accept failed: {e}");
                    break;
                }
            }
        }
    }

    /// Read every session's socket, dispatch complete frames in arrival
    /// order, and flush outbound queues.
    fn pump_sessions(&mut self) {
        let mut ids = self.sessions.ids();
        ids.sort_unstable();

        for id in ids {
            if let Some(session) = self.sessions.get_mut(id) {
                session.pump_read();
            }

            loop {
                let next = match self.sessions.get_mut(id) {
                    Some(session) if !session.is_disconnecting() => session.next_frame(),
                    _ => None,
                };
                let Some((opcode, mut payload)) = next else {
                    break;
                };

                let router = &self.router;
                let mut ctx = Ctx {
                    config: &self.config,
                    data: &self.data,
                    db: &self.db,
                    saver: &self.saver,
                    clock: &self.clock,
                    sessions: &mut self.sessions,
                    world: &mut self.world,
                    maps: &mut self.maps,
                    spawner: &mut self.spawner,
                };
                router.dispatch(&mut ctx, id, opcode, &mut payload);
            }

            if let Some(session) = self.sessions.get_mut(id) {
                session.pump_write();
            }
        }
    }

    /// One world tick: sweeps, cast bars, auras, AI, respawns, periodic
    /// saves, and the end-of-tick variable flush.
    fn tick_update(&mut self) {
        let dt = self.clock.delta_time();
        let dt_ms = (dt * 1000.0) as i32;
        let now = wall_now();

        {
            let mut ctx = self.ctx();
            session_manager::sweep(&mut ctx, now);
            spells::update_casts(&mut ctx, dt_ms);
            spells::update_auras(&mut ctx, dt_ms);
            ai::update_npcs(&mut ctx, dt);
        }

        self.spawner
            .update(dt, &self.data, &mut self.world, &mut self.sessions);

        self.run_periodic_saves(dt);
        self.world.flush_dirty_variables(&mut self.sessions);

        // Periodic status line, roughly once a minute.
        let status_every = 60 * self.clock.tick_rate() as u64;
        if self.clock.tick_count() - self.last_status_tick >= status_every {
            self.last_status_tick = self.clock.tick_count();
            log::info!(
                "Uptime: {} | Sessions: {} | Players: {} | NPCs: {} | Ticks: {}",
                self.clock.uptime_string(),
                self.sessions.count(),
                self.world.player_count(),
                self.world.npc_count(),
                self.clock.tick_count()
            );
        }
    }

    /// Queue a save for each dirty player whose save timer has elapsed.
    /// The dirty bit is cleared when the task is queued; a task that fails
    /// on the worker reports the GUID back and the player is re-flagged,
    /// so the next periodic cycle retries.
    fn run_periodic_saves(&mut self, dt: f32) {
        self.requeue_failed_saves();

        for guid in self.world.all_player_guids() {
            let snapshot = {
                let Some(player) = self.world.player_mut(guid) else {
                    continue;
                };
                player.save_timer += dt;
                if !player.is_dirty() || player.save_timer < SAVE_INTERVAL_SECS {
                    continue;
                }
                player.clear_dirty();
                player.quest_log.clear_dirty();
                player.snapshot()
            };

            let db = self.db.clone();
            let name = snapshot.character.name.clone();
            let failed = self.failed_saves.clone();
            self.saver.queue(Box::new(move || {
                if let Err(e) = save_snapshot(&db, &snapshot) {
                    failed
                        .lock()
                        .unwrap_or_else(|p| p.into_inner())
                        .push(guid);
                    return Err(e.context(format!("periodic save for '{name}'")));
                }
                log::debug!("Periodic save for '{name}'");
                Ok(())
            }));
        }
    }

    /// Re-flag players whose background save failed since the last tick.
    fn requeue_failed_saves(&mut self) {
        let failed: Vec<u32> = {
            let mut list = self
                .failed_saves
                .lock()
                .unwrap_or_else(|p| p.into_inner());
            std::mem::take(&mut *list)
        };
        for guid in failed {
            if let Some(player) = self.world.player_mut(guid) {
                player.mark_dirty();
            }
        }
    }

    /// The shutdown drain: stop accepting, disconnect everyone with a
    /// reason, run one final cycle to deliver it, then flush the save
    /// queue synchronously.
    pub fn shutdown(&mut self) {
        log::info!("Initiating graceful shutdown...");

        self.listener = None;
        log::info!("Stopped accepting connections");

        {
            let mut ctx = self.ctx();
            session_manager::disconnect_all(&mut ctx, "Server shutting down");
        }

        // One last cycle delivers the reason packets and tears down the
        // remaining sessions.
        self.tick_update();
        for id in self.sessions.ids() {
            if let Some(session) = self.sessions.get_mut(id) {
                session.pump_write();
            }
        }

        self.saver.flush();
        self.saver.stop();

        log::info!("Final uptime: {}", self.clock.uptime_string());
        log::info!("Total ticks processed: {}", self.clock.tick_count());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::characters::CharacterRecord;
    use crate::db::schema::SERVER_SCHEMA;
    use crate::world::player::Player;

    fn test_server() -> Server {
        let db = Database::open_in_memory().unwrap();
        db.execute_batch(SERVER_SCHEMA).unwrap();
        Server::new(Config::default(), GameData::default(), Arc::new(db), 1)
    }

    fn spawn_test_player(server: &mut Server, guid: i32) -> u32 {
        let record = CharacterRecord {
            guid,
            account_id: 1,
            name: format!("Hero{guid}"),
            class_id: 1,
            level: 1,
            health: 100,
            mana: 50,
            map_id: 1,
            ..Default::default()
        };
        let session_id = server.sessions.create(0);
        let player = Player::from_record(&record, session_id, &[], &[], &[], &[], &[]);
        let (world, sessions) = (&mut server.world, &mut server.sessions);
        world.spawn_player(player, sessions);
        guid as u32
    }

    #[test]
    fn failed_background_save_restores_the_dirty_bit() {
        let mut server = test_server();
        let guid = spawn_test_player(&mut server, 7);

        // Break the store out from under the worker.
        server
            .db
            .execute_batch("DROP TABLE character_inventory")
            .unwrap();

        {
            let player = server.world.player_mut(guid).unwrap();
            player.mark_dirty();
            player.save_timer = SAVE_INTERVAL_SECS;
        }
        server.run_periodic_saves(0.0);
        // The bit clears when the task is queued...
        assert!(!server.world.player(guid).unwrap().is_dirty());

        // ...and comes back once the worker has reported the failure.
        server.saver.flush();
        server.requeue_failed_saves();
        assert!(server.world.player(guid).unwrap().is_dirty());
    }

    #[test]
    fn successful_background_save_stays_clean() {
        let mut server = test_server();
        let guid = spawn_test_player(&mut server, 8);
        server
            .db
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO characters (guid, account_id, name, class_id) \
                     VALUES (8, 1, 'Hero8', 1)",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        {
            let player = server.world.player_mut(guid).unwrap();
            player.mark_dirty();
            player.save_timer = SAVE_INTERVAL_SECS;
        }
        server.run_periodic_saves(0.0);
        server.saver.flush();
        server.requeue_failed_saves();
        assert!(!server.world.player(guid).unwrap().is_dirty());
    }
}
