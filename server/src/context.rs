//! The per-dispatch service context.
//!
//! The original design hung every service off a process-wide singleton;
//! here the server constructs each service once at startup and lends them
//! out together as a `Ctx`, so handlers and the tick path see exactly one
//! instance of everything and tests can build a fresh world per case.

use std::sync::Arc;

use duskmere_core::config::Config;

use crate::clock::GameClock;
use crate::db::async_saver::AsyncSaver;
use crate::db::database::Database;
use crate::db::game_data::GameData;
use crate::session_manager::SessionManager;
use crate::world::map_manager::MapManager;
use crate::world::spawner::Spawner;
use crate::world::world_manager::WorldManager;

pub struct Ctx<'a> {
    pub config: &'a Config,
    pub data: &'a GameData,
    pub db: &'a Arc<Database>,
    pub saver: &'a AsyncSaver,
    pub clock: &'a GameClock,
    pub sessions: &'a mut SessionManager,
    pub world: &'a mut WorldManager,
    pub maps: &'a mut MapManager,
    pub spawner: &'a mut Spawner,
}
