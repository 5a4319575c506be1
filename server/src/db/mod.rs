pub mod accounts;
pub mod async_saver;
pub mod characters;
pub mod database;
pub mod game_data;
pub mod schema;
