use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use duskmere_core::config::Config;
use duskmere_server::db::database::Database;
use duskmere_server::db::game_data::GameData;
use duskmere_server::db::schema::SERVER_SCHEMA;
use duskmere_server::server::Server;

fn setup_signal_handling(
    quit_flag: Arc<AtomicBool>,
) -> (std::thread::JoinHandle<()>, signal_hook::iterator::Handle) {
    let mut signals = Signals::new([SIGINT, SIGTERM]).expect("signal registration cannot fail");
    let handle = signals.handle();

    let signal_thread = std::thread::spawn(move || {
        for signal in signals.forever() {
            match signal {
                SIGINT | SIGTERM => {
                    if !quit_flag.load(Ordering::SeqCst) {
                        log::info!("Shutdown signal received...");
                    }
                    quit_flag.store(true, Ordering::SeqCst);
                }
                _ => log::warn!("Received unsupported signal: {signal}"),
            }
        }
    });

    (signal_thread, handle)
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let config_path = args.get(1).map(String::as_str).unwrap_or("data/server.ini");

    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Could not load {config_path} ({e:#}), using defaults");
            Config::default()
        }
    };

    duskmere_core::initialize_logger(
        duskmere_core::level_filter_from_str(&config.log_level),
        Some("server.log"),
    )
    .unwrap_or_else(|e| {
        eprintln!("Failed to initialize logger: {e}. Exiting.");
        process::exit(1);
    });

    log::info!("===========================================");
    log::info!("  Duskmere Server v{}", env!("CARGO_PKG_VERSION"));
    log::info!("===========================================");
    log::info!("Process PID: {}", process::id());
    log::info!("Server Port: {}", config.port);
    log::info!("Max Connections: {}", config.max_connections);

    // The content store is a startup prerequisite: no templates, no world.
    let data = match GameData::load_from_database(&config.game_db_path) {
        Ok(data) => data,
        Err(e) => {
            log::error!("Failed to load game data from {}: {e:#}", config.game_db_path);
            process::exit(1);
        }
    };

    let db = match Database::open(&config.server_db_path) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            log::error!("Failed to open server database: {e:#}");
            process::exit(1);
        }
    };
    if let Err(e) = db.execute_batch(SERVER_SCHEMA) {
        log::error!("Failed to bootstrap server schema: {e:#}");
        process::exit(1);
    }

    let quit_flag = Arc::new(AtomicBool::new(false));
    let (signal_thread, signal_handle) = setup_signal_handling(quit_flag.clone());

    let rng_seed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let mut server = Server::new(config, data, db, rng_seed);
    server.preload_start_zones();

    if let Err(e) = server.start_listening() {
        log::error!("{e:#}");
        process::exit(1);
    }

    log::info!("Entering main game loop. Press Ctrl+C to shutdown.");
    server.run(&quit_flag);

    server.shutdown();

    signal_handle.close();
    signal_thread.join().unwrap_or_else(|e| {
        log::error!("Failed to join signal handling thread: {e:?}");
    });

    log::info!("Server stopped. Goodbye!");
}
