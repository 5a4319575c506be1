//! Server configuration, read from an INI-shaped file.
//!
//! Sections: `[Server]` (`Port`, `MaxConnections`, `ViewDistance`),
//! `[Database]` (`GameDbPath`, `MapsPath`, `ServerDbPath`), `[Logging]`
//! (`Level`). Lines starting with `#` or `;` are comments. Values may be
//! quoted to preserve leading/trailing spaces.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub max_connections: usize,
    /// Visibility range in world units; 0 means everyone on the same map
    /// sees everyone.
    pub view_distance: f32,
    pub game_db_path: String,
    pub maps_path: String,
    pub server_db_path: String,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8080,
            max_connections: 100,
            view_distance: 0.0,
            game_db_path: "data/game.db".to_string(),
            maps_path: "data/maps".to_string(),
            server_db_path: "data/server.db".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("could not open config file {}", path.display()))?;
        Ok(Self::parse(&text))
    }

    pub fn parse(text: &str) -> Config {
        let mut config = Config::default();
        let mut section = String::new();

        for (line_num, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                match rest.find(']') {
                    Some(end) => section = rest[..end].to_string(),
                    None => log::warn!("Malformed section at line {}: {}", line_num + 1, line),
                }
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                log::warn!("Malformed line {} (no '='): {}", line_num + 1, line);
                continue;
            };
            let key = key.trim();
            let value = unquote(value.trim());

            match (section.as_str(), key) {
                ("Server", "Port") => set_number(&mut config.port, value, key),
                ("Server", "MaxConnections") => set_number(&mut config.max_connections, value, key),
                ("Server", "ViewDistance") => match value.parse::<f32>() {
                    Ok(v) if v >= 0.0 => config.view_distance = v,
                    _ => log::warn!("Invalid value for ViewDistance: {value}"),
                },
                ("Database", "GameDbPath") => config.game_db_path = value.to_string(),
                ("Database", "MapsPath") => config.maps_path = value.to_string(),
                ("Database", "ServerDbPath") => config.server_db_path = value.to_string(),
                ("Logging", "Level") => config.log_level = value.to_ascii_lowercase(),
                _ => log::debug!("Ignoring unknown config key [{section}] {key}"),
            }
        }

        config
    }
}

/// Strip one matching pair of single or double quotes, keeping any spaces
/// they protect.
fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn set_number<T: std::str::FromStr>(slot: &mut T, value: &str, key: &str) {
    match value.parse::<T>() {
        Ok(v) => *slot = v,
        Err(_) => log::warn!("Invalid value for {key}: {value}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_connections, 100);
        assert_eq!(config.view_distance, 0.0);
    }

    #[test]
    fn parses_sections_and_comments() {
        let config = Config::parse(
            "# server settings\n\
             [Server]\n\
             Port = 9999\n\
             MaxConnections = 25\n\
             ; database\n\
             [Database]\n\
             GameDbPath = data/world.db\n\
             [Logging]\n\
             Level = Debug\n",
        );
        assert_eq!(config.port, 9999);
        assert_eq!(config.max_connections, 25);
        assert_eq!(config.game_db_path, "data/world.db");
        assert_eq!(config.log_level, "debug");
        // Untouched keys keep their defaults.
        assert_eq!(config.server_db_path, "data/server.db");
    }

    #[test]
    fn quoted_values_keep_spaces() {
        let config = Config::parse("[Database]\nMapsPath = \" maps with spaces \"\n");
        assert_eq!(config.maps_path, " maps with spaces ");
    }

    #[test]
    fn bad_numbers_keep_defaults() {
        let config = Config::parse("[Server]\nPort = banana\n");
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn keys_outside_sections_are_ignored() {
        let config = Config::parse("Port = 1234\n[Server]\nPort = 4321\n");
        assert_eq!(config.port, 4321);
    }
}
