//! Runtime configuration: env-JSON, then `config.json` on disk, then
//! compiled defaults. Grounded on the teacher's `src/config.rs`.

use log::LevelFilter;
use serde::Deserialize;
use std::{env, fs::read_to_string, path::Path};

/// Environment variable key the config may be loaded from directly as JSON.
const CONFIG_ENV_KEY: &str = "GATEWAY_CONFIG_JSON";

/// Listen ports for both transports (spec.md §6 "Ports").
#[derive(Deserialize, Clone, Copy)]
#[serde(default)]
pub struct PortsConfig {
    pub blue_box_http: u16,
    pub sfs2x_direct: u16,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            blue_box_http: 8080,
            sfs2x_direct: 9933,
        }
    }
}

/// Per-transport enable toggles (spec.md §6 "CLI / environment").
#[derive(Deserialize, Clone, Copy)]
#[serde(default)]
pub struct ProtocolConfig {
    pub enable_bluebox_http: bool,
    pub enable_sfs2x_direct: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            enable_bluebox_http: true,
            enable_sfs2x_direct: true,
        }
    }
}

/// Idle/reap timeouts, in minutes/seconds as named (spec.md §5 "Timeouts").
#[derive(Deserialize, Clone, Copy)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub session_idle_min: u64,
    pub room_idle_min: u64,
    pub reap_interval_sec: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            session_idle_min: 30,
            room_idle_min: 60,
            reap_interval_sec: 60,
        }
    }
}

#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub ports: PortsConfig,
    pub protocol: ProtocolConfig,
    pub timeouts: TimeoutsConfig,
    /// Maximum accepted frame payload, in bytes (spec.md §4.1).
    pub max_frame_size: usize,
    /// Whether the BlueBox endpoint should trust `X-Forwarded-For`/
    /// `X-Real-IP` over the transport peer address (spec.md §6 "Client
    /// identity headers").
    pub reverse_proxy: bool,
    pub logging: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ports: PortsConfig::default(),
            protocol: ProtocolConfig::default(),
            timeouts: TimeoutsConfig::default(),
            max_frame_size: crate::codec::DEFAULT_MAX_FRAME_SIZE,
            reverse_proxy: true,
            logging: LevelFilter::Info,
        }
    }
}

/// Loads a [`Config`] from the environment, then disk, falling back to
/// `None` (the caller should use [`Config::default`]) if neither is
/// present or parses cleanly.
pub fn load_config() -> Option<Config> {
    if let Ok(env_value) = env::var(CONFIG_ENV_KEY) {
        return match serde_json::from_str(&env_value) {
            Ok(config) => Some(config),
            Err(err) => {
                eprintln!("failed to parse {CONFIG_ENV_KEY} (using defaults): {err:?}");
                None
            }
        };
    }

    let path = Path::new("config.json");
    if !path.exists() {
        return None;
    }

    let data = match read_to_string(path) {
        Ok(value) => value,
        Err(err) => {
            eprintln!("failed to read config.json (using defaults): {err:?}");
            return None;
        }
    };

    match serde_json::from_str(&data) {
        Ok(config) => Some(config),
        Err(err) => {
            eprintln!("failed to parse config.json (using defaults): {err:?}");
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.ports.blue_box_http, 8080);
        assert_eq!(config.ports.sfs2x_direct, 9933);
        assert_eq!(config.timeouts.session_idle_min, 30);
        assert_eq!(config.timeouts.room_idle_min, 60);
        assert_eq!(config.timeouts.reap_interval_sec, 60);
        assert_eq!(config.max_frame_size, 16 * 1024 * 1024);
    }

    #[test]
    fn missing_env_and_file_returns_none() {
        env::remove_var(CONFIG_ENV_KEY);
        // config.json is not present in the test working directory.
        assert!(load_config().is_none());
    }
}
