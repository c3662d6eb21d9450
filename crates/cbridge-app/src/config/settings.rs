//! Loader for `config.toml`

use super::types::BridgeConfig;
use cbridge_core::prelude::*;
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = "companion-bridge";
const CONFIG_FILENAME: &str = "config.toml";

const DEFAULT_CONFIG: &str = r#"# Companion Bridge Configuration

[companion]
# WebSocket endpoint of the companion service
endpoint = "ws://127.0.0.1:47990/companion"
# Status snapshot published by the companion (defaults to the data dir)
# status_file = "/path/to/companion-status.json"

[storage]
# Settings store and paired devices live here (defaults to the local data dir)
# data_dir = "/path/to/data"

[haptics]
# Send haptics to the companion even when the controller has its own motors
prioritize_remote = true

[credentials]
# Client identity exported to the companion, hex encoded
# certificate_path = "/path/to/client.crt"
# private_key_path = "/path/to/client.key"
"#;

/// `<config_dir>/companion-bridge/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILENAME))
}

/// Load configuration from `explicit`, or from the default location.
///
/// Never fails: anything unreadable falls back to defaults.
pub fn load_config(explicit: Option<&Path>) -> BridgeConfig {
    match explicit.map(Path::to_path_buf).or_else(default_config_path) {
        Some(path) => load_config_from(&path),
        None => {
            debug!("No config directory on this platform, using defaults");
            BridgeConfig::default()
        }
    }
}

/// Load configuration from a specific file.
pub fn load_config_from(config_path: &Path) -> BridgeConfig {
    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return BridgeConfig::default();
    }

    match std::fs::read_to_string(config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                debug!("Loaded config from {:?}", config_path);
                config
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                BridgeConfig::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            BridgeConfig::default()
        }
    }
}

/// Write a commented default config unless one already exists.
///
/// Returns the path of the config file.
pub fn init_config_file(explicit: Option<&Path>) -> Result<PathBuf> {
    let config_path = explicit
        .map(Path::to_path_buf)
        .or_else(default_config_path)
        .ok_or_else(|| Error::config("No config directory on this platform"))?;

    if config_path.exists() {
        info!("Config already exists at {:?}", config_path);
        return Ok(config_path);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::config(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(&config_path, DEFAULT_CONFIG)
        .map_err(|e| Error::config(format!("Failed to write config.toml: {}", e)))?;

    info!("Created default config at {:?}", config_path);
    Ok(config_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = load_config(Some(&temp.path().join("config.toml")));
        assert!(config.haptics.prioritize_remote);
    }

    #[test]
    fn test_invalid_toml_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[haptics\nprioritize_remote = ").unwrap();

        let config = load_config_from(&path);
        assert!(config.haptics.prioritize_remote);
    }

    #[test]
    fn test_init_writes_parsable_default() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        let written = init_config_file(Some(&path)).unwrap();
        assert_eq!(written, path);

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: BridgeConfig = toml::from_str(&content).unwrap();
        assert!(parsed.haptics.prioritize_remote);
        assert_eq!(parsed.companion.endpoint, "ws://127.0.0.1:47990/companion");
    }

    #[test]
    fn test_init_keeps_existing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[haptics]\nprioritize_remote = false\n").unwrap();

        init_config_file(Some(&path)).unwrap();
        assert!(!load_config_from(&path).haptics.prioritize_remote);
    }
}
