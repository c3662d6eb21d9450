//! Configuration types for the companion bridge
//!
//! Defines:
//! - `BridgeConfig` - Root of `config.toml`
//! - One settings struct per section

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration (`config.toml`)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub companion: CompanionSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub haptics: HapticsSettings,

    #[serde(default)]
    pub credentials: CredentialSettings,
}

/// Where the companion service lives
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompanionSettings {
    /// WebSocket URL of the companion's link endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Status snapshot the companion publishes next to its endpoint
    #[serde(default = "default_status_file")]
    pub status_file: PathBuf,
}

impl Default for CompanionSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            status_file: default_status_file(),
        }
    }
}

fn default_endpoint() -> String {
    "ws://127.0.0.1:47990/companion".to_string()
}

fn default_status_file() -> PathBuf {
    default_data_dir().join("companion-status.json")
}

/// Local persistence
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageSettings {
    /// Directory holding the settings store and the paired-device repository
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("companion-bridge")
}

/// Haptics routing preferences
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HapticsSettings {
    /// Route haptics to the companion even when the controller has local motors
    #[serde(default = "default_true")]
    pub prioritize_remote: bool,
}

impl Default for HapticsSettings {
    fn default() -> Self {
        Self {
            prioritize_remote: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Client identity exported to the companion
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CredentialSettings {
    /// PEM encoded client certificate
    #[serde(default)]
    pub certificate_path: Option<PathBuf>,

    /// Private key matching `certificate_path`
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
}
