//! Companion metadata side channel.
//!
//! The companion publishes a JSON status snapshot describing whether its
//! controller service is running and which capabilities it supports. Every
//! value is optional: a missing snapshot or a missing field means
//! "unknown", which callers treat as `false` / `0`.
//!
//! ```json
//! {
//!   "controller_service_running": true,
//!   "capability_version": 3800024,
//!   "haptics_supported": true,
//!   "manual_vibration_supported": true,
//!   "build_version": "4.0.1",
//!   "settings": { "companion_last_active_at": 1718000000000 }
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};

use cbridge_core::prelude::*;

/// Flags published by the companion process.
#[trait_variant::make(MetadataSource: Send)]
pub trait LocalMetadataSource {
    async fn is_controller_service_running(&self) -> Option<bool>;

    async fn capability_version(&self) -> Option<i64>;

    async fn is_haptics_supported(&self) -> Option<bool>;

    async fn is_manual_vibration_supported(&self) -> Option<bool>;

    async fn build_version(&self) -> Option<String>;

    /// Settings entries the companion shares with the bridge.
    async fn companion_settings(&self) -> Map<String, Value>;
}

/// Parsed status snapshot.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CompanionStatus {
    pub controller_service_running: Option<bool>,
    pub capability_version: Option<i64>,
    pub haptics_supported: Option<bool>,
    pub manual_vibration_supported: Option<bool>,
    pub build_version: Option<String>,
    /// Settings entries the companion shares with the bridge.
    pub settings: Map<String, Value>,
}

/// [`MetadataSource`] backed by the companion's status file.
///
/// The file is re-read on every query; the companion rewrites it whenever
/// its state changes.
#[derive(Debug, Clone)]
pub struct StatusFileMetadata {
    path: PathBuf,
}

impl StatusFileMetadata {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current snapshot.
    ///
    /// A missing or unparsable file yields an empty snapshot.
    pub async fn status(&self) -> CompanionStatus {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!("No companion status at {}", self.path.display());
                return CompanionStatus::default();
            }
            Err(e) => {
                warn!(
                    "Failed to read companion status {}: {}",
                    self.path.display(),
                    e
                );
                return CompanionStatus::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(status) => status,
            Err(e) => {
                warn!(
                    "Failed to parse companion status {}: {}",
                    self.path.display(),
                    e
                );
                CompanionStatus::default()
            }
        }
    }
}

impl MetadataSource for StatusFileMetadata {
    async fn is_controller_service_running(&self) -> Option<bool> {
        self.status().await.controller_service_running
    }

    async fn capability_version(&self) -> Option<i64> {
        self.status().await.capability_version
    }

    async fn is_haptics_supported(&self) -> Option<bool> {
        self.status().await.haptics_supported
    }

    async fn is_manual_vibration_supported(&self) -> Option<bool> {
        self.status().await.manual_vibration_supported
    }

    async fn build_version(&self) -> Option<String> {
        self.status().await.build_version
    }

    async fn companion_settings(&self) -> Map<String, Value> {
        self.status().await.settings
    }
}
