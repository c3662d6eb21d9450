//! cbridge-app - Local state and orchestration for the companion bridge
//!
//! This crate owns everything the bridge persists and exposes: the typed
//! settings store, the paired-device repository, the content sync bridge
//! that fronts both for the companion, configuration loading, and the
//! [`BridgeEngine`] composition root that ties them to the companion link.

pub mod config;
pub mod engine;
mod persist;
pub mod provider;
pub mod repository;
pub mod signals;
pub mod store;

pub use config::{load_config, BridgeConfig};
pub use engine::{platform_hardware, BridgeEngine};
pub use provider::{ContentSyncBridge, FieldType, MatchFilter, Record, SyncPath};
pub use repository::{AddressTuple, Addresses, DeviceRepository, JsonFileRepository, PairedDevice};
pub use store::{is_read_only_key, SettingValue, SettingsStore, RESERVED_PREFIXES};
