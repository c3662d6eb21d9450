//! Local settings store.
//!
//! A flat map of typed scalars persisted as one JSON document. Every write
//! is staged in memory, written under an exclusive file lock and only then
//! made visible, so a failed write leaves both the file and the cache
//! untouched.
//!
//! Keys under a reserved prefix are owned by this process (`bridge`) or
//! mirrored from the companion (`companion`). The owner may write them
//! through [`SettingsStore::set`]; the sync bridge refuses external writes to
//! them, see [`is_read_only_key`].

pub mod keys;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use cbridge_core::prelude::*;

use crate::persist::{load_json, save_json};

pub use keys::{AppTheme, DisplayModeOption, SettingKey, SettingType};

/// Key prefixes that external writers may not touch.
pub const RESERVED_PREFIXES: [&str; 2] = ["bridge", "companion"];

/// True when `key` starts with one of the [`RESERVED_PREFIXES`].
pub fn is_read_only_key(key: &str) -> bool {
    RESERVED_PREFIXES.iter().any(|prefix| key.starts_with(prefix))
}

/// A stored scalar. The variant is persisted so integers and longs survive
/// a round trip unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SettingValue {
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    String(String),
}

impl SettingValue {
    /// Convert an untyped JSON value. Integers that fit in 32 bits become
    /// [`SettingValue::Int`]; `null`, arrays and objects have no setting form.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(SettingValue::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(i32::try_from(i).map_or(SettingValue::Long(i), SettingValue::Int)),
                None => n.as_f64().map(|f| SettingValue::Float(f as f32)),
            },
            Value::String(s) => Some(SettingValue::String(s.clone())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            SettingValue::Bool(b) => Value::Bool(*b),
            SettingValue::Int(i) => Value::from(*i),
            SettingValue::Long(l) => Value::from(*l),
            SettingValue::Float(f) => serde_json::Number::from_f64(f64::from(*f))
                .map_or(Value::Null, Value::Number),
            SettingValue::String(s) => Value::String(s.clone()),
        }
    }
}

/// File-backed settings store. Share it behind an `Arc`.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, SettingValue>>,
}

impl SettingsStore {
    /// Open the store at `path`, creating an empty one if the file is missing.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries: BTreeMap<String, SettingValue> = load_json(path.clone()).await?;
        debug!("Opened settings store {:?} ({} entries)", path, entries.len());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, key: &str) -> Option<SettingValue> {
        self.entries.lock().await.get(key).cloned()
    }

    /// Snapshot of every entry, ordered by key.
    pub async fn entries(&self) -> BTreeMap<String, SettingValue> {
        self.entries.lock().await.clone()
    }

    /// Create or overwrite one entry.
    pub async fn set(&self, key: &str, value: SettingValue) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let mut staged = entries.clone();
        staged.insert(key.to_string(), value);
        save_json(&self.path, &staged).await?;
        *entries = staged;
        trace!("Setting {} updated", key);
        Ok(())
    }

    /// Clear one entry. Returns whether it existed.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(key) {
            return Ok(false);
        }
        let mut staged = entries.clone();
        staged.remove(key);
        save_json(&self.path, &staged).await?;
        *entries = staged;
        Ok(true)
    }

    /// Read a typed key, falling back to its default when the entry is
    /// missing or holds a value of another type.
    pub async fn read<T: SettingType>(&self, key: &SettingKey<T>) -> T {
        self.get(key.name)
            .await
            .and_then(|value| T::from_setting(&value))
            .unwrap_or_else(|| key.default_value())
    }

    pub async fn write<T: SettingType>(&self, key: &SettingKey<T>, value: &T) -> Result<()> {
        self.set(key.name, value.to_setting()).await
    }

    /// Pull the companion's shared settings if they changed since the last
    /// sync.
    ///
    /// Nothing happens unless the snapshot's `companion_last_active_at` is
    /// newer than the local `bridge_last_sync_at`. Reserved keys and values
    /// without a scalar form are skipped. Returns whether a merge happened.
    pub async fn merge_from_companion(&self, snapshot: &Map<String, Value>) -> Result<bool> {
        let companion_active = snapshot
            .get(keys::COMPANION_LAST_ACTIVE_AT.name)
            .and_then(SettingValue::from_json)
            .and_then(|value| i64::from_setting(&value))
            .unwrap_or(0);

        let mut entries = self.entries.lock().await;
        let last_sync = entries
            .get(keys::LAST_SYNC_AT.name)
            .and_then(i64::from_setting)
            .unwrap_or(0);

        if companion_active <= last_sync {
            debug!(
                "Companion settings unchanged (active at {}, synced at {})",
                companion_active, last_sync
            );
            return Ok(false);
        }

        let mut staged = entries.clone();
        let mut copied = 0usize;
        for (key, value) in snapshot {
            if is_read_only_key(key) {
                continue;
            }
            match SettingValue::from_json(value) {
                Some(value) => {
                    staged.insert(key.clone(), value);
                    copied += 1;
                }
                None => trace!("Skipping companion setting {} with no scalar form", key),
            }
        }
        staged.insert(
            keys::LAST_SYNC_AT.name.to_string(),
            SettingValue::Long(chrono::Utc::now().timestamp_millis()),
        );

        save_json(&self.path, &staged).await?;
        *entries = staged;
        info!("Merged {} settings from the companion", copied);
        Ok(true)
    }
}
