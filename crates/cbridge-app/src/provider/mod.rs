//! Content sync bridge.
//!
//! Exposes the settings store, the paired-device repository and the client
//! credentials to the companion through one uniform contract. Every path is
//! backed by a [`ContentSource`]; records travel as untyped JSON maps and
//! are addressed by field-equality filters.
//!
//! | Path             | Record fields                                 | Writes              |
//! |------------------|-----------------------------------------------|---------------------|
//! | `settings`       | `name`, `value`                               | upsert, no delete   |
//! | `paired_devices` | `uuid`, `name`, `addresses_json`, ...         | upsert, delete      |
//! | `credentials`    | `name`, `value`                               | none                |

mod credential_source;
mod device_source;
pub mod selection;
mod settings_source;
pub mod source;

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use cbridge_core::prelude::*;

use crate::repository::DeviceRepository;

pub use credential_source::{CredentialSource, CLIENT_CRT, CLIENT_KEY};
pub use device_source::DeviceSource;
pub use selection::parse_selection;
pub use settings_source::SettingsSource;
pub use source::ContentSource;

/// One record on the wire.
pub type Record = Map<String, Value>;

/// Addressable collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPath {
    Settings,
    PairedDevices,
    Credentials,
}

impl SyncPath {
    pub const ALL: [SyncPath; 3] = [
        SyncPath::Settings,
        SyncPath::PairedDevices,
        SyncPath::Credentials,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPath::Settings => "settings",
            SyncPath::PairedDevices => "paired_devices",
            SyncPath::Credentials => "credentials",
        }
    }
}

impl fmt::Display for SyncPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SyncPath::ALL
            .into_iter()
            .find(|path| path.as_str() == s)
            .ok_or_else(|| Error::unknown_path(s))
    }
}

/// Declared type of a record field, used to type selection arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Bool,
    Int,
    Long,
    Float,
    String,
    /// Untyped; selection arguments stay strings.
    Any,
}

/// `field == value`.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchFilter {
    pub field: String,
    pub value: Value,
}

impl MatchFilter {
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        record.get(&self.field).unwrap_or(&Value::Null) == &self.value
    }
}

/// Value of the first filter on `field`.
pub(crate) fn filter_value<'a>(filters: &'a [MatchFilter], field: &str) -> Option<&'a Value> {
    filters.iter().find(|f| f.field == field).map(|f| &f.value)
}

pub(crate) fn matches_all(record: &Record, filters: &[MatchFilter]) -> bool {
    filters.iter().all(|f| f.matches(record))
}

/// Dispatches bridge operations to the source behind each [`SyncPath`].
pub struct ContentSyncBridge<R> {
    settings: SettingsSource,
    devices: DeviceSource<R>,
    credentials: CredentialSource,
}

impl<R> ContentSyncBridge<R>
where
    R: DeviceRepository + Sync,
{
    pub fn new(settings: SettingsSource, devices: DeviceSource<R>, credentials: CredentialSource) -> Self {
        Self {
            settings,
            devices,
            credentials,
        }
    }

    /// Field table of the source behind `path`.
    pub fn fields(&self, path: SyncPath) -> &'static [(&'static str, FieldType)] {
        match path {
            SyncPath::Settings => self.settings.fields(),
            SyncPath::PairedDevices => self.devices.fields(),
            SyncPath::Credentials => self.credentials.fields(),
        }
    }

    /// Translate a `"field = ?"` selection into filters for `path`.
    pub fn filters(
        &self,
        path: SyncPath,
        selection: Option<&str>,
        args: &[String],
    ) -> Result<Vec<MatchFilter>> {
        parse_selection(selection, args, self.fields(path))
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn query(&self, path: SyncPath, filters: &[MatchFilter]) -> Result<Vec<Record>> {
        match path {
            SyncPath::Settings => self.settings.query(filters).await,
            SyncPath::PairedDevices => self.devices.query(filters).await,
            SyncPath::Credentials => self.credentials.query(filters).await,
        }
    }

    #[instrument(level = "debug", skip(self, record))]
    pub async fn insert_or_replace(
        &self,
        path: SyncPath,
        record: Record,
        filters: &[MatchFilter],
    ) -> Result<()> {
        let result = match path {
            SyncPath::Settings => self.settings.insert_or_replace(record, filters).await,
            SyncPath::PairedDevices => self.devices.insert_or_replace(record, filters).await,
            SyncPath::Credentials => self.credentials.insert_or_replace(record, filters).await,
        };
        if let Err(ref e) = result {
            warn!("Rejected write to {}: {}", path, e);
        }
        result
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn delete(&self, path: SyncPath, filters: &[MatchFilter]) -> Result<bool> {
        match path {
            SyncPath::Settings => self.settings.delete(filters).await,
            SyncPath::PairedDevices => self.devices.delete(filters).await,
            SyncPath::Credentials => self.credentials.delete(filters).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_path_names_round_trip() {
        for path in SyncPath::ALL {
            assert_eq!(path.as_str().parse::<SyncPath>().unwrap(), path);
        }
        let err = "computers".parse::<SyncPath>().unwrap_err();
        assert!(matches!(err, Error::UnknownPath { .. }));
    }

    #[test]
    fn test_filter_matching() {
        let mut record = Record::new();
        record.insert("name".into(), json!("separate_screen_display"));
        record.insert("value".into(), json!(true));

        assert!(MatchFilter::new("name", "separate_screen_display").matches(&record));
        assert!(!MatchFilter::new("name", "other").matches(&record));
        assert!(MatchFilter::new("missing", Value::Null).matches(&record));
        assert!(matches_all(&record, &[]));
        assert!(!matches_all(
            &record,
            &[
                MatchFilter::new("value", true),
                MatchFilter::new("name", "other")
            ]
        ));
    }
}
