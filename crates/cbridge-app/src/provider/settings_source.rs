use std::sync::Arc;

use serde_json::Value;

use cbridge_core::prelude::*;

use super::{filter_value, matches_all, ContentSource, FieldType, MatchFilter, Record, SyncPath};
use crate::store::{is_read_only_key, SettingValue, SettingsStore};

pub const FIELD_NAME: &str = "name";
pub const FIELD_VALUE: &str = "value";

const FIELDS: &[(&str, FieldType)] = &[(FIELD_NAME, FieldType::String), (FIELD_VALUE, FieldType::Any)];

/// Settings exposed as `{name, value}` records.
///
/// External writers may upsert any key outside the reserved prefixes.
/// Entries are never deleted through the bridge.
#[derive(Debug, Clone)]
pub struct SettingsSource {
    store: Arc<SettingsStore>,
}

impl SettingsSource {
    pub fn new(store: Arc<SettingsStore>) -> Self {
        Self { store }
    }

    fn to_record(name: &str, value: &SettingValue) -> Record {
        let mut record = Record::new();
        record.insert(FIELD_NAME.to_string(), Value::String(name.to_string()));
        record.insert(FIELD_VALUE.to_string(), value.to_json());
        record
    }
}

impl ContentSource for SettingsSource {
    fn fields(&self) -> &'static [(&'static str, FieldType)] {
        FIELDS
    }

    async fn query(&self, filters: &[MatchFilter]) -> Result<Vec<Record>> {
        if let Some(name) = filter_value(filters, FIELD_NAME) {
            let Some(name) = name.as_str() else {
                return Ok(Vec::new());
            };
            return Ok(self
                .store
                .get(name)
                .await
                .map(|value| Self::to_record(name, &value))
                .into_iter()
                .filter(|record| matches_all(record, filters))
                .collect());
        }

        Ok(self
            .store
            .entries()
            .await
            .iter()
            .map(|(name, value)| Self::to_record(name, value))
            .filter(|record| matches_all(record, filters))
            .collect())
    }

    /// The key comes from a `name` filter, else from the record's `name`.
    /// A `null` value clears the entry.
    async fn insert_or_replace(&self, record: Record, filters: &[MatchFilter]) -> Result<()> {
        let name = filter_value(filters, FIELD_NAME)
            .or_else(|| record.get(FIELD_NAME))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_record(format!("{FIELD_NAME} must be specified")))?;

        if is_read_only_key(name) {
            return Err(Error::read_only(name));
        }

        match record.get(FIELD_VALUE).unwrap_or(&Value::Null) {
            Value::Null => {
                self.store.remove(name).await?;
            }
            value => {
                let value = SettingValue::from_json(value).ok_or_else(|| {
                    Error::invalid_record(format!("{name}: value must be a scalar"))
                })?;
                self.store.set(name, value).await?;
            }
        }
        debug!("External write to setting {}", name);
        Ok(())
    }

    async fn delete(&self, _filters: &[MatchFilter]) -> Result<bool> {
        Err(Error::unsupported("delete", SyncPath::Settings.as_str()))
    }
}
