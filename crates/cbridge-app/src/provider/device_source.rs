use serde_json::Value;

use cbridge_core::prelude::*;

use super::{filter_value, matches_all, ContentSource, FieldType, MatchFilter, Record};
use crate::repository::{Addresses, DeviceRepository, PairedDevice};

pub const FIELD_UUID: &str = "uuid";
pub const FIELD_NAME: &str = "name";
pub const FIELD_ADDRESSES: &str = "addresses_json";
pub const FIELD_MAC_ADDRESS: &str = "mac_address";
pub const FIELD_SERVER_CERT: &str = "server_cert";
pub const FIELD_RUNNING_GAME_ID: &str = "running_game_id";
pub const FIELD_MACHINE_IDENTIFIER: &str = "machine_identifier";

const FIELDS: &[(&str, FieldType)] = &[
    (FIELD_UUID, FieldType::String),
    (FIELD_NAME, FieldType::String),
    (FIELD_ADDRESSES, FieldType::String),
    (FIELD_MAC_ADDRESS, FieldType::String),
    (FIELD_SERVER_CERT, FieldType::String),
    (FIELD_RUNNING_GAME_ID, FieldType::Int),
    (FIELD_MACHINE_IDENTIFIER, FieldType::String),
];

/// Paired hosts keyed by `uuid`. Addresses travel as a JSON string.
pub struct DeviceSource<R> {
    repository: R,
}

impl<R> DeviceSource<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }
}

fn optional_string(value: &Option<String>) -> Value {
    value.clone().map_or(Value::Null, Value::String)
}

pub(crate) fn to_record(device: &PairedDevice) -> Result<Record> {
    let mut record = Record::new();
    record.insert(FIELD_UUID.into(), Value::String(device.uuid.clone()));
    record.insert(FIELD_NAME.into(), Value::String(device.name.clone()));
    record.insert(
        FIELD_ADDRESSES.into(),
        Value::String(serde_json::to_string(&device.addresses)?),
    );
    record.insert(FIELD_MAC_ADDRESS.into(), optional_string(&device.mac_address));
    record.insert(FIELD_SERVER_CERT.into(), optional_string(&device.server_cert));
    record.insert(FIELD_RUNNING_GAME_ID.into(), Value::from(device.running_game_id));
    record.insert(
        FIELD_MACHINE_IDENTIFIER.into(),
        optional_string(&device.machine_identifier),
    );
    Ok(record)
}

fn required_str<'a>(record: &'a Record, field: &str) -> Result<&'a str> {
    record
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::invalid_record(format!("{field} not specified")))
}

fn optional_str(record: &Record, field: &str) -> Option<String> {
    record.get(field).and_then(Value::as_str).map(str::to_string)
}

/// Build a device from a wire record. `uuid`, `name` and `addresses_json`
/// are required.
pub(crate) fn from_record(record: &Record) -> Result<PairedDevice> {
    let uuid = required_str(record, FIELD_UUID)?;
    let name = required_str(record, FIELD_NAME)?;
    let addresses: Addresses = serde_json::from_str(required_str(record, FIELD_ADDRESSES)?)
        .map_err(|e| Error::invalid_record(format!("{FIELD_ADDRESSES}: {e}")))?;

    let running_game_id = match record.get(FIELD_RUNNING_GAME_ID) {
        None | Some(Value::Null) => 0,
        Some(value) => value
            .as_i64()
            .and_then(|id| i32::try_from(id).ok())
            .ok_or_else(|| {
                Error::invalid_record(format!("{FIELD_RUNNING_GAME_ID} must be an integer"))
            })?,
    };

    Ok(PairedDevice {
        uuid: uuid.to_string(),
        name: name.to_string(),
        addresses,
        mac_address: optional_str(record, FIELD_MAC_ADDRESS),
        server_cert: optional_str(record, FIELD_SERVER_CERT),
        running_game_id,
        machine_identifier: optional_str(record, FIELD_MACHINE_IDENTIFIER),
    })
}

impl<R> ContentSource for DeviceSource<R>
where
    R: DeviceRepository + Sync,
{
    fn fields(&self) -> &'static [(&'static str, FieldType)] {
        FIELDS
    }

    async fn query(&self, filters: &[MatchFilter]) -> Result<Vec<Record>> {
        let devices = match filter_value(filters, FIELD_UUID) {
            Some(Value::String(uuid)) => self.repository.get(uuid).await?.into_iter().collect(),
            Some(_) => Vec::new(),
            None => self.repository.all().await?,
        };

        let mut records = Vec::with_capacity(devices.len());
        for device in &devices {
            let record = to_record(device)?;
            if matches_all(&record, filters) {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn insert_or_replace(&self, record: Record, filters: &[MatchFilter]) -> Result<()> {
        let device = from_record(&record)?;
        if let Some(target) = filter_value(filters, FIELD_UUID) {
            if target.as_str() != Some(device.uuid.as_str()) {
                return Err(Error::invalid_record(format!(
                    "record uuid {} does not match selection {}",
                    device.uuid, target
                )));
            }
        }
        self.repository.upsert(device).await
    }

    /// Without a `uuid` filter nothing is deleted.
    async fn delete(&self, filters: &[MatchFilter]) -> Result<bool> {
        match filter_value(filters, FIELD_UUID).and_then(Value::as_str) {
            Some(uuid) => self.repository.delete(uuid).await,
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{AddressTuple, JsonFileRepository};
    use serde_json::json;
    use tempfile::TempDir;

    async fn source() -> (TempDir, DeviceSource<JsonFileRepository>) {
        let temp = TempDir::new().unwrap();
        let repo = JsonFileRepository::open(temp.path().join("devices.json"))
            .await
            .unwrap();
        (temp, DeviceSource::new(repo))
    }

    fn wire(uuid: &str, name: &str) -> Record {
        match json!({
            "uuid": uuid,
            "name": name,
            "addresses_json": r#"{"local":{"address":"10.0.0.5","port":47989}}"#,
            "running_game_id": 0
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_record_conversion_keeps_fields() {
        let device = PairedDevice {
            addresses: Addresses {
                remote: Some(AddressTuple::new("203.0.113.9", 47984)),
                ..Default::default()
            },
            server_cert: Some("3082".to_string()),
            running_game_id: 881448767,
            ..PairedDevice::new("uuid-1", "Desktop")
        };
        let record = to_record(&device).unwrap();
        assert_eq!(record["running_game_id"], json!(881448767));
        assert_eq!(record["mac_address"], Value::Null);
        assert_eq!(from_record(&record).unwrap(), device);
    }

    #[test]
    fn test_required_fields() {
        for missing in [FIELD_UUID, FIELD_NAME, FIELD_ADDRESSES] {
            let mut record = wire("uuid-1", "Desktop");
            record.remove(missing);
            let err = from_record(&record).unwrap_err();
            assert!(matches!(err, Error::InvalidRecord { .. }), "{missing}");
        }

        let mut bad_addresses = wire("uuid-1", "Desktop");
        bad_addresses.insert(FIELD_ADDRESSES.into(), json!("not json"));
        assert!(from_record(&bad_addresses).is_err());
    }

    #[tokio::test]
    async fn test_insert_then_query_by_uuid() {
        let (_temp, source) = source().await;
        source.insert_or_replace(wire("uuid-1", "Desktop"), &[]).await.unwrap();
        source.insert_or_replace(wire("uuid-2", "Laptop"), &[]).await.unwrap();

        assert_eq!(source.query(&[]).await.unwrap().len(), 2);

        let one = source
            .query(&[MatchFilter::new(FIELD_UUID, "uuid-2")])
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0]["name"], json!("Laptop"));

        let by_name = source
            .query(&[MatchFilter::new(FIELD_NAME, "Desktop")])
            .await
            .unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0]["uuid"], json!("uuid-1"));
    }

    #[tokio::test]
    async fn test_replace_with_mismatched_selection_rejected() {
        let (_temp, source) = source().await;
        let err = source
            .insert_or_replace(
                wire("uuid-1", "Desktop"),
                &[MatchFilter::new(FIELD_UUID, "uuid-9")],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRecord { .. }));
        assert!(source.query(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_by_uuid() {
        let (_temp, source) = source().await;
        source.insert_or_replace(wire("uuid-1", "Desktop"), &[]).await.unwrap();

        assert!(!source.delete(&[]).await.unwrap());
        assert!(source
            .delete(&[MatchFilter::new(FIELD_UUID, "uuid-1")])
            .await
            .unwrap());
        assert!(!source
            .delete(&[MatchFilter::new(FIELD_UUID, "uuid-1")])
            .await
            .unwrap());
    }
}
