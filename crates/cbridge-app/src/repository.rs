//! Paired host records.
//!
//! Each host the client has paired with is one [`PairedDevice`], keyed by
//! the host's stable `uuid`. [`JsonFileRepository`] keeps the whole
//! collection in one JSON file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use cbridge_core::prelude::*;

use crate::persist::{load_json, save_json};

/// One reachable address of a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressTuple {
    pub address: String,
    pub port: u16,
}

impl AddressTuple {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

/// Every address a host was last seen at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addresses {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<AddressTuple>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<AddressTuple>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual: Option<AddressTuple>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<AddressTuple>,
}

/// A paired streaming host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedDevice {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub addresses: Addresses,
    #[serde(default)]
    pub mac_address: Option<String>,
    /// Host certificate, hex encoded.
    #[serde(default)]
    pub server_cert: Option<String>,
    /// Id of the game currently running on the host, 0 when idle.
    #[serde(default)]
    pub running_game_id: i32,
    #[serde(default)]
    pub machine_identifier: Option<String>,
}

impl PairedDevice {
    pub fn new(uuid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
            addresses: Addresses::default(),
            mac_address: None,
            server_cert: None,
            running_game_id: 0,
            machine_identifier: None,
        }
    }
}

/// CRUD access to paired hosts.
#[trait_variant::make(DeviceRepository: Send)]
pub trait LocalDeviceRepository {
    async fn get(&self, uuid: &str) -> Result<Option<PairedDevice>>;

    /// Every record, ordered by uuid.
    async fn all(&self) -> Result<Vec<PairedDevice>>;

    /// Insert `device`, replacing any record with the same uuid.
    async fn upsert(&self, device: PairedDevice) -> Result<()>;

    /// Remove the record with `uuid`. Returns whether one existed.
    async fn delete(&self, uuid: &str) -> Result<bool>;
}

/// [`DeviceRepository`] persisted as a JSON array.
#[derive(Debug)]
pub struct JsonFileRepository {
    path: PathBuf,
    devices: Mutex<BTreeMap<String, PairedDevice>>,
}

impl JsonFileRepository {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records: Vec<PairedDevice> = load_json(path.clone()).await?;
        let devices: BTreeMap<_, _> = records
            .into_iter()
            .map(|device| (device.uuid.clone(), device))
            .collect();
        debug!("Opened device repository {:?} ({} hosts)", path, devices.len());
        Ok(Self {
            path,
            devices: Mutex::new(devices),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, devices: &BTreeMap<String, PairedDevice>) -> Result<()> {
        let records: Vec<&PairedDevice> = devices.values().collect();
        save_json(&self.path, &records).await
    }
}

impl DeviceRepository for JsonFileRepository {
    async fn get(&self, uuid: &str) -> Result<Option<PairedDevice>> {
        Ok(self.devices.lock().await.get(uuid).cloned())
    }

    async fn all(&self) -> Result<Vec<PairedDevice>> {
        Ok(self.devices.lock().await.values().cloned().collect())
    }

    async fn upsert(&self, device: PairedDevice) -> Result<()> {
        let mut devices = self.devices.lock().await;
        let mut staged = devices.clone();
        debug!("Saving paired host {} ({})", device.name, device.uuid);
        staged.insert(device.uuid.clone(), device);
        self.persist(&staged).await?;
        *devices = staged;
        Ok(())
    }

    async fn delete(&self, uuid: &str) -> Result<bool> {
        let mut devices = self.devices.lock().await;
        if !devices.contains_key(uuid) {
            return Ok(false);
        }
        let mut staged = devices.clone();
        staged.remove(uuid);
        self.persist(&staged).await?;
        *devices = staged;
        info!("Removed paired host {}", uuid);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::{AddressTuple, Addresses, DeviceRepository, JsonFileRepository, PairedDevice};
    use tempfile::TempDir;

    async fn open_temp() -> (TempDir, JsonFileRepository) {
        let temp = TempDir::new().unwrap();
        let repo = JsonFileRepository::open(temp.path().join("devices.json"))
            .await
            .unwrap();
        (temp, repo)
    }

    fn desktop() -> PairedDevice {
        PairedDevice {
            addresses: Addresses {
                local: Some(AddressTuple::new("192.168.1.20", 47989)),
                ..Default::default()
            },
            mac_address: Some("00:11:22:33:44:55".to_string()),
            ..PairedDevice::new("uuid-desktop", "Desktop")
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let (_temp, repo) = open_temp().await;
        repo.upsert(desktop()).await.unwrap();

        assert_eq!(repo.get("uuid-desktop").await.unwrap(), Some(desktop()));
        assert!(repo.get("uuid-laptop").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_uuid() {
        let (_temp, repo) = open_temp().await;
        repo.upsert(desktop()).await.unwrap();
        repo.upsert(PairedDevice {
            running_game_id: 7,
            ..desktop()
        })
        .await
        .unwrap();

        let all = repo.all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].running_game_id, 7);
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let (_temp, repo) = open_temp().await;
        repo.upsert(desktop()).await.unwrap();

        assert!(repo.delete("uuid-desktop").await.unwrap());
        assert!(!repo.delete("uuid-desktop").await.unwrap());
        assert!(repo.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let (temp, repo) = open_temp().await;
        repo.upsert(desktop()).await.unwrap();
        repo.upsert(PairedDevice::new("uuid-laptop", "Laptop"))
            .await
            .unwrap();
        drop(repo);

        let reopened = JsonFileRepository::open(temp.path().join("devices.json"))
            .await
            .unwrap();
        let names: Vec<String> = reopened
            .all()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["Desktop".to_string(), "Laptop".to_string()]);
    }
}
