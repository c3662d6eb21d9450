//! Engine - composition root of the bridge
//!
//! Owns the settings store, the paired-device repository behind the sync
//! bridge, the link supervisor and the hardware view. Frontends (the CLI,
//! an embedding application) build one engine and drive everything through
//! it.

use std::sync::Arc;

use cbridge_core::prelude::*;
use cbridge_link::{
    capability, BindOutcome, CompanionTransport, LocalHardware, MetadataSource,
    ServiceBindingSupervisor, StatusFileMetadata, SupervisorScope, WsTransport,
};

use crate::config::BridgeConfig;
use crate::provider::{ContentSyncBridge, CredentialSource, DeviceSource, SettingsSource};
use crate::repository::JsonFileRepository;
use crate::store::{keys, SettingsStore};

const SETTINGS_FILENAME: &str = "settings.json";
const DEVICES_FILENAME: &str = "paired_devices.json";

/// Orchestration engine for the companion bridge.
pub struct BridgeEngine<T: CompanionTransport, M> {
    config: BridgeConfig,
    store: Arc<SettingsStore>,
    bridge: ContentSyncBridge<JsonFileRepository>,
    supervisor: ServiceBindingSupervisor<T, M>,
    hardware: Box<dyn LocalHardware>,
}

impl BridgeEngine<WsTransport, StatusFileMetadata> {
    /// Build the production engine: WebSocket link, status-file metadata and
    /// the platform's hardware view.
    pub async fn from_config(config: BridgeConfig) -> Result<Self> {
        let transport = WsTransport::new(&config.companion.endpoint)?;
        let metadata = StatusFileMetadata::new(config.companion.status_file.clone());
        Self::with_parts(config, transport, metadata, platform_hardware()).await
    }
}

impl<T, M> BridgeEngine<T, M>
where
    T: CompanionTransport + Send + Sync + 'static,
    M: MetadataSource + Send + Sync + 'static,
{
    /// Build an engine around the given link parts.
    ///
    /// Opens the settings store and the device repository under
    /// `storage.data_dir`.
    pub async fn with_parts(
        config: BridgeConfig,
        transport: T,
        metadata: M,
        hardware: Box<dyn LocalHardware>,
    ) -> Result<Self> {
        let data_dir = &config.storage.data_dir;
        info!("Opening bridge data in {}", data_dir.display());

        let store = Arc::new(SettingsStore::open(data_dir.join(SETTINGS_FILENAME)).await?);
        let repository = JsonFileRepository::open(data_dir.join(DEVICES_FILENAME)).await?;
        let credentials = CredentialSource::new(
            config.credentials.certificate_path.clone(),
            config.credentials.private_key_path.clone(),
        );

        let bridge = ContentSyncBridge::new(
            SettingsSource::new(Arc::clone(&store)),
            DeviceSource::new(repository),
            credentials,
        );
        let supervisor = ServiceBindingSupervisor::new(transport, metadata, SupervisorScope::new());

        Ok(Self {
            config,
            store,
            bridge,
            supervisor,
            hardware,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SettingsStore> {
        &self.store
    }

    pub fn bridge(&self) -> &ContentSyncBridge<JsonFileRepository> {
        &self.bridge
    }

    pub fn supervisor(&self) -> &ServiceBindingSupervisor<T, M> {
        &self.supervisor
    }

    pub fn scope(&self) -> &SupervisorScope {
        self.supervisor.scope()
    }

    pub fn hardware(&self) -> &dyn LocalHardware {
        self.hardware.as_ref()
    }

    /// Pull the companion's shared settings into the local store when they
    /// are newer than the last sync.
    pub async fn sync_companion_settings(&self) -> Result<bool> {
        let snapshot = self.supervisor.metadata().companion_settings().await;
        self.store.merge_from_companion(&snapshot).await
    }

    /// Whether haptics should go over the companion link right now.
    pub async fn route_haptics_remotely(&self) -> bool {
        capability::evaluate(
            self.supervisor.metadata(),
            self.hardware.as_ref(),
            self.config.haptics.prioritize_remote,
        )
        .await
    }

    /// Build version the companion reports, if any.
    pub async fn companion_build_version(&self) -> Option<String> {
        self.supervisor.metadata().build_version().await
    }

    /// Record activity, sync settings and bind the companion link.
    ///
    /// Store failures are logged; they never prevent the bind.
    pub async fn start(&self) -> BindOutcome {
        let now = chrono::Utc::now().timestamp_millis();
        if let Err(e) = self.store.write(&keys::LAST_ACTIVE_AT, &now).await {
            warn!("Failed to record activity: {}", e);
        }
        if let Err(e) = self.sync_companion_settings().await {
            warn!("Failed to sync companion settings: {}", e);
        }
        match self.companion_build_version().await {
            Some(version) => info!("Companion build {}", version),
            None => debug!("Companion build version unknown"),
        }
        self.supervisor.bind().await
    }

    pub async fn shutdown(&self) {
        self.supervisor.unbind().await;
    }
}

/// Evdev on Linux, nothing elsewhere.
pub fn platform_hardware() -> Box<dyn LocalHardware> {
    #[cfg(target_os = "linux")]
    {
        Box::new(cbridge_link::EvdevHardware)
    }

    #[cfg(not(target_os = "linux"))]
    {
        Box::new(cbridge_link::NoHardware)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SyncPath;
    use cbridge_link::test_utils::{FakeMetadata, FakeTransport, StaticHardware};
    use cbridge_link::{ConnectionState, NoHardware, ELIGIBLE_VENDOR_ID};
    use serde_json::json;
    use tempfile::TempDir;

    fn config_in(temp: &TempDir) -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.storage.data_dir = temp.path().to_path_buf();
        config
    }

    #[tokio::test]
    async fn test_start_binds_and_stamps_activity() {
        let temp = TempDir::new().unwrap();
        let transport = FakeTransport::new();
        let engine = BridgeEngine::with_parts(
            config_in(&temp),
            transport.clone(),
            FakeMetadata::running(),
            Box::new(NoHardware),
        )
        .await
        .unwrap();

        assert!(engine.start().await.is_initiated());
        assert_eq!(engine.supervisor().state().await, ConnectionState::Bound);
        assert!(engine.store().read(&keys::LAST_ACTIVE_AT).await > 0);

        engine.shutdown().await;
        assert_eq!(transport.unbind_calls(), 1);
    }

    #[tokio::test]
    async fn test_start_merges_newer_companion_settings() {
        let temp = TempDir::new().unwrap();
        let metadata = FakeMetadata::running();
        let snapshot = json!({
            "companion_last_active_at": 10,
            "separate_screen_display": true
        });
        if let serde_json::Value::Object(map) = snapshot {
            metadata.set_settings(map);
        }

        let engine = BridgeEngine::with_parts(
            config_in(&temp),
            FakeTransport::new(),
            metadata,
            Box::new(NoHardware),
        )
        .await
        .unwrap();
        engine.start().await;

        assert!(engine.store().read(&keys::SEPARATE_SCREEN_DISPLAY).await);
        assert!(!engine.sync_companion_settings().await.unwrap());
    }

    #[tokio::test]
    async fn test_haptics_follow_hardware_and_config() {
        let temp = TempDir::new().unwrap();
        let mut config = config_in(&temp);
        config.haptics.prioritize_remote = false;

        let engine = BridgeEngine::with_parts(
            config,
            FakeTransport::new(),
            FakeMetadata::haptics_ready(),
            Box::new(StaticHardware::single(ELIGIBLE_VENDOR_ID, 0x0037, 2)),
        )
        .await
        .unwrap();

        assert!(!engine.route_haptics_remotely().await);
    }

    #[tokio::test]
    async fn test_companion_build_version() {
        let temp = TempDir::new().unwrap();
        let metadata = FakeMetadata::haptics_ready();
        let engine = BridgeEngine::with_parts(
            config_in(&temp),
            FakeTransport::new(),
            metadata,
            Box::new(NoHardware),
        )
        .await
        .unwrap();
        assert_eq!(engine.companion_build_version().await.as_deref(), Some("4.0.0"));

        let unknown = BridgeEngine::with_parts(
            config_in(&temp),
            FakeTransport::new(),
            FakeMetadata::running(),
            Box::new(NoHardware),
        )
        .await
        .unwrap();
        assert!(unknown.companion_build_version().await.is_none());
    }

    #[tokio::test]
    async fn test_bridge_uses_data_dir() {
        let temp = TempDir::new().unwrap();
        let engine = BridgeEngine::with_parts(
            config_in(&temp),
            FakeTransport::new(),
            FakeMetadata::default(),
            Box::new(NoHardware),
        )
        .await
        .unwrap();

        let mut record = serde_json::Map::new();
        record.insert("name".into(), json!("auto_close_running_game_countdown_sec"));
        record.insert("value".into(), json!(20));
        engine
            .bridge()
            .insert_or_replace(SyncPath::Settings, record, &[])
            .await
            .unwrap();

        assert!(temp.path().join(SETTINGS_FILENAME).exists());
    }
}
