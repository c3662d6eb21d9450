//! End-to-end tests of the bridge engine with a scripted companion

use serde_json::{json, Value};
use tempfile::TempDir;

use cbridge_app::store::keys;
use cbridge_app::{BridgeConfig, BridgeEngine, Record, SyncPath};
use cbridge_core::{first_active_display_mode, Error, FALLBACK_DISPLAY_MODE};
use cbridge_link::test_utils::{wait_until, FakeMetadata, FakeTransport};
use cbridge_link::{ConnectionState, NoHardware};

struct Harness {
    _temp: TempDir,
    transport: FakeTransport,
    engine: BridgeEngine<FakeTransport, FakeMetadata>,
}

async fn harness(configure: impl FnOnce(&TempDir, &mut BridgeConfig)) -> Harness {
    let temp = TempDir::new().unwrap();
    let mut config = BridgeConfig::default();
    config.storage.data_dir = temp.path().join("data");
    configure(&temp, &mut config);

    let transport = FakeTransport::new();
    let engine = BridgeEngine::with_parts(
        config,
        transport.clone(),
        FakeMetadata::running(),
        Box::new(NoHardware),
    )
    .await
    .unwrap();

    Harness {
        _temp: temp,
        transport,
        engine,
    }
}

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[tokio::test]
async fn test_settings_round_trip_through_selection() {
    let h = harness(|_, _| {}).await;
    let bridge = h.engine.bridge();

    let filters = bridge
        .filters(
            SyncPath::Settings,
            Some("name = ?"),
            &args(&["separate_screen_display"]),
        )
        .unwrap();
    bridge
        .insert_or_replace(SyncPath::Settings, record(json!({ "value": true })), &filters)
        .await
        .unwrap();

    let found = bridge.query(SyncPath::Settings, &filters).await.unwrap();
    assert_eq!(
        found,
        vec![record(json!({ "name": "separate_screen_display", "value": true }))]
    );
    assert!(h.engine.store().read(&keys::SEPARATE_SCREEN_DISPLAY).await);
}

#[tokio::test]
async fn test_reserved_settings_stay_local() {
    let h = harness(|_, _| {}).await;
    let bridge = h.engine.bridge();

    let err = bridge
        .insert_or_replace(
            SyncPath::Settings,
            record(json!({ "name": "bridge_tos_accepted", "value": true })),
            &[],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ReadOnlyKey { .. }));
    assert!(!h.engine.store().read(&keys::TOS_ACCEPTED).await);

    let err = bridge.delete(SyncPath::Settings, &[]).await.unwrap_err();
    assert!(matches!(err, Error::UnsupportedOperation { .. }));
}

#[tokio::test]
async fn test_paired_device_lifecycle() {
    let h = harness(|_, _| {}).await;
    let bridge = h.engine.bridge();

    bridge
        .insert_or_replace(
            SyncPath::PairedDevices,
            record(json!({
                "uuid": "host-1",
                "name": "Living Room PC",
                "addresses_json": r#"{"local":{"address":"192.168.0.8","port":47989}}"#,
                "running_game_id": 0
            })),
            &[],
        )
        .await
        .unwrap();

    let by_uuid = bridge
        .filters(SyncPath::PairedDevices, Some("uuid = ?"), &args(&["host-1"]))
        .unwrap();
    let found = bridge.query(SyncPath::PairedDevices, &by_uuid).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["name"], json!("Living Room PC"));

    assert!(bridge.delete(SyncPath::PairedDevices, &by_uuid).await.unwrap());
    assert!(!bridge.delete(SyncPath::PairedDevices, &by_uuid).await.unwrap());
    assert!(bridge
        .query(SyncPath::PairedDevices, &[])
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_credentials_exported_hex_encoded() {
    let h = harness(|temp, config| {
        let crt = temp.path().join("client.crt");
        let key = temp.path().join("client.key");
        std::fs::write(&crt, "CRT").unwrap();
        std::fs::write(&key, "KEY").unwrap();
        config.credentials.certificate_path = Some(crt);
        config.credentials.private_key_path = Some(key);
    })
    .await;
    let bridge = h.engine.bridge();

    let filters = bridge
        .filters(SyncPath::Credentials, Some("name = client_crt"), &[])
        .unwrap();
    let found = bridge.query(SyncPath::Credentials, &filters).await.unwrap();
    assert_eq!(
        found,
        vec![record(json!({ "name": "client_crt", "value": "435254" }))]
    );

    let err = bridge
        .insert_or_replace(SyncPath::Credentials, Record::new(), &[])
        .await
        .unwrap_err();
    assert!(err.is_permanent());
}

#[tokio::test]
async fn test_link_death_triggers_one_rebind() {
    let h = harness(|_, _| {}).await;
    assert!(h.engine.start().await.is_initiated());
    assert_eq!(h.transport.bind_calls(), 1);

    let first = h.transport.last_handle().unwrap();
    let stale_recipient = first.recipient().unwrap();
    first.fire_death();

    let transport = h.transport.clone();
    assert!(wait_until(|| transport.bind_calls() == 2).await);
    let supervisor = h.engine.supervisor().clone();
    let mut bound = false;
    for _ in 0..1000 {
        if supervisor.state().await == ConnectionState::Bound {
            bound = true;
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(bound);

    // A repeated notification from the dead link changes nothing.
    stale_recipient();
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
    assert_eq!(h.transport.bind_calls(), 2);

    h.engine.shutdown().await;
    assert_eq!(h.engine.supervisor().state().await, ConnectionState::Unbound);
}

#[test]
fn test_display_mode_tiers() {
    let primary = "<root><PrimaryDisplayMode><DisplayMode><Width>2560</Width>\
        <Height>1440</Height><RefreshRate>144</RefreshRate></DisplayMode>\
        </PrimaryDisplayMode></root>";
    let mode = first_active_display_mode(primary);
    assert_eq!(mode.to_compact().as_deref(), Some("2560x1440x144"));
    assert!(mode.is_active);

    let nothing_usable = "<root><SupportedDisplayMode><DisplayMode><Width>0</Width>\
        <Height>720</Height><RefreshRate>60</RefreshRate><IsActive>1</IsActive>\
        </DisplayMode></SupportedDisplayMode></root>";
    assert_eq!(first_active_display_mode(nothing_usable), FALLBACK_DISPLAY_MODE);
}
