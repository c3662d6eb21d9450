//! Test doubles for the companion link.
//!
//! [`FakeTransport`] hands out [`FakeHandle`]s and counts bind/unbind calls;
//! tests fire death notifications on a handle to drive the supervisor.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use cbridge_core::prelude::*;

use crate::hardware::{LocalHardware, LocalInputDevice};
use crate::metadata::{CompanionStatus, MetadataSource};
use crate::transport::{CompanionTransport, DeathRecipient, LinkHandle};
use crate::MIN_CAPABILITY_VERSION;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Yield to other tasks until `cond` holds. Returns `false` if it never does.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..1000 {
        if cond() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    cond()
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TransportState {
    bind_calls: AtomicUsize,
    unbind_calls: AtomicUsize,
    failing_binds: AtomicUsize,
    dead_links: AtomicBool,
    die_during_link: AtomicBool,
    handles: Mutex<Vec<FakeHandle>>,
}

#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<TransportState>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_calls(&self) -> usize {
        self.state.bind_calls.load(Ordering::SeqCst)
    }

    pub fn unbind_calls(&self) -> usize {
        self.state.unbind_calls.load(Ordering::SeqCst)
    }

    /// Make the next `n` binds fail with a connection error.
    pub fn fail_next_binds(&self, n: usize) {
        self.state.failing_binds.store(n, Ordering::SeqCst);
    }

    /// Hand out links that are already dead.
    pub fn hand_out_dead_links(&self, dead: bool) {
        self.state.dead_links.store(dead, Ordering::SeqCst);
    }

    /// Make the next handle die, from another thread, right after its death
    /// recipient is registered.
    pub fn die_during_next_link(&self) {
        self.state.die_during_link.store(true, Ordering::SeqCst);
    }

    /// Every handle handed out so far, oldest first.
    pub fn handles(&self) -> Vec<FakeHandle> {
        lock(&self.state.handles).clone()
    }

    pub fn last_handle(&self) -> Option<FakeHandle> {
        lock(&self.state.handles).last().cloned()
    }
}

impl CompanionTransport for FakeTransport {
    type Handle = FakeHandle;

    async fn bind(&self) -> Result<FakeHandle> {
        self.state.bind_calls.fetch_add(1, Ordering::SeqCst);

        let failing = self.state.failing_binds.load(Ordering::SeqCst);
        if failing > 0 {
            self.state.failing_binds.store(failing - 1, Ordering::SeqCst);
            return Err(Error::bind("connection refused"));
        }

        let handle = FakeHandle::new(!self.state.dead_links.load(Ordering::SeqCst));
        if self.state.die_during_link.swap(false, Ordering::SeqCst) {
            handle.state.die_on_link.store(true, Ordering::SeqCst);
        }
        lock(&self.state.handles).push(handle.clone());
        Ok(handle)
    }

    async fn unbind(&self, handle: &FakeHandle) -> Result<()> {
        self.state.unbind_calls.fetch_add(1, Ordering::SeqCst);
        if !handle.is_alive() {
            return Err(Error::unbind("link already released"));
        }
        handle.kill_quietly();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

struct HandleState {
    alive: AtomicBool,
    fail_calls: AtomicBool,
    die_on_link: AtomicBool,
    recipient: Mutex<Option<DeathRecipient>>,
    calls: Mutex<Vec<(String, Option<Value>)>>,
}

#[derive(Clone)]
pub struct FakeHandle {
    state: Arc<HandleState>,
}

impl FakeHandle {
    fn new(alive: bool) -> Self {
        Self {
            state: Arc::new(HandleState {
                alive: AtomicBool::new(alive),
                fail_calls: AtomicBool::new(false),
                die_on_link: AtomicBool::new(false),
                recipient: Mutex::new(None),
                calls: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Mark the link dead and notify the registered recipient, if any.
    pub fn fire_death(&self) {
        self.state.alive.store(false, Ordering::SeqCst);
        if let Some(recipient) = self.recipient() {
            recipient();
        }
    }

    /// Mark the link dead without notifying anyone.
    pub fn kill_quietly(&self) {
        self.state.alive.store(false, Ordering::SeqCst);
    }

    pub fn fail_calls(&self, fail: bool) {
        self.state.fail_calls.store(fail, Ordering::SeqCst);
    }

    pub fn recipient(&self) -> Option<DeathRecipient> {
        lock(&self.state.recipient).clone()
    }

    pub fn has_recipient(&self) -> bool {
        lock(&self.state.recipient).is_some()
    }

    /// Method names called on this link, in order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state.calls)
            .iter()
            .map(|(method, _)| method.clone())
            .collect()
    }

    pub fn last_params(&self) -> Option<Option<Value>> {
        lock(&self.state.calls)
            .last()
            .map(|(_, params)| params.clone())
    }
}

impl LinkHandle for FakeHandle {
    fn is_alive(&self) -> bool {
        self.state.alive.load(Ordering::SeqCst)
    }

    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        lock(&self.state.calls).push((method.to_string(), params));
        if self.state.fail_calls.load(Ordering::SeqCst) {
            return Err(Error::remote(format!("{method} failed")));
        }
        Ok(Value::Null)
    }

    fn link_to_death(&self, recipient: DeathRecipient) -> Result<()> {
        if !self.is_alive() {
            return Err(Error::link_unavailable("link is already dead"));
        }
        *lock(&self.state.recipient) = Some(recipient);
        if self.state.die_on_link.swap(false, Ordering::SeqCst) {
            let handle = self.clone();
            let _ = std::thread::spawn(move || handle.fire_death()).join();
        }
        Ok(())
    }

    fn unlink_to_death(&self) -> Result<()> {
        match lock(&self.state.recipient).take() {
            Some(_) => Ok(()),
            None => Err(Error::protocol("no death recipient registered")),
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Scripted [`MetadataSource`]; clones share the same status.
#[derive(Clone, Default)]
pub struct FakeMetadata {
    status: Arc<Mutex<CompanionStatus>>,
}

impl FakeMetadata {
    pub fn new(status: CompanionStatus) -> Self {
        Self {
            status: Arc::new(Mutex::new(status)),
        }
    }

    /// Controller service running, no capability flags.
    pub fn running() -> Self {
        Self::new(CompanionStatus {
            controller_service_running: Some(true),
            ..Default::default()
        })
    }

    /// Controller service running with every haptics capability.
    pub fn haptics_ready() -> Self {
        Self::new(CompanionStatus {
            controller_service_running: Some(true),
            capability_version: Some(MIN_CAPABILITY_VERSION),
            haptics_supported: Some(true),
            manual_vibration_supported: Some(true),
            build_version: Some("4.0.0".to_string()),
            ..Default::default()
        })
    }

    pub fn set_service_running(&self, running: Option<bool>) {
        lock(&self.status).controller_service_running = running;
    }

    pub fn set_settings(&self, settings: serde_json::Map<String, Value>) {
        lock(&self.status).settings = settings;
    }
}

impl MetadataSource for FakeMetadata {
    async fn is_controller_service_running(&self) -> Option<bool> {
        lock(&self.status).controller_service_running
    }

    async fn capability_version(&self) -> Option<i64> {
        lock(&self.status).capability_version
    }

    async fn is_haptics_supported(&self) -> Option<bool> {
        lock(&self.status).haptics_supported
    }

    async fn is_manual_vibration_supported(&self) -> Option<bool> {
        lock(&self.status).manual_vibration_supported
    }

    async fn build_version(&self) -> Option<String> {
        lock(&self.status).build_version.clone()
    }

    async fn companion_settings(&self) -> serde_json::Map<String, Value> {
        lock(&self.status).settings.clone()
    }
}

// ---------------------------------------------------------------------------
// Hardware
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct StaticHardware {
    pub devices: Vec<LocalInputDevice>,
}

impl StaticHardware {
    pub fn single(vendor_id: u16, product_id: u16, vibrator_count: usize) -> Self {
        Self {
            devices: vec![LocalInputDevice {
                name: "test controller".to_string(),
                vendor_id,
                product_id,
                vibrator_count,
            }],
        }
    }
}

impl LocalHardware for StaticHardware {
    fn input_devices(&self) -> Vec<LocalInputDevice> {
        self.devices.clone()
    }
}
