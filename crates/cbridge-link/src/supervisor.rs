//! Lifecycle supervision of the companion link.
//!
//! ```text
//!   Unbound ──bind()──▶ Binding ──ok──▶ Bound
//!      ▲                  │               │
//!      └──not running / failed            │ link died
//!                                         ▼
//!              Binding ◀──rebind───────  Dead
//! ```
//!
//! Every successful bind gets a fresh generation number. The death recipient
//! registered on the handle remembers its generation, so a notification for
//! a link that has already been replaced or released is ignored. This makes
//! one death schedule exactly one rebind.
//!
//! Rebinding after a death is immediate and unbounded: there is no backoff
//! and no retry cap. A companion that keeps dying right after each bind
//! produces a bind loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use cbridge_core::prelude::*;

use crate::metadata::MetadataSource;
use crate::protocol::{METHOD_GAME_START, METHOD_GAME_STOP, METHOD_VIBRATE};
use crate::scope::SupervisorScope;
use crate::transport::{CompanionTransport, DeathRecipient, LinkHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unbound,
    Binding,
    Bound,
    /// Link lost; a rebind is already scheduled.
    Dead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoOpReason {
    AlreadyBound,
    BindPending,
    ServiceNotRunning,
    /// `unbind()` ran while the bind was in flight.
    Cancelled,
}

/// Result of [`ServiceBindingSupervisor::bind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    NoOp(NoOpReason),
    Initiated,
    Failed { message: String },
}

impl BindOutcome {
    pub fn is_initiated(&self) -> bool {
        matches!(self, BindOutcome::Initiated)
    }
}

struct LinkSlot<H> {
    state: ConnectionState,
    handle: Option<H>,
    /// Generation of the current bind attempt or bound link; 0 when neither.
    generation: u64,
}

struct Inner<T: CompanionTransport, M> {
    transport: T,
    metadata: M,
    scope: SupervisorScope,
    slot: Mutex<LinkSlot<T::Handle>>,
    next_generation: AtomicU64,
}

/// Owns the link to the companion's controller service.
///
/// Cheap to clone; all clones share one link.
pub struct ServiceBindingSupervisor<T: CompanionTransport, M> {
    inner: Arc<Inner<T, M>>,
}

impl<T: CompanionTransport, M> Clone for ServiceBindingSupervisor<T, M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, M> ServiceBindingSupervisor<T, M>
where
    T: CompanionTransport + Send + Sync + 'static,
    M: MetadataSource + Send + Sync + 'static,
{
    pub fn new(transport: T, metadata: M, scope: SupervisorScope) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                metadata,
                scope,
                slot: Mutex::new(LinkSlot {
                    state: ConnectionState::Unbound,
                    handle: None,
                    generation: 0,
                }),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.slot.lock().await.state
    }

    pub fn metadata(&self) -> &M {
        &self.inner.metadata
    }

    pub fn scope(&self) -> &SupervisorScope {
        &self.inner.scope
    }

    /// Bind to the companion service if it is running and not already bound.
    ///
    /// Never fails: problems are logged and reported as
    /// [`BindOutcome::Failed`].
    pub async fn bind(&self) -> BindOutcome {
        let attempt = {
            let mut slot = self.inner.slot.lock().await;
            match slot.state {
                ConnectionState::Bound => return BindOutcome::NoOp(NoOpReason::AlreadyBound),
                ConnectionState::Binding => return BindOutcome::NoOp(NoOpReason::BindPending),
                ConnectionState::Unbound | ConnectionState::Dead => {}
            }
            let attempt = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
            slot.state = ConnectionState::Binding;
            slot.generation = attempt;
            attempt
        };

        if self.inner.metadata.is_controller_service_running().await != Some(true) {
            debug!("Companion controller service is not running, not binding");
            self.abandon_attempt(attempt).await;
            return BindOutcome::NoOp(NoOpReason::ServiceNotRunning);
        }

        let handle = match self.inner.transport.bind().await {
            Ok(handle) => handle,
            Err(e) => return self.fail_attempt(attempt, e).await,
        };

        if let Err(e) = handle.link_to_death(self.death_recipient(attempt)) {
            self.release(&handle).await;
            return self.fail_attempt(attempt, e).await;
        }

        let mut slot = self.inner.slot.lock().await;
        if slot.state != ConnectionState::Binding || slot.generation != attempt {
            drop(slot);
            debug!("Bind attempt {} was cancelled, releasing link", attempt);
            let _ = handle.unlink_to_death();
            self.release(&handle).await;
            return BindOutcome::NoOp(NoOpReason::Cancelled);
        }
        if !handle.is_alive() {
            // Died after the recipient was registered; its notification saw
            // `Binding` and was dropped, so the rebind is scheduled here.
            slot.state = ConnectionState::Dead;
            slot.generation = 0;
            drop(slot);
            warn!(
                "Companion link died while binding (generation {}), rebinding",
                attempt
            );
            let _ = handle.unlink_to_death();
            self.spawn_rebind();
            let message = "companion link died while binding".to_string();
            self.inner.scope.notice("bind", message.clone());
            return BindOutcome::Failed { message };
        }
        slot.state = ConnectionState::Bound;
        slot.handle = Some(handle);
        info!("Bound to companion service (generation {})", attempt);
        BindOutcome::Initiated
    }

    /// Release the link. Safe to call in any state.
    pub async fn unbind(&self) {
        let handle = {
            let mut slot = self.inner.slot.lock().await;
            slot.state = ConnectionState::Unbound;
            slot.generation = 0;
            slot.handle.take()
        };

        let Some(handle) = handle else {
            debug!("Unbind requested with no active companion link");
            return;
        };

        if let Err(e) = handle.unlink_to_death() {
            warn!("Failed to unregister death recipient: {}", e);
        }
        self.release(&handle).await;
        info!("Unbound from companion service");
    }

    /// Drive the controller's rumble motors. Silently ignored without a live link.
    pub async fn vibrate(&self, low_frequency: u16, high_frequency: u16) {
        let params = json!({
            "lowFrequencyMotor": low_frequency,
            "highFrequencyMotor": high_frequency,
        });
        self.call_if_alive(METHOD_VIBRATE, Some(params)).await;
    }

    /// Tell the companion a session started. Runs on the supervisor scope.
    pub fn notify_game_start(&self) -> JoinHandle<()> {
        self.spawn_call("game-start", METHOD_GAME_START)
    }

    /// Tell the companion a session ended. Runs on the supervisor scope.
    pub fn notify_game_stop(&self) -> JoinHandle<()> {
        self.spawn_call("game-stop", METHOD_GAME_STOP)
    }

    fn spawn_call(&self, name: &'static str, method: &'static str) -> JoinHandle<()> {
        let supervisor = self.clone();
        self.inner.scope.spawn(name, async move {
            supervisor.call_if_alive(method, None).await;
            Ok(())
        })
    }

    async fn call_if_alive(&self, method: &str, params: Option<Value>) {
        let handle = {
            let slot = self.inner.slot.lock().await;
            slot.handle.as_ref().filter(|h| h.is_alive()).cloned()
        };
        let Some(handle) = handle else {
            trace!("No live companion link, dropping {}", method);
            return;
        };
        if let Err(e) = handle.call(method, params).await {
            debug!("Companion call {} failed: {}", method, e);
        }
    }

    fn spawn_rebind(&self) {
        let supervisor = self.clone();
        self.inner.scope.spawn("rebind", async move {
            let outcome = supervisor.bind().await;
            debug!("Rebind after death: {:?}", outcome);
            Ok(())
        });
    }

    fn death_recipient(&self, generation: u64) -> DeathRecipient {
        let weak = Arc::downgrade(&self.inner);
        Arc::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let supervisor = Self { inner };
            let scope = supervisor.inner.scope.clone();
            scope.spawn("link-death", async move {
                supervisor.handle_death(generation).await;
                Ok(())
            });
        })
    }

    async fn handle_death(&self, generation: u64) {
        let handle = {
            let mut slot = self.inner.slot.lock().await;
            // A death during `Binding` is picked up by `bind()` itself.
            if slot.state != ConnectionState::Bound || slot.generation != generation {
                debug!(
                    "Ignoring death notification for stale link (generation {})",
                    generation
                );
                return;
            }
            slot.state = ConnectionState::Dead;
            slot.generation = 0;
            slot.handle.take()
        };

        if let Some(handle) = handle {
            if let Err(e) = handle.unlink_to_death() {
                warn!("Failed to unregister death recipient: {}", e);
                self.inner.scope.notice("link-death", e.to_string());
            }
        }

        warn!("Companion link died (generation {}), rebinding", generation);
        let outcome = self.bind().await;
        debug!("Rebind after death: {:?}", outcome);
    }

    /// Release a handle through the transport, logging failures.
    async fn release(&self, handle: &T::Handle) {
        if let Err(e) = self.inner.transport.unbind(handle).await {
            warn!("Companion unbind failed: {}", e);
            self.inner.scope.notice("unbind", e.to_string());
        }
    }

    /// Return to `Unbound` if `attempt` is still the active bind attempt.
    async fn abandon_attempt(&self, attempt: u64) {
        let mut slot = self.inner.slot.lock().await;
        if slot.state == ConnectionState::Binding && slot.generation == attempt {
            slot.state = ConnectionState::Unbound;
            slot.generation = 0;
        }
    }

    async fn fail_attempt(&self, attempt: u64, error: Error) -> BindOutcome {
        self.abandon_attempt(attempt).await;
        let message = error.to_string();
        self.inner.scope.notice("bind", message.clone());
        BindOutcome::Failed { message }
    }
}
