//! # cbridge-link - Companion Service Link
//!
//! Owns the remote-procedure link to the companion service: the transport
//! seam, the binding supervisor with death detection and rebind, the
//! metadata side channel and the haptics capability gate.
//!
//! Depends on [`cbridge_core`] for error handling.
//!
//! ## Public API
//!
//! ### Transport (`transport`, `ws`)
//! - [`CompanionTransport`] / [`LinkHandle`] - Bind/unbind and per-link calls
//! - [`WsTransport`] - JSON-RPC over WebSocket implementation
//!
//! ### Supervision (`supervisor`, `scope`)
//! - [`ServiceBindingSupervisor`] - `Unbound -> Binding -> Bound -> Dead` state machine
//! - [`SupervisorScope`] - Task scope routing failures to a [`Diagnostic`] channel
//!
//! ### Capabilities (`metadata`, `capability`, `hardware`)
//! - [`MetadataSource`] / [`StatusFileMetadata`] - Flags published by the companion
//! - [`should_route_haptics()`] - Pure haptics routing decision
//! - [`LocalHardware`] - Attached controller inspection

pub mod capability;
pub mod hardware;
pub mod metadata;
pub mod protocol;
pub mod scope;
pub mod supervisor;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;
pub mod transport;
pub mod ws;

/// Package identifier of the companion application.
pub const COMPANION_PACKAGE: &str = "com.razer.bianca";

/// Component name of the companion's controller service.
pub const CONTROLLER_SERVICE: &str = "com.razer.bianca.ControllerForegroundService";

/// Lowest companion capability version that exposes the haptics link.
pub const MIN_CAPABILITY_VERSION: i64 = 3_800_024;

pub use capability::{evaluate, gather, should_route_haptics, CapabilityInputs};
pub use hardware::{LocalHardware, LocalInputDevice, NoHardware, ELIGIBLE_VENDOR_ID};
pub use metadata::{CompanionStatus, LocalMetadataSource, MetadataSource, StatusFileMetadata};
pub use scope::{Diagnostic, SupervisorScope};
pub use supervisor::{BindOutcome, ConnectionState, NoOpReason, ServiceBindingSupervisor};
pub use transport::{
    CompanionTransport, DeathRecipient, LinkHandle, LocalCompanionTransport, LocalLinkHandle,
};
pub use ws::{WsLinkHandle, WsTransport};

#[cfg(target_os = "linux")]
pub use hardware::EvdevHardware;
