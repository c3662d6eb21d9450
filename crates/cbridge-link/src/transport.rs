//! Transport seam between the supervisor and the companion service.
//!
//! A [`CompanionTransport`] produces [`LinkHandle`]s. The handle is the only
//! thing that knows whether the remote end is alive; it reports an
//! unexpected loss by invoking the registered [`DeathRecipient`] once.
//! Reconnect policy does not live here: the supervisor decides when to
//! bind again.

use std::sync::Arc;

use serde_json::Value;

use cbridge_core::prelude::*;

/// Callback invoked when a link dies without being released by us.
pub type DeathRecipient = Arc<dyn Fn() + Send + Sync>;

/// Opens and releases links to the companion service.
#[trait_variant::make(CompanionTransport: Send)]
pub trait LocalCompanionTransport {
    type Handle: LinkHandle + Clone + Send + Sync + 'static;

    /// Open a link to the companion's controller service.
    async fn bind(&self) -> Result<Self::Handle>;

    /// Release a link. Fails when the link was already released.
    async fn unbind(&self, handle: &Self::Handle) -> Result<()>;
}

/// One live link to the companion service.
#[trait_variant::make(LinkHandle: Send)]
pub trait LocalLinkHandle {
    /// Whether the remote end is still reachable.
    fn is_alive(&self) -> bool;

    /// Invoke a remote method and wait for its result.
    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value>;

    /// Register the callback fired when the link dies unexpectedly.
    ///
    /// Fails if the link is already dead.
    fn link_to_death(&self, recipient: DeathRecipient) -> Result<()>;

    /// Remove the registered callback.
    fn unlink_to_death(&self) -> Result<()>;
}
