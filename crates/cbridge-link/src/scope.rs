//! Process-wide supervisory task scope.
//!
//! Tasks spawned through [`SupervisorScope::spawn`] are independent: a task
//! that returns an error or panics never cancels its siblings. Every failure
//! is logged and published on a broadcast channel of [`Diagnostic`]s.
//!
//! The scope keeps a handle to the runtime it was created on, so tasks can be
//! spawned from threads outside that runtime, such as a transport's callback
//! thread.

use std::future::Future;

use chrono::{DateTime, Local};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use cbridge_core::prelude::*;

/// Capacity of the diagnostic channel; slow subscribers lose the oldest entries.
const DIAGNOSTIC_CHANNEL_CAPACITY: usize = 64;

/// A failure reported by a supervised task or a best-effort operation.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub source: String,
    pub message: String,
    pub at: DateTime<Local>,
}

#[derive(Debug, Clone)]
pub struct SupervisorScope {
    runtime: Handle,
    diagnostics: broadcast::Sender<Diagnostic>,
}

impl Default for SupervisorScope {
    fn default() -> Self {
        Self::new()
    }
}

impl SupervisorScope {
    /// Create a scope bound to the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime context.
    pub fn new() -> Self {
        Self::with_runtime(Handle::current())
    }

    /// Create a scope that spawns onto `runtime`.
    pub fn with_runtime(runtime: Handle) -> Self {
        let (diagnostics, _) = broadcast::channel(DIAGNOSTIC_CHANNEL_CAPACITY);
        Self {
            runtime,
            diagnostics,
        }
    }

    /// Subscribe to diagnostics published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Diagnostic> {
        self.diagnostics.subscribe()
    }

    /// Log a failure and publish it to subscribers.
    pub fn report(&self, source: &str, message: impl Into<String>) {
        let message = message.into();
        error!("[{}] {}", source, message);
        self.publish(source, message);
    }

    /// Publish a non-fatal failure. Only debug builds forward it to
    /// subscribers; release builds just log it.
    pub fn notice(&self, source: &str, message: impl Into<String>) {
        let message = message.into();
        warn!("[{}] {}", source, message);
        if cfg!(debug_assertions) {
            self.publish(source, message);
        }
    }

    fn publish(&self, source: &str, message: String) {
        // No subscribers is fine.
        let _ = self.diagnostics.send(Diagnostic {
            source: source.to_string(),
            message,
            at: Local::now(),
        });
    }

    /// Spawn a supervised task on the scope's runtime. Callable from any
    /// thread.
    ///
    /// The returned handle completes after the task's outcome has been
    /// reported; it never yields the task's error.
    pub fn spawn<F>(&self, name: &'static str, task: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let scope = self.clone();
        let inner = self.runtime.spawn(task);
        self.runtime.spawn(async move {
            match inner.await {
                Ok(Ok(())) => trace!("[{}] task finished", name),
                Ok(Err(e)) => scope.report(name, e.to_string()),
                Err(join_err) if join_err.is_panic() => {
                    scope.report(name, format!("task panicked: {}", panic_message(join_err)))
                }
                Err(_) => debug!("[{}] task cancelled", name),
            }
        })
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
