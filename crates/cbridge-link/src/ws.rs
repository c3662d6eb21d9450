//! WebSocket JSON-RPC transport for the companion link.
//!
//! [`WsTransport::bind`] opens a socket to the configured endpoint, spawns a
//! background task that owns it, and performs the [`METHOD_BIND`] handshake
//! naming [`COMPANION_PACKAGE`] and [`CONTROLLER_SERVICE`].
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      WsLinkHandle                         │
//! │                                                           │
//! │  call() ──cmd chan──▶  background task                    │
//! │                        ├─ response → RequestTracker       │
//! │                        └─ socket lost → alive = false     │
//! │                                         death recipient() │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The task never reconnects. A lost socket ends the link and is reported
//! through the death recipient; whoever registered it decides what happens
//! next.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use cbridge_core::prelude::*;

use crate::protocol::{
    parse_link_message, response_to_result, LinkMessage, LinkRequest, RequestTracker, METHOD_BIND,
};
use crate::transport::{CompanionTransport, DeathRecipient, LinkHandle};
use crate::{COMPANION_PACKAGE, CONTROLLER_SERVICE};

/// Capacity of the command channel (bounded, to apply backpressure).
const CMD_CHANNEL_CAPACITY: usize = 32;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Internal messages sent from the handle to the background task.
enum LinkCommand {
    Call {
        method: String,
        params: Option<Value>,
        response_tx: oneshot::Sender<Result<Value>>,
    },
    Close,
}

// ---------------------------------------------------------------------------
// WsTransport
// ---------------------------------------------------------------------------

/// Binds to the companion over a WebSocket endpoint.
#[derive(Debug, Clone)]
pub struct WsTransport {
    endpoint: Url,
}

impl WsTransport {
    /// Create a transport for `endpoint`, which must be a `ws://` or `wss://` URL.
    pub fn new(endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::config(format!("invalid companion endpoint '{endpoint}': {e}")))?;
        match endpoint.scheme() {
            "ws" | "wss" => Ok(Self { endpoint }),
            other => Err(Error::config(format!(
                "companion endpoint must use ws or wss, got '{other}'"
            ))),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl CompanionTransport for WsTransport {
    type Handle = WsLinkHandle;

    async fn bind(&self) -> Result<WsLinkHandle> {
        info!("Binding to companion service at {}", self.endpoint);
        let (ws_stream, _response) = connect_async(self.endpoint.as_str())
            .await
            .map_err(|e| Error::bind_with(format!("connect to {}", self.endpoint), e))?;

        let handle = WsLinkHandle::spawn(ws_stream);

        let params = json!({ "package": COMPANION_PACKAGE, "service": CONTROLLER_SERVICE });
        if let Err(e) = handle.call(METHOD_BIND, Some(params)).await {
            handle.close().await;
            return Err(Error::bind_with("companion rejected bind handshake", e));
        }

        debug!("Companion link established");
        Ok(handle)
    }

    async fn unbind(&self, handle: &WsLinkHandle) -> Result<()> {
        if !handle.is_alive() {
            return Err(Error::unbind("link already released"));
        }
        handle.close().await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// WsLinkHandle
// ---------------------------------------------------------------------------

/// A clonable handle to one WebSocket link.
///
/// All clones share the same background task, liveness flag and death
/// recipient.
#[derive(Clone)]
pub struct WsLinkHandle {
    cmd_tx: mpsc::Sender<LinkCommand>,
    alive: Arc<AtomicBool>,
    recipient: Arc<Mutex<Option<DeathRecipient>>>,
}

impl std::fmt::Debug for WsLinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsLinkHandle")
            .field("alive", &self.alive.load(Ordering::SeqCst))
            .finish()
    }
}

impl WsLinkHandle {
    fn spawn(ws_stream: WsStream) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(CMD_CHANNEL_CAPACITY);
        let handle = Self {
            cmd_tx,
            alive: Arc::new(AtomicBool::new(true)),
            recipient: Arc::new(Mutex::new(None)),
        };
        tokio::spawn(run_link_task(
            ws_stream,
            cmd_rx,
            Arc::clone(&handle.alive),
            Arc::clone(&handle.recipient),
        ));
        handle
    }

    /// Close the socket. The death recipient is not invoked.
    async fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
        // Already-exited task means the socket is gone anyway.
        let _ = self.cmd_tx.send(LinkCommand::Close).await;
    }
}

fn lock_recipient(slot: &Mutex<Option<DeathRecipient>>) -> MutexGuard<'_, Option<DeathRecipient>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

impl LinkHandle for WsLinkHandle {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.cmd_tx.is_closed()
    }

    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let (response_tx, response_rx) = oneshot::channel();

        self.cmd_tx
            .send(LinkCommand::Call {
                method: method.to_string(),
                params,
                response_tx,
            })
            .await
            .map_err(|_| Error::ChannelClosed)?;

        response_rx.await.map_err(|_| Error::ChannelClosed)?
    }

    fn link_to_death(&self, recipient: DeathRecipient) -> Result<()> {
        // The link task flips `alive` under this lock, so a recipient stored
        // here is always seen by the task.
        let mut slot = lock_recipient(&self.recipient);
        if !self.is_alive() {
            return Err(Error::link_unavailable("link is already dead"));
        }
        *slot = Some(recipient);
        Ok(())
    }

    fn unlink_to_death(&self) -> Result<()> {
        match lock_recipient(&self.recipient).take() {
            Some(_) => Ok(()),
            None => Err(Error::protocol("no death recipient registered")),
        }
    }
}

// ---------------------------------------------------------------------------
// Background task
// ---------------------------------------------------------------------------

/// Owns the socket for the lifetime of one link.
///
/// Exits when every handle is dropped, on a requested close, or when the
/// socket is lost. Only the last case fires the death recipient.
async fn run_link_task(
    ws_stream: WsStream,
    mut cmd_rx: mpsc::Receiver<LinkCommand>,
    alive: Arc<AtomicBool>,
    recipient: Arc<Mutex<Option<DeathRecipient>>>,
) {
    let mut tracker = RequestTracker::new();
    let lost = run_io_loop(ws_stream, &mut cmd_rx, &mut tracker).await;

    let recipient = {
        let mut slot = lock_recipient(&recipient);
        alive.store(false, Ordering::SeqCst);
        slot.take()
    };
    drop(tracker);

    if lost {
        warn!("Companion link lost");
        if let Some(recipient) = recipient {
            recipient();
        }
    }

    debug!("Companion link task exiting");
}

/// Run the read/write select loop.
///
/// Returns `true` if the socket was lost, `false` on a requested close.
async fn run_io_loop(
    ws_stream: WsStream,
    cmd_rx: &mut mpsc::Receiver<LinkCommand>,
    tracker: &mut RequestTracker,
) -> bool {
    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    loop {
        tokio::select! {
            frame = ws_stream.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_ws_text(text.as_str(), tracker);
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        debug!("Companion link: received Close frame");
                        return true;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!("Companion link: read error: {}", err);
                        return true;
                    }
                    None => {
                        debug!("Companion link: stream ended");
                        return true;
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(LinkCommand::Call { method, params, response_tx }) => {
                        handle_call(&method, params, response_tx, tracker, &mut ws_sink).await;
                    }
                    Some(LinkCommand::Close) | None => {
                        send_close(&mut ws_sink).await;
                        return false;
                    }
                }
            }
        }
    }
}

fn handle_ws_text(text: &str, tracker: &mut RequestTracker) {
    match parse_link_message(text) {
        LinkMessage::Response(mut response) => {
            if let Some(id) = response.id.take() {
                if !tracker.complete(&id, response) {
                    debug!("Companion link: response for unknown request id {}", id);
                }
            }
        }
        LinkMessage::Notification(method) => {
            debug!("Companion link: notification {}", method);
        }
        LinkMessage::Unknown(raw) => {
            debug!(
                "Companion link: ignoring unknown message: {}",
                raw.chars().take(120).collect::<String>()
            );
        }
    }
}

/// Register the request, write it to the socket and forward the eventual
/// response to `response_tx`.
async fn handle_call(
    method: &str,
    params: Option<Value>,
    response_tx: oneshot::Sender<Result<Value>>,
    tracker: &mut RequestTracker,
    ws_sink: &mut SplitSink<WsStream, WsMessage>,
) {
    let (id, response_rx) = tracker.register();
    let request = LinkRequest::new(id, method, params);

    let json = match serde_json::to_string(&request) {
        Ok(j) => j,
        Err(err) => {
            let _ = response_tx.send(Err(err.into()));
            return;
        }
    };

    if let Err(err) = ws_sink.send(WsMessage::Text(json.into())).await {
        let _ = response_tx.send(Err(Error::remote_with(
            format!("send {method}"),
            err,
        )));
        return;
    }

    tokio::spawn(async move {
        let result = match response_rx.await {
            Ok(response) => response_to_result(response),
            Err(_) => Err(Error::ChannelClosed),
        };
        let _ = response_tx.send(result);
    });
}

async fn send_close(ws_sink: &mut SplitSink<WsStream, WsMessage>) {
    let _ = ws_sink.send(WsMessage::Close(None)).await;
    let _ = ws_sink.close().await;
}
