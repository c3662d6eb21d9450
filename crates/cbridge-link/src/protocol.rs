//! JSON-RPC 2.0 wire types for the companion link.
//!
//! Requests carry a string `id` that the companion echoes back in its
//! response. Messages without an `id` but with a `method` are notifications
//! pushed by the companion; they are logged and otherwise ignored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

use cbridge_core::prelude::*;

// ---------------------------------------------------------------------------
// Method names
// ---------------------------------------------------------------------------

/// Handshake sent right after the socket opens, naming the target service.
pub const METHOD_BIND: &str = "bindService";

/// Drive the controller's two rumble motors.
pub const METHOD_VIBRATE: &str = "doVibrate";

/// Tell the companion a streaming session has started.
pub const METHOD_GAME_START: &str = "onStartGame";

/// Tell the companion a streaming session has ended.
pub const METHOD_GAME_STOP: &str = "onStopGame";

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

/// JSON-RPC 2.0 request to the companion service.
#[derive(Debug, Serialize)]
pub struct LinkRequest {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    pub id: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl LinkRequest {
    pub fn new(id: String, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response from the companion service.
#[derive(Debug, Deserialize)]
pub struct LinkResponse {
    pub id: Option<String>,
    pub result: Option<Value>,
    pub error: Option<LinkRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Deserialize)]
pub struct LinkRpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<Value>,
}

/// The result of parsing a raw text frame.
#[derive(Debug)]
pub enum LinkMessage {
    /// A response to a request we sent.
    Response(LinkResponse),
    /// An unsolicited notification, identified by its method name.
    Notification(String),
    /// Anything we could not interpret.
    Unknown(String),
}

/// Parse a raw text frame into a [`LinkMessage`].
pub fn parse_link_message(text: &str) -> LinkMessage {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return LinkMessage::Unknown(text.to_string()),
    };

    let has_id = value.get("id").is_some_and(|v| !v.is_null());

    if has_id {
        match serde_json::from_value::<LinkResponse>(value) {
            Ok(response) => LinkMessage::Response(response),
            Err(_) => LinkMessage::Unknown(text.to_string()),
        }
    } else if let Some(method) = value.get("method").and_then(Value::as_str) {
        LinkMessage::Notification(method.to_string())
    } else {
        LinkMessage::Unknown(text.to_string())
    }
}

/// Convert a [`LinkResponse`] into the call result.
pub fn response_to_result(response: LinkResponse) -> Result<Value> {
    if let Some(error) = response.error {
        Err(Error::remote(format!(
            "companion error {}: {}",
            error.code, error.message
        )))
    } else {
        // Void methods may answer with `"result": null`, which serde maps to None.
        Ok(response.result.unwrap_or(Value::Null))
    }
}

// ---------------------------------------------------------------------------
// Request tracker
// ---------------------------------------------------------------------------

static LINK_REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> String {
    LINK_REQUEST_ID_COUNTER
        .fetch_add(1, Ordering::SeqCst)
        .to_string()
}

/// Tracks in-flight requests and matches them to responses.
///
/// Dropping the tracker drops every pending sender, so callers still waiting
/// on a receiver observe a closed channel once the link goes away.
#[derive(Default)]
pub struct RequestTracker {
    pending: HashMap<String, oneshot::Sender<LinkResponse>>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh request ID and register a pending slot for it.
    pub fn register(&mut self) -> (String, oneshot::Receiver<LinkResponse>) {
        let id = next_request_id();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.clone(), tx);
        (id, rx)
    }

    /// Deliver a response to its waiting caller.
    ///
    /// Returns `false` if no pending request has this `id`.
    pub fn complete(&mut self, id: &str, response: LinkResponse) -> bool {
        match self.pending.remove(id) {
            Some(tx) => {
                let _ = tx.send(response);
                true
            }
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_without_empty_params() {
        let request = LinkRequest::new("7".into(), METHOD_GAME_START, None);
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"jsonrpc":"2.0","id":"7","method":"onStartGame"}"#);
    }

    #[test]
    fn test_parse_response() {
        let msg = parse_link_message(r#"{"jsonrpc":"2.0","id":"3","result":{"ok":true}}"#);
        match msg {
            LinkMessage::Response(resp) => {
                assert_eq!(resp.id.as_deref(), Some("3"));
                assert!(resp.result.is_some());
            }
            other => panic!("Expected Response, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_notification() {
        let msg = parse_link_message(r#"{"jsonrpc":"2.0","method":"controllerDetached"}"#);
        assert!(matches!(msg, LinkMessage::Notification(m) if m == "controllerDetached"));
    }

    #[test]
    fn test_parse_garbage_is_unknown() {
        assert!(matches!(parse_link_message("not json"), LinkMessage::Unknown(_)));
        assert!(matches!(parse_link_message("{}"), LinkMessage::Unknown(_)));
    }

    #[test]
    fn test_error_response_maps_to_remote_error() {
        let msg = parse_link_message(
            r#"{"jsonrpc":"2.0","id":"4","error":{"code":-32601,"message":"no such method"}}"#,
        );
        let LinkMessage::Response(resp) = msg else {
            panic!("expected response");
        };
        let err = response_to_result(resp).unwrap_err();
        assert!(matches!(err, Error::Remote { .. }));
        assert!(err.to_string().contains("no such method"));
    }

    #[test]
    fn test_null_result_is_success() {
        let LinkMessage::Response(resp) =
            parse_link_message(r#"{"jsonrpc":"2.0","id":"5","result":null}"#)
        else {
            panic!("expected response");
        };
        assert_eq!(response_to_result(resp).unwrap(), Value::Null);
    }

    #[test]
    fn test_tracker_register_and_complete() {
        let mut tracker = RequestTracker::new();
        let (id, mut rx) = tracker.register();
        assert_eq!(tracker.pending_count(), 1);

        let response = LinkResponse {
            id: Some(id.clone()),
            result: Some(Value::Bool(true)),
            error: None,
        };
        assert!(tracker.complete(&id, response));
        assert_eq!(tracker.pending_count(), 0);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_tracker_unknown_id() {
        let mut tracker = RequestTracker::new();
        let response = LinkResponse {
            id: Some("nope".into()),
            result: None,
            error: None,
        };
        assert!(!tracker.complete("nope", response));
    }

    #[test]
    fn test_tracker_ids_are_unique() {
        let mut tracker = RequestTracker::new();
        let (a, _ra) = tracker.register();
        let (b, _rb) = tracker.register();
        assert_ne!(a, b);
    }

    #[test]
    fn test_dropping_tracker_closes_receivers() {
        let mut tracker = RequestTracker::new();
        let (_id, mut rx) = tracker.register();
        drop(tracker);
        assert!(rx.try_recv().is_err());
    }
}
