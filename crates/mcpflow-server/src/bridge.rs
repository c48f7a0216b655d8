//! The bidirectional client bridge for streamed tool calls.
//!
//! A streamed call turns one response into a sequence of framed events.
//! While the call runs, its handler may issue requests *back* to the client
//! (sampling, elicitation, roots); each such request parks a one-shot
//! waiter keyed by a fresh correlation id, and the matching answer arrives
//! later through the engine's respond channel.
//!
//! The hard invariant: no waiter outlives its call. Teardown runs on every
//! exit path — completion, handler error, cancellation, and consumer
//! disconnect (the stream guard's `Drop`) — and discards whatever this call
//! still has parked.

use crate::context::CancellationToken;
use mcpflow_core::error::{JsonRpcError, McpError};
use mcpflow_core::protocol::{Notification, Request, RequestId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// One framed event of a streamed call.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A JSON-RPC response or notification for the client.
    Message(serde_json::Value),
    /// A server-initiated request the client should answer via the respond
    /// channel.
    ServerRequest(serde_json::Value),
}

impl StreamEvent {
    /// The SSE event name for this event.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::ServerRequest(_) => "server_request",
        }
    }

    /// The JSON-RPC object this event carries.
    #[must_use]
    pub const fn payload(&self) -> &serde_json::Value {
        match self {
            Self::Message(v) | Self::ServerRequest(v) => v,
        }
    }

    /// Render as a server-sent-event frame: an `event:` line, a `data:`
    /// line, and a blank line.
    #[must_use]
    pub fn sse_frame(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event_name(), self.payload())
    }
}

type Waiter = oneshot::Sender<Result<serde_json::Value, JsonRpcError>>;

/// Engine-wide map of unanswered server-initiated requests.
///
/// Lives on the engine (not the call) because the answer arrives on a
/// different transport request; calls register their ids here and discard
/// them at teardown.
pub struct PendingRequests {
    inner: Mutex<HashMap<RequestId, Waiter>>,
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingRequests {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    fn register(&self, id: RequestId, waiter: Waiter) {
        self.inner.lock().expect("pending lock").insert(id, waiter);
    }

    /// Resolve a pending request. Returns `false` when no waiter holds the
    /// id — the caller turns that into a "no pending request" error.
    pub fn resolve(&self, id: &RequestId, outcome: Result<serde_json::Value, JsonRpcError>) -> bool {
        let waiter = self.inner.lock().expect("pending lock").remove(id);
        match waiter {
            Some(tx) => {
                if tx.send(outcome).is_err() {
                    // The awaiting side gave up (timeout or teardown) after
                    // we removed the entry. The response is moot.
                    tracing::debug!(id = %id, "response arrived for an abandoned waiter");
                }
                true
            }
            None => false,
        }
    }

    /// Drop a waiter without answering it. The awaiting side observes a
    /// closed channel.
    fn discard(&self, id: &RequestId) {
        self.inner.lock().expect("pending lock").remove(id);
    }

    /// Number of unanswered requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("pending lock").len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The per-call "send to client" facility.
pub struct ClientBridge {
    /// Taken at teardown so the event channel closes once the call is over.
    events: Mutex<Option<mpsc::UnboundedSender<StreamEvent>>>,
    pending: Arc<PendingRequests>,
    /// Ids this call has issued and not yet seen answered.
    issued: Mutex<HashSet<RequestId>>,
    timeout: Duration,
}

impl ClientBridge {
    /// Create a bridge draining into `events`.
    #[must_use]
    pub fn new(
        events: mpsc::UnboundedSender<StreamEvent>,
        pending: Arc<PendingRequests>,
        timeout: Duration,
    ) -> Self {
        Self {
            events: Mutex::new(Some(events)),
            pending,
            issued: Mutex::new(HashSet::new()),
            timeout,
        }
    }

    fn sender(&self) -> Option<mpsc::UnboundedSender<StreamEvent>> {
        self.events.lock().expect("bridge events lock").clone()
    }

    /// Enqueue a notification event. Returns immediately; a torn-down or
    /// disconnected consumer just means nobody is listening any more.
    pub fn notify(&self, method: &str, params: Option<serde_json::Value>) {
        let notification = match params {
            Some(p) => Notification::with_params(method.to_string(), p),
            None => Notification::new(method.to_string()),
        };
        let payload = serde_json::to_value(notification).unwrap_or_default();
        if let Some(events) = self.sender() {
            let _ = events.send(StreamEvent::Message(payload));
        }
    }

    /// Enqueue a server-initiated request and suspend until the correlated
    /// answer arrives or the timeout elapses.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        let id = RequestId::generate();
        let request = match params {
            Some(p) => Request::with_params(method.to_string(), id.clone(), p),
            None => Request::new(method.to_string(), id.clone()),
        };
        let payload = serde_json::to_value(request)
            .map_err(|e| McpError::internal_with("server request did not serialize", e))?;

        let Some(events) = self.sender() else {
            // Torn down already; nothing will ever answer.
            return Err(McpError::Cancelled);
        };

        let (tx, rx) = oneshot::channel();
        self.pending.register(id.clone(), tx);
        self.issued.lock().expect("issued lock").insert(id.clone());

        if events.send(StreamEvent::ServerRequest(payload)).is_err() {
            // Consumer already gone; nothing will ever answer.
            self.forget(&id);
            return Err(McpError::Cancelled);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(Ok(value))) => {
                self.issued.lock().expect("issued lock").remove(&id);
                Ok(value)
            }
            Ok(Ok(Err(error))) => {
                self.issued.lock().expect("issued lock").remove(&id);
                tracing::warn!(id = %id, code = error.code, "client answered with an error");
                Err(McpError::internal(format!(
                    "client answered with an error: {error}"
                )))
            }
            // Waiter discarded: the call is being torn down.
            Ok(Err(_closed)) => {
                self.issued.lock().expect("issued lock").remove(&id);
                Err(McpError::Cancelled)
            }
            Err(_elapsed) => {
                // Expiry removes the entry; a late answer must not resolve
                // into the void.
                self.forget(&id);
                Err(McpError::Timeout {
                    waited: self.timeout,
                })
            }
        }
    }

    fn forget(&self, id: &RequestId) {
        self.pending.discard(id);
        self.issued.lock().expect("issued lock").remove(id);
    }

    /// Discard every request this call still has pending and close the
    /// event channel. Idempotent; runs on every call exit path.
    pub fn teardown(&self) {
        drop(self.events.lock().expect("bridge events lock").take());
        let ids: Vec<RequestId> = self.issued.lock().expect("issued lock").drain().collect();
        for id in &ids {
            self.pending.discard(id);
        }
        if !ids.is_empty() {
            tracing::debug!(count = ids.len(), "discarded pending server requests at teardown");
        }
    }
}

impl Drop for ClientBridge {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// The consumer half of a streamed call.
///
/// Dropping the handle cancels the underlying execution and tears down the
/// bridge — a disconnected consumer must not leave a tool running or a
/// waiter parked.
pub struct StreamHandle {
    receiver: mpsc::UnboundedReceiver<StreamEvent>,
    guard: StreamGuard,
}

impl StreamHandle {
    pub(crate) fn new(
        receiver: mpsc::UnboundedReceiver<StreamEvent>,
        cancel: CancellationToken,
        bridge: Arc<ClientBridge>,
    ) -> Self {
        Self {
            receiver,
            guard: StreamGuard { cancel, bridge },
        }
    }

    /// The next event, or `None` once the call has finished and drained.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.receiver.recv().await
    }

    /// Trigger cancellation of the underlying execution without dropping
    /// the stream.
    pub fn cancel(&self) {
        self.guard.cancel.cancel();
    }
}

struct StreamGuard {
    cancel: CancellationToken,
    bridge: Arc<ClientBridge>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.bridge.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge() -> (ClientBridge, mpsc::UnboundedReceiver<StreamEvent>, Arc<PendingRequests>) {
        let pending = Arc::new(PendingRequests::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = ClientBridge::new(tx, pending.clone(), Duration::from_millis(200));
        (bridge, rx, pending)
    }

    #[test]
    fn sse_frame_shape() {
        let event = StreamEvent::ServerRequest(serde_json::json!({"id": "x"}));
        let frame = event.sse_frame();
        assert!(frame.starts_with("event: server_request\n"));
        assert!(frame.contains("\ndata: {\"id\":\"x\"}\n\n"));
    }

    #[tokio::test]
    async fn notify_enqueues_without_waiting() {
        let (bridge, mut rx, pending) = bridge();
        bridge.notify("notifications/progress", Some(serde_json::json!({"progress": 1})));
        let event = rx.recv().await.expect("event enqueued");
        assert_eq!(event.event_name(), "message");
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn request_round_trip() {
        let (bridge, mut rx, pending) = bridge();
        let bridge = Arc::new(bridge);

        let caller = bridge.clone();
        let call = tokio::spawn(async move { caller.request("roots/list", None).await });

        let event = rx.recv().await.expect("request enqueued");
        assert_eq!(event.event_name(), "server_request");
        let id: RequestId =
            serde_json::from_value(event.payload()["id"].clone()).expect("request id");

        assert!(pending.resolve(&id, Ok(serde_json::json!({"roots": []}))));
        let value = call.await.unwrap().expect("request resolves");
        assert_eq!(value, serde_json::json!({"roots": []}));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn unknown_id_does_not_disturb_the_real_waiter() {
        let (bridge, mut rx, pending) = bridge();
        let bridge = Arc::new(bridge);

        let caller = bridge.clone();
        let call = tokio::spawn(async move { caller.request("roots/list", None).await });

        let event = rx.recv().await.expect("request enqueued");
        let id: RequestId =
            serde_json::from_value(event.payload()["id"].clone()).expect("request id");

        // A respond message with an id nobody issued.
        let bogus = RequestId::String("not-a-pending-id".into());
        assert!(!pending.resolve(&bogus, Ok(serde_json::json!(42))));

        // The real waiter still resolves.
        assert!(pending.resolve(&id, Ok(serde_json::json!("real"))));
        assert_eq!(call.await.unwrap().unwrap(), serde_json::json!("real"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_removes_the_pending_entry() {
        let (bridge, mut rx, pending) = bridge();
        let bridge = Arc::new(bridge);

        let caller = bridge.clone();
        let call = tokio::spawn(async move { caller.request("roots/list", None).await });

        let event = rx.recv().await.expect("request enqueued");
        let id: RequestId =
            serde_json::from_value(event.payload()["id"].clone()).expect("request id");
        assert_eq!(pending.len(), 1);

        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, McpError::Timeout { .. }));
        assert!(pending.is_empty());

        // The eventual answer resolves into nothing, silently.
        assert!(!pending.resolve(&id, Ok(serde_json::json!("late"))));
    }

    #[tokio::test]
    async fn teardown_discards_waiters_and_wakes_callers() {
        let (bridge, mut rx, pending) = bridge();
        let bridge = Arc::new(bridge);

        let caller = bridge.clone();
        let call = tokio::spawn(async move { caller.request("roots/list", None).await });
        let _ = rx.recv().await.expect("request enqueued");
        assert_eq!(pending.len(), 1);

        bridge.teardown();
        assert!(pending.is_empty());
        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, McpError::Cancelled));
    }

    #[tokio::test]
    async fn client_error_answer_surfaces_to_the_caller() {
        let (bridge, mut rx, pending) = bridge();
        let bridge = Arc::new(bridge);

        let caller = bridge.clone();
        let call = tokio::spawn(async move { caller.request("sampling/createMessage", None).await });

        let event = rx.recv().await.expect("request enqueued");
        let id: RequestId =
            serde_json::from_value(event.payload()["id"].clone()).expect("request id");
        assert!(pending.resolve(&id, Err(JsonRpcError::new(-1, "user rejected"))));

        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, McpError::Internal { .. }));
    }
}
