//! Per-invocation context handed to tool, resource, and prompt handlers.
//!
//! The context carries the originating request id, the session's declared
//! capabilities, a cancellation token the runtime can trip, and — for
//! streamed calls only — the client bridge that lets the handler ask the
//! client something and suspend for the answer.

use crate::bridge::ClientBridge;
use mcpflow_core::capability::ClientCapabilities;
use mcpflow_core::error::McpError;
use mcpflow_core::protocol::RequestId;
use mcpflow_core::types::{
    CreateMessageRequest, CreateMessageResult, ElicitRequest, ElicitResult, ListRootsResult, Root,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Cooperative cancellation flag.
///
/// The runtime trips it; the execution observes it at its suspension
/// points. Registry cleanup does not depend on the execution noticing
/// promptly — the dispatcher's finalization path runs regardless.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

#[derive(Debug, Default)]
struct TokenInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    /// Create an untripped token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Request cancellation and wake every waiter.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Resolve when cancellation is requested.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            // Register before re-checking so a cancel between the check and
            // the await cannot be missed.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Context for one handler invocation.
pub struct Context {
    request_id: RequestId,
    session_id: Option<String>,
    client_capabilities: ClientCapabilities,
    cancel: CancellationToken,
    bridge: Option<Arc<ClientBridge>>,
}

impl Context {
    /// Build a context. The bridge is present only for streamed calls.
    #[must_use]
    pub fn new(
        request_id: RequestId,
        session_id: Option<String>,
        client_capabilities: ClientCapabilities,
        cancel: CancellationToken,
        bridge: Option<Arc<ClientBridge>>,
    ) -> Self {
        Self {
            request_id,
            session_id,
            client_capabilities,
            cancel,
            bridge,
        }
    }

    /// The request id of the originating call.
    #[must_use]
    pub const fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// The session this call belongs to, when one was supplied.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// What the client declared it can answer.
    #[must_use]
    pub const fn client_capabilities(&self) -> &ClientCapabilities {
        &self.client_capabilities
    }

    /// Whether this call has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolve when this call is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Whether a client channel is available (streamed calls only).
    #[must_use]
    pub fn has_client_channel(&self) -> bool {
        self.bridge.is_some()
    }

    fn bridge(&self) -> Result<&Arc<ClientBridge>, McpError> {
        self.bridge.as_ref().ok_or_else(|| {
            McpError::invalid_request("no client channel: this is not a streamed call")
        })
    }

    /// Send a notification toward the client.
    ///
    /// Outside a streamed call there is nowhere to deliver it; the
    /// notification is dropped, matching notification semantics.
    pub fn notify(&self, method: &str, params: Option<serde_json::Value>) {
        match &self.bridge {
            Some(bridge) => bridge.notify(method, params),
            None => tracing::debug!(method = %method, "dropping notification: no client channel"),
        }
    }

    /// Report progress on this call.
    pub fn progress(&self, current: u64, total: Option<u64>, message: Option<&str>) {
        self.notify(
            "notifications/progress",
            Some(serde_json::json!({
                "progress": current,
                "total": total,
                "message": message,
            })),
        );
    }

    /// Issue a raw request to the client and suspend until it answers or
    /// the bridge timeout expires.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        self.bridge()?.request(method, params).await
    }

    /// Ask the client to sample its model.
    pub async fn sample(
        &self,
        request: CreateMessageRequest,
    ) -> Result<CreateMessageResult, McpError> {
        let params = serde_json::to_value(request)
            .map_err(|e| McpError::internal_with("sampling request did not serialize", e))?;
        let value = self.request("sampling/createMessage", Some(params)).await?;
        serde_json::from_value(value)
            .map_err(|e| McpError::internal_with("client returned a malformed sampling result", e))
    }

    /// Ask the client to elicit input from its user.
    pub async fn elicit(&self, request: ElicitRequest) -> Result<ElicitResult, McpError> {
        let params = serde_json::to_value(request)
            .map_err(|e| McpError::internal_with("elicit request did not serialize", e))?;
        let value = self.request("elicitation/create", Some(params)).await?;
        serde_json::from_value(value)
            .map_err(|e| McpError::internal_with("client returned a malformed elicit result", e))
    }

    /// Ask the client which roots it grants access to.
    pub async fn list_roots(&self) -> Result<Vec<Root>, McpError> {
        let value = self.request("roots/list", None).await?;
        let result: ListRootsResult = serde_json::from_value(value)
            .map_err(|e| McpError::internal_with("client returned a malformed roots result", e))?;
        Ok(result.roots)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("request_id", &self.request_id)
            .field("session_id", &self.session_id)
            .field("has_client_channel", &self.has_client_channel())
            .field("is_cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_trips_once() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_cancel() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        tokio::task::yield_now().await;
        token.cancel();
        handle.await.expect("waiter completes");
    }

    #[tokio::test]
    async fn cancelled_future_resolves_immediately_when_already_tripped() {
        let token = CancellationToken::new();
        token.cancel();
        token.cancelled().await;
    }

    #[tokio::test]
    async fn requests_without_a_bridge_fail_fast() {
        let ctx = Context::new(
            RequestId::Number(1),
            None,
            ClientCapabilities::default(),
            CancellationToken::new(),
            None,
        );
        let err = ctx.request("roots/list", None).await.unwrap_err();
        assert!(matches!(err, McpError::InvalidRequest { .. }));
        // Notifications are dropped, not errors.
        ctx.notify("notifications/progress", None);
    }
}
