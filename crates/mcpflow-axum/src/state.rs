//! Shared state for the HTTP layer.

use dashmap::DashMap;
use mcpflow_server::engine::notifications;
use mcpflow_server::Engine;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Per-session broadcast channels for the GET /mcp notification stream.
pub struct SessionChannels {
    inner: DashMap<String, broadcast::Sender<String>>,
}

impl Default for SessionChannels {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionChannels {
    /// Create an empty channel map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    /// Subscribe to a session's channel, creating it on first use.
    #[must_use]
    pub fn subscribe(&self, session_id: &str) -> broadcast::Receiver<String> {
        self.inner
            .entry(session_id.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .subscribe()
    }

    /// Send a frame to one session. Returns `false` when the session has
    /// no channel.
    pub fn send_to(&self, session_id: &str, frame: String) -> bool {
        match self.inner.get(session_id) {
            Some(tx) => {
                // A send error only means nobody is connected right now.
                let _ = tx.send(frame);
                true
            }
            None => false,
        }
    }

    /// Drop a session's channel. Part of the termination cascade.
    pub fn remove(&self, session_id: &str) {
        self.inner.remove(session_id);
    }

    /// Drop channels whose sessions no longer exist in the engine.
    pub fn prune(&self, engine: &Engine) {
        self.inner.retain(|session_id, _| engine.sessions().contains(session_id));
    }

    /// Number of open channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether no channels are open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// The protocol engine.
    pub engine: Arc<Engine>,
    /// SSE notification channels.
    pub channels: Arc<SessionChannels>,
}

impl AppState {
    /// Wrap an engine.
    #[must_use]
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            channels: Arc::new(SessionChannels::new()),
        }
    }

    /// Notify every subscriber of `uri` that the resource changed.
    ///
    /// Returns how many sessions were notified.
    pub fn notify_resource_updated(&self, uri: &str) -> usize {
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": notifications::RESOURCES_UPDATED,
            "params": { "uri": uri },
        })
        .to_string();

        let mut delivered = 0;
        for session_id in self.engine.subscriptions().subscribers(uri) {
            if self.channels.send_to(&session_id, notification.clone()) {
                delivered += 1;
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpflow_server::EngineBuilder;

    #[tokio::test]
    async fn channels_deliver_to_subscribers() {
        let channels = SessionChannels::new();
        let mut rx = channels.subscribe("s1");
        assert!(channels.send_to("s1", "hello".into()));
        assert_eq!(rx.recv().await.unwrap(), "hello");
        assert!(!channels.send_to("unknown", "x".into()));
    }

    #[tokio::test]
    async fn resource_updates_target_subscribed_sessions_only() {
        let engine = Arc::new(EngineBuilder::new("s", "0").build());
        let state = AppState::new(engine.clone());

        engine.subscriptions().subscribe("watcher", "memo://a");
        let mut rx = state.channels.subscribe("watcher");
        let _other = state.channels.subscribe("bystander");

        assert_eq!(state.notify_resource_updated("memo://a"), 1);
        let frame = rx.recv().await.unwrap();
        assert!(frame.contains("notifications/resources/updated"));
        assert!(frame.contains("memo://a"));

        assert_eq!(state.notify_resource_updated("memo://unwatched"), 0);
    }

    #[tokio::test]
    async fn prune_drops_channels_for_dead_sessions() {
        let engine = Arc::new(EngineBuilder::new("s", "0").build());
        let state = AppState::new(engine.clone());
        let _rx = state.channels.subscribe("ghost");
        assert_eq!(state.channels.len(), 1);
        state.channels.prune(&engine);
        assert!(state.channels.is_empty());
    }
}
