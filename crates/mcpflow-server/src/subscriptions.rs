//! Resource subscription registry: session id → set of subscribed URIs.
//!
//! Membership only, no payload. Subscribing to a URI that does not (yet)
//! resolve to a resource is fine — the resource may come to exist later.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Mutex-guarded subscription map.
pub struct SubscriptionRegistry {
    inner: Mutex<HashMap<String, HashSet<String>>>,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe a session to a URI. Idempotent.
    pub fn subscribe(&self, session_id: &str, uri: &str) {
        self.inner
            .lock()
            .expect("subscription lock")
            .entry(session_id.to_string())
            .or_default()
            .insert(uri.to_string());
    }

    /// Unsubscribe a session from a URI. Unknown pairs are a no-op.
    pub fn unsubscribe(&self, session_id: &str, uri: &str) {
        let mut map = self.inner.lock().expect("subscription lock");
        if let Some(uris) = map.get_mut(session_id) {
            uris.remove(uri);
            if uris.is_empty() {
                map.remove(session_id);
            }
        }
    }

    /// The sessions subscribed to a URI.
    #[must_use]
    pub fn subscribers(&self, uri: &str) -> Vec<String> {
        self.inner
            .lock()
            .expect("subscription lock")
            .iter()
            .filter(|(_, uris)| uris.contains(uri))
            .map(|(session, _)| session.clone())
            .collect()
    }

    /// Whether a session is subscribed to a URI.
    #[must_use]
    pub fn is_subscribed(&self, session_id: &str, uri: &str) -> bool {
        self.inner
            .lock()
            .expect("subscription lock")
            .get(session_id)
            .is_some_and(|uris| uris.contains(uri))
    }

    /// Drop every subscription a session holds. Part of the session
    /// eviction cascade.
    pub fn remove_session(&self, session_id: &str) {
        self.inner.lock().expect("subscription lock").remove(session_id);
    }
}
