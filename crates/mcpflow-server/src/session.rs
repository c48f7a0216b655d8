//! Session records and the store that owns them.
//!
//! A session is created only by a successful `initialize` and keyed by a
//! server-generated uuid v4 — ids come from the OS CSPRNG, so an attacker
//! cannot guess an active session. Everything else keyed by session id
//! (rate buckets, subscriptions, SSE channels) is cleaned up through the
//! engine's eviction cascade, not here.

use mcpflow_core::capability::{ClientCapabilities, ClientInfo};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// One client's session record.
#[derive(Debug, Clone)]
pub struct Session {
    /// Opaque, unguessable id.
    pub id: String,
    /// Who the client says it is.
    pub client_info: ClientInfo,
    /// The protocol version negotiated at initialize.
    pub protocol_version: String,
    /// Capabilities the client declared.
    pub client_capabilities: ClientCapabilities,
    /// When the session was created.
    pub created_at: Instant,
    /// When the session last carried a request.
    pub last_seen_at: Instant,
}

impl Session {
    fn new(
        client_info: ClientInfo,
        protocol_version: String,
        client_capabilities: ClientCapabilities,
    ) -> Self {
        let now = Instant::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            client_info,
            protocol_version,
            client_capabilities,
            created_at: now,
            last_seen_at: now,
        }
    }

    /// Whether the session has been idle longer than `max_idle`.
    #[must_use]
    pub fn is_idle(&self, max_idle: Duration) -> bool {
        self.last_seen_at.elapsed() >= max_idle
    }
}

/// Mutex-guarded session map.
///
/// The store knows nothing about protocol semantics; the dispatcher decides
/// when a session is required and what its absence means.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    max_sessions: usize,
}

impl SessionStore {
    /// Create a store bounded at `max_sessions` live sessions.
    #[must_use]
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_sessions,
        }
    }

    /// Create a session. Returns `None` when the store is at capacity.
    pub fn create(
        &self,
        client_info: ClientInfo,
        protocol_version: String,
        client_capabilities: ClientCapabilities,
    ) -> Option<String> {
        let mut sessions = self.sessions.lock().expect("session store lock");
        if sessions.len() >= self.max_sessions {
            return None;
        }
        let session = Session::new(client_info, protocol_version, client_capabilities);
        let id = session.id.clone();
        sessions.insert(id.clone(), session);
        Some(id)
    }

    /// Look up a session by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.lock().expect("session store lock").get(id).cloned()
    }

    /// Whether a session exists.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.sessions.lock().expect("session store lock").contains_key(id)
    }

    /// Refresh a session's last-seen time.
    pub fn touch(&self, id: &str) {
        if let Some(session) = self.sessions.lock().expect("session store lock").get_mut(id) {
            session.last_seen_at = Instant::now();
        }
    }

    /// Remove a session. Returns whether it existed.
    pub fn evict(&self, id: &str) -> bool {
        self.sessions.lock().expect("session store lock").remove(id).is_some()
    }

    /// Remove every session idle past `max_idle`, returning the evicted
    /// ids so the caller can cascade.
    ///
    /// A full scan; the population is bounded by `max_sessions`.
    pub fn sweep(&self, max_idle: Duration) -> Vec<String> {
        let mut sessions = self.sessions.lock().expect("session store lock");
        let idle: Vec<String> = sessions
            .values()
            .filter(|s| s.is_idle(max_idle))
            .map(|s| s.id.clone())
            .collect();
        for id in &idle {
            sessions.remove(id);
        }
        idle
    }

    /// Current live session count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.lock().expect("session store lock").len()
    }

    /// Whether there are no live sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(16)
    }

    fn create(store: &SessionStore) -> String {
        store
            .create(ClientInfo::default(), "2025-06-18".into(), ClientCapabilities::default())
            .expect("capacity")
    }

    #[test]
    fn create_get_evict() {
        let store = store();
        let id = create(&store);
        assert!(store.get(&id).is_some());
        assert!(store.evict(&id));
        assert!(store.get(&id).is_none());
        assert!(!store.evict(&id));
    }

    #[test]
    fn ids_are_distinct() {
        let store = store();
        assert_ne!(create(&store), create(&store));
    }

    #[test]
    fn capacity_is_enforced() {
        let store = SessionStore::new(2);
        create(&store);
        create(&store);
        assert!(store
            .create(ClientInfo::default(), "v".into(), ClientCapabilities::default())
            .is_none());
    }

    #[test]
    fn sweep_evicts_only_idle_sessions() {
        let store = store();
        let id = create(&store);
        assert!(store.sweep(Duration::from_secs(60)).is_empty());
        // Zero idle threshold makes everything idle.
        let evicted = store.sweep(Duration::ZERO);
        assert_eq!(evicted, vec![id.clone()]);
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn touch_refreshes_last_seen() {
        let store = store();
        let id = create(&store);
        let before = store.get(&id).unwrap().last_seen_at;
        std::thread::sleep(Duration::from_millis(5));
        store.touch(&id);
        assert!(store.get(&id).unwrap().last_seen_at > before);
    }
}
