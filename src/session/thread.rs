//! MCP session storage (spec §3.6): client-scoped state keyed by the
//! opaque `Mcp-Session-Id` header.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Sessions outlive their creating request for 24h (spec §3.6).
const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    id: String,
    created_at: DateTime<Utc>,
    negotiated_protocol_version: RwLock<String>,
    client_info: RwLock<Option<Value>>,
    /// Set when the session originated at `/{namespace}/mcp` rather than
    /// the global `/mcp` endpoint.
    bound_namespace: Option<String>,
}

impl Session {
    fn new(id: String, protocol_version: String, client_info: Option<Value>, bound_namespace: Option<String>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id,
                created_at: Utc::now(),
                negotiated_protocol_version: RwLock::new(protocol_version),
                client_info: RwLock::new(client_info),
                bound_namespace,
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    #[must_use]
    pub fn negotiated_protocol_version(&self) -> String {
        self.inner.negotiated_protocol_version.read().unwrap().clone()
    }

    #[must_use]
    pub fn client_info(&self) -> Option<Value> {
        self.inner.client_info.read().unwrap().clone()
    }

    #[must_use]
    pub fn bound_namespace(&self) -> Option<&str> {
        self.inner.bound_namespace.as_deref()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    #[must_use]
    fn is_expired(&self) -> bool {
        let age = Utc::now() - self.inner.created_at;
        age.to_std().map(|d| d > SESSION_TTL).unwrap_or(false)
    }
}

/// Thread-safe store for MCP sessions. A single map with lazy eviction
/// (spec §5): any mutation sweeps expired entries first, so no background
/// task is needed.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Session>>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Creates a new session, sweeping expired sessions first.
    #[must_use]
    pub fn create(
        &self,
        protocol_version: String,
        client_info: Option<Value>,
        bound_namespace: Option<String>,
    ) -> Session {
        let id = Uuid::new_v4().to_string();
        let session = Session::new(id.clone(), protocol_version, client_info, bound_namespace);
        let mut guard = self.inner.write().unwrap();
        guard.retain(|_, s| !s.is_expired());
        guard.insert(id, session.clone());
        session
    }

    /// Looks up a session by id. Returns `None` for unknown or expired ids,
    /// evicting the latter opportunistically.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Session> {
        {
            let guard = self.inner.read().unwrap();
            match guard.get(id) {
                Some(session) if !session.is_expired() => return Some(session.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.inner.write().unwrap().remove(id);
        None
    }

    /// Removes a session explicitly (`DELETE /mcp`, spec §4.5.3).
    pub fn remove(&self, id: &str) -> Option<Session> {
        self.inner.write().unwrap().remove(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_fetch_roundtrips() {
        let store = SessionStore::new();
        let session = store.create("2025-03-26".to_owned(), None, None);
        let fetched = store.get(session.id()).expect("session present");
        assert_eq!(fetched.negotiated_protocol_version(), "2025-03-26");
    }

    #[test]
    fn bound_namespace_is_recorded() {
        let store = SessionStore::new();
        let session = store.create("2025-03-26".to_owned(), None, Some("weather".to_owned()));
        assert_eq!(session.bound_namespace(), Some("weather"));
    }

    #[test]
    fn remove_makes_session_unreachable() {
        let store = SessionStore::new();
        let session = store.create("2025-03-26".to_owned(), None, None);
        store.remove(session.id());
        assert!(store.get(session.id()).is_none());
    }

    #[test]
    fn unknown_id_returns_none() {
        let store = SessionStore::new();
        assert!(store.get("does-not-exist").is_none());
    }
}
