//! Session registry: the authoritative in-memory map of who is connected
//! right now, keyed by connection handle.
//!
//! The same user identity may appear under several connections — each
//! connection owns its own entry and no dedup is performed.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::protocol::SessionSnapshot;

/// Opaque handle for one live WebSocket connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnId(String);

impl ConnId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Live state of one registered connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub conn_id: ConnId,
    pub user_id: String,
    pub display_name: String,
    /// Last known position, absent until the first location update.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub last_seen: DateTime<Utc>,
}

impl Session {
    pub fn new(conn_id: ConnId, user_id: String, display_name: String) -> Self {
        Self {
            conn_id,
            user_id,
            display_name,
            latitude: None,
            longitude: None,
            last_seen: Utc::now(),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            user_id: self.user_id.clone(),
            name: self.display_name.clone(),
            conn_id: self.conn_id.as_str().to_string(),
            latitude: self.latitude,
            longitude: self.longitude,
            last_seen: self.last_seen.to_rfc3339(),
        }
    }
}

/// Shared registry handle. Entries live exactly as long as the underlying
/// connection; there is no eviction or TTL.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<ConnId, Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert or overwrite the session for a connection. Re-registration
    /// on a live connection simply replaces the entry.
    pub async fn insert(&self, session: Session) {
        self.sessions
            .write()
            .await
            .insert(session.conn_id.clone(), session);
    }

    pub async fn get(&self, conn_id: &ConnId) -> Option<Session> {
        self.sessions.read().await.get(conn_id).cloned()
    }

    /// Update position and last-seen in place, under a single lock
    /// acquisition. Returns the refreshed session, or `None` when the
    /// connection has no session.
    pub async fn update_position(
        &self,
        conn_id: &ConnId,
        latitude: Option<f64>,
        longitude: Option<f64>,
        seen: DateTime<Utc>,
    ) -> Option<Session> {
        let mut map = self.sessions.write().await;
        let session = map.get_mut(conn_id)?;
        session.latitude = latitude;
        session.longitude = longitude;
        session.last_seen = seen;
        Some(session.clone())
    }

    pub async fn remove(&self, conn_id: &ConnId) -> Option<Session> {
        self.sessions.write().await.remove(conn_id)
    }

    /// Snapshot of every current session, for the `active_users` event.
    pub async fn snapshot(&self) -> Vec<SessionSnapshot> {
        self.sessions
            .read()
            .await
            .values()
            .map(Session::snapshot)
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(conn_id: &ConnId, user_id: &str, name: &str) -> Session {
        Session::new(conn_id.clone(), user_id.into(), name.into())
    }

    #[tokio::test]
    async fn insert_get_remove() {
        let registry = SessionRegistry::new();
        let conn = ConnId::new();

        registry.insert(session(&conn, "u1", "Alice")).await;
        let found = registry.get(&conn).await.unwrap();
        assert_eq!(found.user_id, "u1");
        assert_eq!(found.display_name, "Alice");
        assert!(found.latitude.is_none());

        let removed = registry.remove(&conn).await.unwrap();
        assert_eq!(removed.user_id, "u1");
        assert!(registry.get(&conn).await.is_none());
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn reregistration_overwrites() {
        let registry = SessionRegistry::new();
        let conn = ConnId::new();

        registry.insert(session(&conn, "u1", "Alice")).await;
        registry.insert(session(&conn, "u1", "Alice Again")).await;

        assert_eq!(registry.count().await, 1);
        assert_eq!(registry.get(&conn).await.unwrap().display_name, "Alice Again");
    }

    #[tokio::test]
    async fn duplicate_identities_are_kept() {
        let registry = SessionRegistry::new();
        let phone = ConnId::new();
        let laptop = ConnId::new();

        registry.insert(session(&phone, "u1", "Alice")).await;
        registry.insert(session(&laptop, "u1", "Alice")).await;

        // No dedup across connections claiming the same identity.
        assert_eq!(registry.count().await, 2);
        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.iter().filter(|s| s.user_id == "u1").count(), 2);
    }

    #[tokio::test]
    async fn update_position_reflects_latest() {
        let registry = SessionRegistry::new();
        let conn = ConnId::new();
        registry.insert(session(&conn, "u1", "Alice")).await;

        let first = Utc::now();
        registry
            .update_position(&conn, Some(41.0), Some(28.0), first)
            .await
            .unwrap();
        let second = Utc::now();
        let updated = registry
            .update_position(&conn, Some(41.5), Some(28.5), second)
            .await
            .unwrap();

        assert_eq!(updated.latitude, Some(41.5));
        assert_eq!(updated.longitude, Some(28.5));
        assert_eq!(updated.last_seen, second);

        let stored = registry.get(&conn).await.unwrap();
        assert_eq!(stored.latitude, Some(41.5));
    }

    #[tokio::test]
    async fn update_position_without_session() {
        let registry = SessionRegistry::new();
        let result = registry
            .update_position(&ConnId::new(), Some(1.0), Some(2.0), Utc::now())
            .await;
        assert!(result.is_none());
    }
}
