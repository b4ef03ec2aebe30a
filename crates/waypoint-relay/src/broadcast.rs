//! Broadcast router: fan-out of server events to connected sockets.
//!
//! Two delivery categories: everyone, and everyone except the sender.
//! Delivery is fire-and-forget with no acknowledgment or retry — a
//! recipient whose outbound queue is full or closed misses that event.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::protocol::ServerEvent;
use crate::registry::ConnId;

/// Outbound queue depth per connection.
const OUTBOUND_CAPACITY: usize = 256;

/// Shared router handle. Each connection task registers its outbound
/// channel on accept and removes it on close.
#[derive(Clone)]
pub struct Broadcaster {
    peers: Arc<RwLock<HashMap<ConnId, mpsc::Sender<String>>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            peers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a connection. Returns the receiving half for the
    /// connection task's write loop.
    pub async fn join(&self, conn_id: ConnId) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        self.peers.write().await.insert(conn_id, tx);
        rx
    }

    pub async fn leave(&self, conn_id: &ConnId) {
        self.peers.write().await.remove(conn_id);
    }

    /// Deliver to every connected socket, including the sender.
    pub async fn to_all(&self, event: &ServerEvent) {
        self.deliver(event, None).await;
    }

    /// Deliver to every connected socket except `sender`.
    pub async fn to_all_except(&self, sender: &ConnId, event: &ServerEvent) {
        self.deliver(event, Some(sender)).await;
    }

    async fn deliver(&self, event: &ServerEvent, skip: Option<&ConnId>) {
        if let Ok(json) = serde_json::to_string(event) {
            let peers = self.peers.read().await;
            for (conn_id, tx) in peers.iter() {
                if skip == Some(conn_id) {
                    continue;
                }
                if tx.try_send(json.clone()).is_err() {
                    debug!(conn = %conn_id, "Dropped event for slow or closed peer");
                }
            }
        }
    }
}
