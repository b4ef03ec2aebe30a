//! Per-connection protocol handler: validates inbound events, mutates the
//! session registry, mirrors changes into the durable store, and decides
//! fan-out.
//!
//! Every event follows the same ordering contract: validate, mutate the
//! registry, dispatch the store write WITHOUT awaiting it, broadcast. The
//! live relay never waits on persistence, and a store failure is logged
//! inside the spawned task without touching in-memory state.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use waypoint_store::{LocationRecord, PresenceRecord, PresenceStore};

use crate::broadcast::Broadcaster;
use crate::protocol::{ClientEvent, Coordinate, ServerEvent};
use crate::registry::{ConnId, Session, SessionRegistry};

/// Shared collaborators for every connection's event processing.
#[derive(Clone)]
pub struct Relay {
    pub registry: SessionRegistry,
    pub broadcaster: Broadcaster,
    store: Option<Arc<dyn PresenceStore>>,
}

impl Relay {
    pub fn new(
        registry: SessionRegistry,
        broadcaster: Broadcaster,
        store: Option<Arc<dyn PresenceStore>>,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            store,
        }
    }

    /// Route one parsed inbound event.
    pub async fn handle_event(&self, conn_id: &ConnId, event: ClientEvent) {
        match event {
            ClientEvent::Register { user_id, name } => {
                self.handle_register(conn_id, user_id, name).await;
            }
            ClientEvent::LocationUpdate {
                latitude,
                longitude,
                accuracy,
            } => {
                self.handle_location_update(conn_id, latitude, longitude, accuracy)
                    .await;
            }
        }
    }

    /// Register an identity on a connection. Re-registration on a live
    /// connection overwrites the previous session.
    pub async fn handle_register(
        &self,
        conn_id: &ConnId,
        user_id: Option<String>,
        name: Option<String>,
    ) {
        let (user_id, name) = match (user_id, name) {
            (Some(user_id), Some(name)) if !user_id.is_empty() && !name.is_empty() => {
                (user_id, name)
            }
            (user_id, name) => {
                warn!(conn = %conn_id, ?user_id, ?name, "Dropping register with missing userId or name");
                return;
            }
        };

        let session = Session::new(conn_id.clone(), user_id.clone(), name.clone());
        let last_seen = session.last_seen;
        self.registry.insert(session).await;
        info!(conn = %conn_id, user = %user_id, "User registered");

        if let Some(store) = &self.store {
            let store = Arc::clone(store);
            let record = PresenceRecord {
                id: user_id.clone(),
                name: name.clone(),
                is_online: true,
                last_seen: last_seen.to_rfc3339(),
                socket_id: conn_id.as_str().to_string(),
            };
            tokio::spawn(async move {
                if let Err(e) = store.upsert_presence(&record).await {
                    warn!(user = %record.id, error = %e, "Presence upsert failed");
                }
            });
        }

        self.broadcaster
            .to_all_except(conn_id, &ServerEvent::PeerJoined { user_id, name })
            .await;
        let users = self.registry.snapshot().await;
        self.broadcaster
            .to_all(&ServerEvent::ActiveUsers { users })
            .await;
    }

    /// Apply a position report from a registered connection.
    pub async fn handle_location_update(
        &self,
        conn_id: &ConnId,
        latitude: Option<Coordinate>,
        longitude: Option<Coordinate>,
        accuracy: Option<Coordinate>,
    ) {
        let Some(session) = self.registry.get(conn_id).await else {
            warn!(conn = %conn_id, "Location update from unregistered connection");
            return;
        };

        let (latitude, longitude) = match (latitude, longitude) {
            (Some(latitude), Some(longitude))
                if !latitude.is_missing() && !longitude.is_missing() =>
            {
                (latitude, longitude)
            }
            (latitude, longitude) => {
                warn!(conn = %conn_id, ?latitude, ?longitude, "Dropping location update with missing coordinates");
                return;
            }
        };

        let now = Utc::now();
        self.registry
            .update_position(conn_id, latitude.as_f64(), longitude.as_f64(), now)
            .await;
        debug!(conn = %conn_id, user = %session.user_id, ?latitude, ?longitude, "Location updated");

        if let Some(store) = &self.store {
            match (latitude.as_f64(), longitude.as_f64()) {
                (Some(lat), Some(lon)) => {
                    let store = Arc::clone(store);
                    let record = LocationRecord {
                        user_id: session.user_id.clone(),
                        latitude: lat,
                        longitude: lon,
                        timestamp: now.to_rfc3339(),
                        accuracy: accuracy
                            .as_ref()
                            .filter(|a| !a.is_missing())
                            .and_then(Coordinate::as_f64),
                    };
                    tokio::spawn(async move {
                        if let Err(e) = store.insert_location(&record).await {
                            warn!(user = %record.user_id, error = %e, "Location insert failed");
                        }
                    });
                }
                _ => {
                    warn!(conn = %conn_id, "Skipping location insert for non-numeric coordinates");
                }
            }
        }

        self.broadcaster
            .to_all(&ServerEvent::LocationUpdated {
                user_id: session.user_id,
                name: session.display_name,
                latitude,
                longitude,
                timestamp: now.to_rfc3339(),
            })
            .await;
    }

    /// Transport-level close. No-op when the connection never registered.
    pub async fn handle_disconnect(&self, conn_id: &ConnId) {
        // Drop the broadcast subscription first so the departing peer is
        // neither listed in the snapshot nor part of the audience.
        self.broadcaster.leave(conn_id).await;

        let Some(session) = self.registry.remove(conn_id).await else {
            debug!(conn = %conn_id, "Connection closed before registering");
            return;
        };

        if let Some(store) = &self.store {
            let store = Arc::clone(store);
            let user_id = session.user_id.clone();
            let now = Utc::now();
            tokio::spawn(async move {
                if let Err(e) = store.mark_offline(&user_id, now).await {
                    warn!(user = %user_id, error = %e, "Offline update failed");
                }
            });
        }

        self.broadcaster
            .to_all_except(
                conn_id,
                &ServerEvent::PeerLeft {
                    user_id: session.user_id.clone(),
                    name: session.display_name.clone(),
                },
            )
            .await;
        let users = self.registry.snapshot().await;
        self.broadcaster
            .to_all(&ServerEvent::ActiveUsers { users })
            .await;
        info!(conn = %conn_id, user = %session.user_id, "User disconnected");
    }
}
