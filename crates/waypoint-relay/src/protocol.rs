//! Wire protocol for the waypoint relay: JSON text frames, internally
//! tagged with `type`. One variant per event kind; validation of required
//! fields happens in the handler before any state mutation.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Coordinates
// ---------------------------------------------------------------------------

/// A latitude/longitude/accuracy value exactly as received on the wire.
///
/// Clients send coordinates either as JSON numbers or as strings
/// ("41.0082"). Broadcasts echo the value back in its original form; the
/// registry and the durable store work on the coerced float.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Coordinate {
    Number(f64),
    Text(String),
}

impl Coordinate {
    /// Whether this value counts as missing under the wire contract:
    /// numeric zero and the empty string are rejected as absent, while the
    /// string "0" is accepted.
    pub fn is_missing(&self) -> bool {
        match self {
            Coordinate::Number(n) => *n == 0.0,
            Coordinate::Text(s) => s.is_empty(),
        }
    }

    /// Coerce to a float for storage. `None` when a string form does not
    /// parse as a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Coordinate::Number(n) => Some(*n),
            Coordinate::Text(s) => s.trim().parse().ok(),
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound events
// ---------------------------------------------------------------------------

/// Events clients send to the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "register")]
    Register {
        #[serde(rename = "userId", default)]
        user_id: Option<String>,
        #[serde(default)]
        name: Option<String>,
    },

    #[serde(rename = "location_update")]
    LocationUpdate {
        #[serde(default)]
        latitude: Option<Coordinate>,
        #[serde(default)]
        longitude: Option<Coordinate>,
        #[serde(default)]
        accuracy: Option<Coordinate>,
    },
}

// ---------------------------------------------------------------------------
// Outbound events
// ---------------------------------------------------------------------------

/// One registered connection as it appears in the `active_users` list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub user_id: String,
    pub name: String,
    pub conn_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    pub last_seen: String,
}

/// Events the relay fans out to connected clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "peer_joined")]
    PeerJoined {
        #[serde(rename = "userId")]
        user_id: String,
        name: String,
    },

    #[serde(rename = "peer_left")]
    PeerLeft {
        #[serde(rename = "userId")]
        user_id: String,
        name: String,
    },

    #[serde(rename = "active_users")]
    ActiveUsers { users: Vec<SessionSnapshot> },

    /// Carries the coordinates exactly as the sender supplied them, plus a
    /// fresh timestamp (not the session's stored last-seen).
    #[serde(rename = "location_updated")]
    LocationUpdated {
        #[serde(rename = "userId")]
        user_id: String,
        name: String,
        latitude: Coordinate,
        longitude: Coordinate,
        timestamp: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinate_missing_matrix() {
        assert!(Coordinate::Number(0.0).is_missing());
        assert!(Coordinate::Number(-0.0).is_missing());
        assert!(Coordinate::Text(String::new()).is_missing());

        // The string "0" is truthy on the wire even though it coerces to 0.
        assert!(!Coordinate::Text("0".into()).is_missing());
        assert!(!Coordinate::Number(41.0082).is_missing());
        assert!(!Coordinate::Text("41.0082".into()).is_missing());
    }

    #[test]
    fn coordinate_coercion() {
        assert_eq!(Coordinate::Number(41.0082).as_f64(), Some(41.0082));
        assert_eq!(Coordinate::Text("28.9784".into()).as_f64(), Some(28.9784));
        assert_eq!(Coordinate::Text("0".into()).as_f64(), Some(0.0));
        assert_eq!(Coordinate::Text("not a number".into()).as_f64(), None);
    }

    #[test]
    fn register_parses_with_and_without_fields() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"register","userId":"u1","name":"Alice"}"#).unwrap();
        match event {
            ClientEvent::Register { user_id, name } => {
                assert_eq!(user_id.as_deref(), Some("u1"));
                assert_eq!(name.as_deref(), Some("Alice"));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // Missing fields parse as None; the handler decides to drop them.
        let event: ClientEvent = serde_json::from_str(r#"{"type":"register"}"#).unwrap();
        match event {
            ClientEvent::Register { user_id, name } => {
                assert!(user_id.is_none());
                assert!(name.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn location_update_keeps_original_form() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"type":"location_update","latitude":"41.0082","longitude":28.9784}"#,
        )
        .unwrap();
        match event {
            ClientEvent::LocationUpdate {
                latitude,
                longitude,
                accuracy,
            } => {
                assert_eq!(latitude, Some(Coordinate::Text("41.0082".into())));
                assert_eq!(longitude, Some(Coordinate::Number(28.9784)));
                assert!(accuracy.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"type":"shout","text":"hi"}"#).is_err());
        assert!(serde_json::from_str::<ClientEvent>("not json").is_err());
    }

    #[test]
    fn server_event_wire_shapes() {
        let json = serde_json::to_value(ServerEvent::PeerJoined {
            user_id: "u1".into(),
            name: "Alice".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "peer_joined");
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["name"], "Alice");

        let json = serde_json::to_value(ServerEvent::LocationUpdated {
            user_id: "u2".into(),
            name: "Bob".into(),
            latitude: Coordinate::Text("41.0082".into()),
            longitude: Coordinate::Number(28.9784),
            timestamp: "2025-06-01T12:00:00+00:00".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "location_updated");
        // The string form survives serialization untouched.
        assert_eq!(json["latitude"], "41.0082");
        assert_eq!(json["longitude"], 28.9784);
    }

    #[test]
    fn active_users_snapshot_shape() {
        let json = serde_json::to_value(ServerEvent::ActiveUsers {
            users: vec![SessionSnapshot {
                user_id: "u1".into(),
                name: "Alice".into(),
                conn_id: "c1".into(),
                latitude: None,
                longitude: None,
                last_seen: "2025-06-01T12:00:00+00:00".into(),
            }],
        })
        .unwrap();
        assert_eq!(json["type"], "active_users");
        let user = &json["users"][0];
        assert_eq!(user["userId"], "u1");
        assert_eq!(user["name"], "Alice");
        assert_eq!(user["connId"], "c1");
        assert_eq!(user["lastSeen"], "2025-06-01T12:00:00+00:00");
        // Position is omitted until the first location update.
        assert!(user.get("latitude").is_none());
    }
}
