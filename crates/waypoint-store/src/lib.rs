//! Durable store gateway for the waypoint relay.
//!
//! Mirrors live presence and location history into a Supabase project over
//! PostgREST. Every operation is best-effort: callers log failures and keep
//! serving — the store is never authoritative for live state.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the Supabase-backed store.
#[derive(Clone)]
pub struct StoreConfig {
    /// Base project URL (e.g., "https://xyzcompany.supabase.co").
    pub url: String,
    /// Supabase anon key (publishable).
    pub api_key: String,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
        }
    }
}

impl StoreConfig {
    /// Read the endpoint and credential from `SUPABASE_URL` /
    /// `SUPABASE_ANON_KEY`. Returns `None` when either is unset or empty,
    /// in which case the relay runs without persistence.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("SUPABASE_URL").ok().filter(|v| !v.is_empty())?;
        let api_key = std::env::var("SUPABASE_ANON_KEY")
            .ok()
            .filter(|v| !v.is_empty())?;
        Some(Self {
            url,
            api_key,
            ..Self::default()
        })
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.url.trim_end_matches('/'), table)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store rejected request ({status}): {body}")]
    Status { status: u16, body: String },
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Durable presence row, one per user identity. Upserted when a user comes
/// online, flipped offline on disconnect, never deleted.
#[derive(Debug, Clone, Serialize)]
pub struct PresenceRecord {
    pub id: String,
    pub name: String,
    pub is_online: bool,
    pub last_seen: String,
    pub socket_id: String,
}

/// Append-only location history row. One row per reported position.
#[derive(Debug, Clone, Serialize)]
pub struct LocationRecord {
    pub user_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: String,
    pub accuracy: Option<f64>,
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Operations the protocol handler needs from durable storage.
///
/// Callers treat every failure as non-fatal: a failed write is logged and
/// the live relay carries on.
#[async_trait::async_trait]
pub trait PresenceStore: Send + Sync {
    /// Create or refresh the presence row for a user coming online.
    async fn upsert_presence(&self, record: &PresenceRecord) -> Result<(), StoreError>;

    /// Flip a user's presence row to offline.
    async fn mark_offline(&self, user_id: &str, last_seen: DateTime<Utc>)
        -> Result<(), StoreError>;

    /// Append one location history row.
    async fn insert_location(&self, record: &LocationRecord) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Supabase implementation
// ---------------------------------------------------------------------------

/// PostgREST-backed implementation of [`PresenceStore`].
pub struct SupabaseStore {
    config: StoreConfig,
    http: reqwest::Client,
}

impl SupabaseStore {
    pub fn new(config: StoreConfig) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("failed to build HTTP client");
        Self { config, http }
    }

    fn auth_headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "apikey",
            self.config.api_key.parse().expect("invalid API key header"),
        );
        headers.insert(
            "Authorization",
            format!("Bearer {}", self.config.api_key)
                .parse()
                .expect("invalid Authorization header"),
        );
        headers
    }

    /// Probe the store once at startup. Purely diagnostic — the relay
    /// serves regardless of the outcome.
    pub async fn check_connectivity(&self) -> Result<(), StoreError> {
        let resp = self
            .http
            .get(self.config.rest_url("users"))
            .headers(self.auth_headers())
            .query(&[("select", "id"), ("limit", "1")])
            .send()
            .await?;
        Self::ensure_success(resp).await
    }

    async fn ensure_success(resp: reqwest::Response) -> Result<(), StoreError> {
        if resp.status().is_success() {
            return Ok(());
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(StoreError::Status { status, body })
    }
}

#[async_trait::async_trait]
impl PresenceStore for SupabaseStore {
    async fn upsert_presence(&self, record: &PresenceRecord) -> Result<(), StoreError> {
        let resp = self
            .http
            .post(self.config.rest_url("users"))
            .headers(self.auth_headers())
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates")
            .json(record)
            .send()
            .await?;
        Self::ensure_success(resp).await
    }

    async fn mark_offline(
        &self,
        user_id: &str,
        last_seen: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let resp = self
            .http
            .patch(self.config.rest_url("users"))
            .headers(self.auth_headers())
            .query(&[("id", format!("eq.{user_id}"))])
            .json(&serde_json::json!({
                "is_online": false,
                "last_seen": last_seen.to_rfc3339(),
            }))
            .send()
            .await?;
        Self::ensure_success(resp).await
    }

    async fn insert_location(&self, record: &LocationRecord) -> Result<(), StoreError> {
        let resp = self
            .http
            .post(self.config.rest_url("user_locations"))
            .headers(self.auth_headers())
            .json(record)
            .send()
            .await?;
        Self::ensure_success(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rest_url_handles_trailing_slash() {
        let config = StoreConfig {
            url: "https://proj.supabase.co/".into(),
            ..StoreConfig::default()
        };
        assert_eq!(
            config.rest_url("users"),
            "https://proj.supabase.co/rest/v1/users"
        );

        let config = StoreConfig {
            url: "https://proj.supabase.co".into(),
            ..StoreConfig::default()
        };
        assert_eq!(
            config.rest_url("user_locations"),
            "https://proj.supabase.co/rest/v1/user_locations"
        );
    }

    #[test]
    fn config_debug_redacts_api_key() {
        let config = StoreConfig {
            url: "https://proj.supabase.co".into(),
            api_key: "super-secret".into(),
            ..StoreConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn presence_record_column_names() {
        let record = PresenceRecord {
            id: "u1".into(),
            name: "Alice".into(),
            is_online: true,
            last_seen: "2025-06-01T12:00:00+00:00".into(),
            socket_id: "c1".into(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "u1");
        assert_eq!(json["name"], "Alice");
        assert_eq!(json["is_online"], true);
        assert_eq!(json["last_seen"], "2025-06-01T12:00:00+00:00");
        assert_eq!(json["socket_id"], "c1");
    }

    #[test]
    fn location_record_null_accuracy() {
        let record = LocationRecord {
            user_id: "u1".into(),
            latitude: 41.0082,
            longitude: 28.9784,
            timestamp: "2025-06-01T12:00:00+00:00".into(),
            accuracy: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["latitude"], 41.0082);
        assert_eq!(json["longitude"], 28.9784);
        assert!(json["accuracy"].is_null());
        assert!(json.get("accuracy").is_some(), "accuracy column is sent explicitly");
    }

    #[test]
    fn store_error_display() {
        let err = StoreError::Status {
            status: 401,
            body: "bad api key".into(),
        };
        assert_eq!(err.to_string(), "store rejected request (401): bad api key");
    }
}
