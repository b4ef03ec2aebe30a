//! waypoint-relay: real-time presence and location-sharing relay.
//!
//! Accepts WebSocket connections, tracks registered users in an in-memory
//! session registry, fans out join/leave/location events to every peer,
//! and mirrors presence into a durable store on a best-effort basis.

mod broadcast;
mod connection;
mod handler;
mod protocol;
mod registry;

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

use waypoint_store::{PresenceStore, StoreConfig, SupabaseStore};

use crate::broadcast::Broadcaster;
use crate::connection::handle_connection;
use crate::handler::Relay;
use crate::registry::SessionRegistry;

const DEFAULT_PORT: u16 = 3000;

#[derive(Parser)]
#[command(name = "waypoint-relay", about = "WebSocket relay for live location sharing")]
struct Args {
    /// Port to listen on. Falls back to the PORT environment variable,
    /// then to 3000.
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "waypoint_relay=info".into()),
        )
        .init();

    let args = Args::parse();
    let port = args
        .port
        .or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse().ok()))
        .unwrap_or(DEFAULT_PORT);

    let store: Option<Arc<dyn PresenceStore>> = match StoreConfig::from_env() {
        Some(config) => {
            let store = Arc::new(SupabaseStore::new(config));
            // Startup probe is purely diagnostic; the relay serves either way.
            let probe = Arc::clone(&store);
            tokio::spawn(async move {
                match probe.check_connectivity().await {
                    Ok(()) => tracing::info!("Durable store reachable"),
                    Err(e) => tracing::error!(error = %e, "Durable store unreachable"),
                }
            });
            Some(store as Arc<dyn PresenceStore>)
        }
        None => {
            tracing::warn!("SUPABASE_URL / SUPABASE_ANON_KEY not set; persistence disabled");
            None
        }
    };

    let relay = Relay::new(SessionRegistry::new(), Broadcaster::new(), store);

    let addr = format!("{}:{}", args.bind, port);
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind TCP listener");

    tracing::info!("waypoint-relay listening on {}", addr);

    // Accept loop.
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let relay = relay.clone();
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => handle_connection(ws, addr, relay).await,
                        Err(e) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}
