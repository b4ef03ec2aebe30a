//! waypoint-cli: probe client for the waypoint relay.
//!
//! Registers an identity, optionally streams synthetic location updates,
//! and prints every event the relay pushes back.

use std::time::Duration;

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

#[derive(Parser)]
#[command(name = "waypoint-cli", about = "Probe client for the waypoint relay")]
struct Args {
    /// Relay URL.
    #[arg(long, default_value = "ws://127.0.0.1:3000")]
    url: String,

    /// Identity to register as.
    #[arg(long, default_value = "probe")]
    user_id: String,

    /// Display name to register with.
    #[arg(long, default_value = "Probe")]
    name: String,

    /// Starting latitude for synthetic updates.
    #[arg(long, default_value_t = 41.0082)]
    latitude: f64,

    /// Starting longitude for synthetic updates.
    #[arg(long, default_value_t = 28.9784)]
    longitude: f64,

    /// Seconds between synthetic location updates (0 disables them).
    #[arg(long, default_value_t = 5)]
    interval: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "waypoint_cli=info".into()),
        )
        .init();

    let args = Args::parse();

    let (ws, _) = match connect_async(&args.url).await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(url = %args.url, error = %e, "Failed to connect");
            return;
        }
    };
    tracing::info!(url = %args.url, "Connected");

    let (mut sink, mut stream) = ws.split();

    let register = serde_json::json!({
        "type": "register",
        "userId": args.user_id,
        "name": args.name,
    });
    if sink
        .send(Message::Text(register.to_string().into()))
        .await
        .is_err()
    {
        tracing::error!("Failed to send register");
        return;
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval.max(1)));
    ticker.tick().await; // first tick fires immediately
    let mut step: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick(), if args.interval > 0 => {
                step += 1;
                // Drift the position a little each tick so peers see movement.
                let update = serde_json::json!({
                    "type": "location_update",
                    "latitude": args.latitude + step as f64 * 0.0001,
                    "longitude": args.longitude + step as f64 * 0.0001,
                    "accuracy": 10,
                });
                if sink.send(Message::Text(update.to_string().into())).await.is_err() {
                    tracing::error!("Failed to send location update");
                    break;
                }
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => println!("{text}"),
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!("Relay closed the connection");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}
