//! Per-socket task: owns the WebSocket, feeds inbound frames to the
//! protocol handler, and drains the outbound broadcast queue.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use crate::handler::Relay;
use crate::protocol::ClientEvent;
use crate::registry::ConnId;

/// Handle a single WebSocket connection from accept to close.
pub async fn handle_connection(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    addr: SocketAddr,
    relay: Relay,
) {
    let conn_id = ConnId::new();
    info!(peer = %addr, conn = %conn_id, "Connection opened");

    let (mut sink, mut stream) = ws.split();
    let mut rx = relay.broadcaster.join(conn_id.clone()).await;

    loop {
        tokio::select! {
            // Broadcasts queued for this connection → its WebSocket.
            Some(msg) = rx.recv() => {
                if sink.send(Message::Text(msg.into())).await.is_err() {
                    break;
                }
            }

            // Frames from this connection → the protocol handler.
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => relay.handle_event(&conn_id, event).await,
                            Err(e) => {
                                debug!(conn = %conn_id, error = %e, "Ignoring unrecognized frame");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(peer = %addr, conn = %conn_id, error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    relay.handle_disconnect(&conn_id).await;
    info!(peer = %addr, conn = %conn_id, "Connection closed");
}
