//! WebSocket transport for browser sessions

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, trace, warn};

use rg_common::{ClientEvent, ServerEvent};

use crate::broadcaster::Broadcaster;
use crate::session::SessionId;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Drive one socket connection until either side closes it.
///
/// The session is registered on entry and sent a `connected` event; a
/// writer task drains its outbound channel and pings, a reader task turns
/// inbound frames into queue sends.
pub async fn handle_socket(socket: WebSocket, broadcaster: Arc<Broadcaster>) {
    let registry = Arc::clone(broadcaster.registry());
    let (session_id, mut rx) = registry.register();
    info!(session_id = %session_id, sessions = registry.count(), "Client connected");

    match (ServerEvent::Connected { session_id: session_id.to_string() }).to_json() {
        Ok(frame) => {
            registry.send_to(&session_id, frame);
        }
        Err(e) => warn!(session_id = %session_id, error = %e, "Failed to encode connected event"),
    }

    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_sid = session_id.clone();
    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        ping_interval.tick().await;

        loop {
            tokio::select! {
                frame = rx.recv() => {
                    match frame {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                    trace!(session_id = %writer_sid, "Sent ping");
                }
            }
        }
    });

    let reader_sid = session_id.clone();
    let reader_broadcaster = Arc::clone(&broadcaster);
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => {
                    handle_client_frame(&reader_broadcaster, &reader_sid, text.as_str()).await;
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    registry.unregister(&session_id);
    info!(session_id = %session_id, sessions = registry.count(), "Client disconnected");
}

/// Decode one inbound text frame and act on it.
///
/// Frames that do not decode as a known event get an `error` event back;
/// the connection stays open either way.
pub async fn handle_client_frame(broadcaster: &Broadcaster, session_id: &SessionId, frame: &str) {
    match serde_json::from_str::<ClientEvent>(frame) {
        Ok(ClientEvent::SendMessage(payload)) => {
            if let Ok(sent) = broadcaster.on_client_send(session_id, payload).await {
                debug!(
                    session_id = %session_id,
                    message_id = %sent.message_id,
                    "Client message queued"
                );
            }
        }
        Err(e) => {
            debug!(session_id = %session_id, error = %e, "Unrecognized client frame");
            broadcaster.notify_error(session_id, format!("Unrecognized event: {}", e));
        }
    }
}
