//! Broadcast websocket server: republishes the latest premium snapshots to connected
//! clients (spec §4.11). Grounded on the teacher's `apps/server/src/ws_server.rs`
//! (axum + `tokio::sync::broadcast`, one upgrade handler fanning out to all sockets).
//! No trading decisions are made here; this is a thin external interface.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

use crate::dashboard::PremiumSnapshotRow;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum WsServerMessage {
    #[serde(rename = "premiums")]
    Premiums(Vec<PremiumSnapshotRow>),
}

pub type BroadcastSender = broadcast::Sender<WsServerMessage>;

#[derive(Clone)]
struct ServerState {
    sender: BroadcastSender,
}

/// Builds the axum router for the broadcast server. `capacity` bounds the broadcast
/// channel so a slow consumer can only ever lag, never block producers.
pub fn build_router(capacity: usize) -> (Router, BroadcastSender) {
    let (sender, _receiver) = broadcast::channel(capacity);
    let state = ServerState { sender: sender.clone() };
    let router = Router::new()
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state);
    (router, sender)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ServerState) {
    let mut receiver = state.sender.subscribe();
    let (mut sink, mut stream) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Ok(message) = receiver.recv().await {
            let Ok(json) = serde_json::to_string(&message) else {
                continue;
            };
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    // Drain and ignore client frames; this server only pushes.
    while let Some(Ok(_)) = stream.next().await {}
    send_task.abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_channel_delivers_to_late_subscriber() {
        let (sender, _) = broadcast::channel::<WsServerMessage>(8);
        let mut receiver = sender.subscribe();
        sender.send(WsServerMessage::Premiums(Vec::new())).unwrap();
        assert!(receiver.try_recv().is_ok());
    }
}
