//! WebSocket endpoint streaming mailbox events

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;

use super::ServerAppState;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<ServerAppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

async fn handle_websocket(socket: WebSocket, state: ServerAppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut event_rx = state.broadcaster.subscribe();

    log::info!("WebSocket client connected");

    let send_task = tokio::spawn(async move {
        loop {
            let event = match event_rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("WebSocket client lagged, skipped {} events", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("Failed to serialize event: {}", e);
                }
            }
        }
    });

    // Clients only listen; incoming frames just keep the connection alive
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                log::warn!("WebSocket error: {}", e);
                break;
            }
        }
    }

    send_task.abort();
    log::info!("WebSocket connection closed");
}
