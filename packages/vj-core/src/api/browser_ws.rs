//! Browser/admin-facing WebSocket handler: registers each connection with
//! [`crate::browser::BrowserRegistry`] and routes inbound frames through
//! [`crate::browser::dispatch`].

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::protocol::BrowserInboundEnvelope;
use crate::state::AppState;
use crate::supervisors::BrowserHeartbeats;

#[derive(Clone)]
pub struct BrowserWsState {
    pub app: Arc<AppState>,
    pub heartbeats: Arc<BrowserHeartbeats>,
}

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<BrowserWsState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: BrowserWsState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<serde_json::Value>();

    let id = state.app.browsers.register(tx);
    state.heartbeats.track(id);
    log::info!("[BrowserWs] Observer {id} connected ({} total)", state.app.browsers.len());

    let writer = tokio::spawn(async move {
        while let Some(value) = rx.recv().await {
            if sink.send(Message::Text(value.to_string())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        let Ok(envelope) = serde_json::from_str::<BrowserInboundEnvelope>(&text) else {
            state.app.browsers.send_to(
                id,
                serde_json::json!({"type": "error", "message": "invalid JSON"}),
            );
            continue;
        };

        if envelope.kind == "pong" {
            state.heartbeats.record_pong(id);
            continue;
        }

        for (recipient, message) in crate::browser::dispatch(&state.app, id, envelope).await {
            match recipient {
                Some(target) => state.app.browsers.send_to(target, message),
                None => state.app.browsers.broadcast(message),
            }
        }
    }

    state.app.browsers.unregister(id);
    state.heartbeats.forget(id);
    writer.abort();
    log::info!("[BrowserWs] Observer {id} disconnected ({} remaining)", state.app.browsers.len());
}
