//! WebSocket connection handlers.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use tokio::sync::mpsc;

use crate::{
    domain::{ConnectionHandle, ConnectionId, Outbound},
    ui::state::AppState,
    usecase::InboundFrame,
};

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Spawns a task that drains the connection's outbound queue into the WebSocket sink.
///
/// The task ends after a close frame was sent, when the sink fails, or when
/// every [`ConnectionHandle`] for the queue has been dropped.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    mut sender: SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            match item {
                Outbound::Text(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    if let Err(e) = sender.send(Message::Close(Some(frame))).await {
                        tracing::debug!("Failed to send close frame: {}", e);
                    }
                    break;
                }
            }
        }
    })
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, mut receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();
    let connection_id = ConnectionId::generate();

    if let Err(e) = state
        .lobby
        .connect(ConnectionHandle::new(connection_id, tx))
    {
        tracing::error!("Cannot admit connection '{}': {}", connection_id, e);
        return;
    }
    tracing::debug!("Connection '{}' upgraded", connection_id);

    let lobby = state.lobby.clone();

    // Spawn a task to forward frames from this client to the lobby
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::debug!("WebSocket error on '{}': {}", connection_id, e);
                    break;
                }
            };

            let frame = match msg {
                Message::Text(text) => InboundFrame::Text(text.to_string()),
                Message::Binary(_) => InboundFrame::Binary,
                Message::Close(_) => {
                    tracing::debug!("Client '{}' requested close", connection_id);
                    break;
                }
                // Ping/pong is handled automatically by the WebSocket protocol
                Message::Ping(_) | Message::Pong(_) => continue,
            };
            if lobby.inbound(connection_id, frame).is_err() {
                break;
            }
        }
    });

    let mut send_task = pusher_loop(rx, sender);

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    if state.lobby.disconnect(connection_id).is_err() {
        tracing::debug!("Lobby stopped before '{}' disconnected", connection_id);
    }
    tracing::debug!("Connection '{}' closed", connection_id);
}
