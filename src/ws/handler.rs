//! WebSocket upgrade handler

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::service::ArenaCommand;
use crate::game::store::ConnectionId;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::ClientMsg;
use crate::ws::registry::BroadcastFrame;

/// WebSocket upgrade handler. Identity is claimed later via `joinGame`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id: ConnectionId = Uuid::new_v4();
    info!(connection_id = %connection_id, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();

    // Subscribe before registering so no broadcast after the join reply is missed
    let broadcast_rx = state.arena.subscribe();
    let direct_rx = state.connections.register(connection_id);

    run_session(connection_id, ws_sink, ws_stream, direct_rx, broadcast_rx, &state).await;

    state.connections.unregister(connection_id);
    let _ = state
        .arena
        .command_tx
        .send(ArenaCommand::Disconnect {
            connection: connection_id,
        })
        .await;

    info!(connection_id = %connection_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    connection_id: ConnectionId,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut direct_rx: mpsc::Receiver<Arc<str>>,
    mut broadcast_rx: broadcast::Receiver<BroadcastFrame>,
    state: &AppState,
) {
    let rate_limiter = ConnectionRateLimiter::new();

    // Writer task: direct replies and broadcasts -> WebSocket
    let writer_handle = tokio::spawn(async move {
        loop {
            let json = tokio::select! {
                direct = direct_rx.recv() => match direct {
                    Some(json) => json,
                    None => break,
                },
                frame = broadcast_rx.recv() => match frame {
                    Ok(frame) if frame.except == Some(connection_id) => continue,
                    Ok(frame) => frame.json,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(
                            connection_id = %connection_id,
                            lagged_count = n,
                            "Client lagged, skipping {} frames", n
                        );
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(connection_id = %connection_id, "Broadcast channel closed");
                        break;
                    }
                },
            };

            if let Err(e) = ws_sink.send(Message::Text(json.to_string())).await {
                debug!(connection_id = %connection_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> arena task
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_inbound() {
                    warn!(connection_id = %connection_id, "Rate limited inbound message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => {
                        let cmd = ArenaCommand::Client {
                            connection: connection_id,
                            msg,
                        };
                        if state.arena.command_tx.send(cmd).await.is_err() {
                            debug!(connection_id = %connection_id, "Arena command channel closed");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(
                            connection_id = %connection_id,
                            error = %e,
                            "Failed to parse client message"
                        );
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(connection_id = %connection_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(connection_id = %connection_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}
