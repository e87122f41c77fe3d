use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};

use crate::conn::ConnHandle;
use crate::lobby::LobbyCommand;
use eightball_shared::protocol::{ClientMsg, ErrorMsg, ServerMsg};

/// Shared app state passed to each WebSocket handler
#[derive(Clone)]
pub struct AppState {
    pub lobby_tx: mpsc::Sender<LobbyCommand>,
    pub outbound_capacity: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Token from an earlier `hello`, to resume that player's session
    pub token: Option<String>,
}

/// HTTP handler for WebSocket upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(app_state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, params.token))
}

pub async fn health_handler() -> &'static str {
    "ok"
}

async fn handle_socket(socket: WebSocket, app_state: AppState, token: Option<String>) {
    let (mut sink, mut stream) = socket.split();
    let (conn, mut outbound_rx) = ConnHandle::channel(app_state.outbound_capacity);

    // Register with the lobby
    let (resp_tx, resp_rx) = oneshot::channel();
    if app_state
        .lobby_tx
        .send(LobbyCommand::Connect {
            token,
            conn: conn.clone(),
            response: resp_tx,
        })
        .await
        .is_err()
    {
        tracing::error!("Failed to send Connect command");
        return;
    }

    let token = match resp_rx.await {
        Ok(token) => token,
        Err(_) => {
            tracing::error!("Failed to receive session token");
            return;
        }
    };

    tracing::info!(conn = %conn.id, "Client connected");

    loop {
        tokio::select! {
            // Client -> Server
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match ClientMsg::parse(&text) {
                            Some(msg) => {
                                let cmd = LobbyCommand::Client {
                                    token: token.clone(),
                                    conn: conn.clone(),
                                    msg,
                                };
                                if app_state.lobby_tx.send(cmd).await.is_err() {
                                    break;
                                }
                            }
                            None => {
                                conn.send(ServerMsg::Error(ErrorMsg::bad_message()));
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {} // Ignore ping/pong/binary
                }
            }

            // Server -> Client
            Some(msg) = outbound_rx.recv() => {
                match serde_json::to_string(&msg) {
                    Ok(json) => {
                        if sink.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::error!("Failed to encode server message: {}", e),
                }
            }
        }
    }

    // Cleanup on disconnect
    let _ = app_state
        .lobby_tx
        .send(LobbyCommand::Disconnect {
            token,
            conn_id: conn.id,
        })
        .await;
    tracing::info!(conn = %conn.id, "Client disconnected");
}
