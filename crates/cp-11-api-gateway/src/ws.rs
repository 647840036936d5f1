//! WebSocket upgrade and the per-connection reader/writer pumps.
//!
//! The handshake authenticates before upgrading. After upgrade two tasks
//! cooperate: the writer drains the hub's bounded frame buffer into the
//! socket, the reader parses client commands and feeds the hub. When the
//! hub drops a connection, the writer drains what is already buffered for
//! up to two seconds and closes.

use crate::error::IntoApiError;
use crate::middleware::auth::resolve_scope;
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use cp_05_authz::EffectiveScope;
use cp_06_realtime::protocol::rooms;
use cp_06_realtime::{
    ClientCommand, CloseReason, ConnectionId, HubHandle, RegisterRequest, CLOSE_DRAIN_SECS,
    MAX_FRAME_BYTES,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use shared_types::{RequestId, Role};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: String,
}

/// `GET /ws/connect?token=...`: authenticate, then upgrade.
pub async fn connect(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let request_id = RequestId::generate();
    let claims = match state.tokens.verify(&query.token) {
        Ok(claims) => claims,
        Err(e) => return e.into_api(&request_id).into_response(),
    };
    let scope = match resolve_scope(&state, &claims).await {
        Ok(scope) => scope.with_school(claims.school.clone()),
        Err(e) => return e.into_api(&request_id).into_response(),
    };

    // Allow slack above the protocol cap so our own size check, with its
    // specific close reason, fires first.
    ws.max_message_size(MAX_FRAME_BYTES * 2)
        .on_upgrade(move |socket| run_connection(state, scope, socket))
}

async fn run_connection(state: AppState, scope: EffectiveScope, socket: WebSocket) {
    let (frames_tx, mut frames_rx) = mpsc::channel(cp_06_realtime::SEND_BUFFER_FRAMES);
    let register = RegisterRequest {
        user_id: scope.user_id.clone(),
        role: scope.role,
        school_code: scope.school_code.clone(),
        courier_prefix: scope.courier.as_ref().map(|c| c.managed_prefix),
    };
    let Some(conn) = state.hub.register(register, frames_tx).await else {
        return;
    };

    let (mut sink, mut stream) = socket.split();

    // Writer pump: hub frames → socket. Ends when the hub drops the
    // connection (after delivering whatever was buffered) or the socket
    // dies.
    let writer = tokio::spawn(async move {
        while let Some(frame) = frames_rx.recv().await {
            let Ok(text) = serde_json::to_string(&frame) else {
                continue;
            };
            if sink.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
        // Hub closed us; the buffered frames above were the drain. Give the
        // close frame a bounded window and discard anything else.
        let _ = tokio::time::timeout(
            Duration::from_secs(CLOSE_DRAIN_SECS),
            sink.send(Message::Close(None)),
        )
        .await;
    });

    // Reader pump: socket → hub commands.
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if text.len() > MAX_FRAME_BYTES {
                    warn!(conn = %conn, bytes = text.len(), "Inbound frame over size cap");
                    state
                        .hub
                        .unregister(conn.clone(), CloseReason::MessageTooLarge)
                        .await;
                    break;
                }
                match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(command) => {
                        handle_command(&state.hub, &scope, &conn, command).await;
                    }
                    Err(e) => {
                        debug!(conn = %conn, error = %e, "Unparsable client frame ignored");
                    }
                }
            }
            Ok(Message::Binary(bytes)) => {
                if bytes.len() > MAX_FRAME_BYTES {
                    state
                        .hub
                        .unregister(conn.clone(), CloseReason::MessageTooLarge)
                        .await;
                    break;
                }
            }
            // Protocol-level liveness counts the same as an app pong.
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                state.hub.pong(conn.clone()).await;
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                debug!(conn = %conn, error = %e, "WebSocket read error");
                break;
            }
        }
    }

    // Idempotent for paths that already unregistered above.
    state.hub.unregister(conn, CloseReason::Normal).await;
    let _ = writer.await;
}

async fn handle_command(
    hub: &HubHandle,
    scope: &EffectiveScope,
    conn: &ConnectionId,
    command: ClientCommand,
) {
    match command {
        ClientCommand::JoinRoom { room } => {
            if room_allowed(scope, &room) {
                hub.join(conn.clone(), room).await;
            } else {
                debug!(conn = %conn, room, "Room join refused");
            }
        }
        ClientCommand::LeaveRoom { room } => hub.leave(conn.clone(), room).await,
        ClientCommand::Replay { room, from_seq } => {
            hub.replay(conn.clone(), room, from_seq).await;
        }
        ClientCommand::Pong => hub.pong(conn.clone()).await,
    }
}

/// Which rooms a caller may join on request.
///
/// Public rooms and letter rooms are open; another user's personal room is
/// not; prefix rooms require a courier whose managed territory intersects
/// the requested prefix. Admins join anything.
fn room_allowed(scope: &EffectiveScope, room: &str) -> bool {
    if scope.role == Role::Admin {
        return true;
    }
    if room == rooms::GLOBAL || room == rooms::SYSTEM || room.starts_with("letter:") {
        return true;
    }
    if let Some(user) = room.strip_prefix("user:") {
        return user == scope.user_id.as_str();
    }
    if let Some(school) = room.strip_prefix("school:") {
        return scope.school_code.as_deref() == Some(school);
    }
    if let Some(prefix) = room.strip_prefix("prefix:") {
        let Some(courier) = &scope.courier else {
            return false;
        };
        let Ok(requested) = prefix.parse::<cp_01_opcode::OpCodePrefix>() else {
            return false;
        };
        return requested.contains_prefix(&courier.managed_prefix)
            || courier.managed_prefix.contains_prefix(&requested);
    }
    if room == rooms::COURIERS {
        return scope.courier.is_some();
    }
    false
}
