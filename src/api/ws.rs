use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::api::AppState;
use crate::models::{WsClientMessage, WsServerMessage};
use crate::perms::{self, Action};

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// Upgrade handler for `/ws/patchbay`. Authentication is via the
/// `?token=` query parameter rather than an initial frame — chosen so
/// the upgrade itself can be rejected before a socket is ever opened.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsAuthQuery>,
) -> Response {
    let token = match query.token {
        Some(t) => t,
        None => return axum::http::StatusCode::UNAUTHORIZED.into_response(),
    };

    let user = match state.credentials.resolve(&token).await {
        Ok(Some(user)) => user,
        _ => return axum::http::StatusCode::UNAUTHORIZED.into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, user))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, user: crate::models::User) {
    let subscription = state.broker.subscribe();
    let mut rx = subscription.rx;

    match state.graph.snapshot().await {
        Ok(graph) => {
            let msg = WsServerMessage::Snapshot { graph };
            if send_json(&mut socket, &msg).await.is_err() {
                state.broker.unsubscribe(subscription.id);
                return;
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to take initial graph snapshot for new subscriber");
        }
    }

    loop {
        tokio::select! {
            outgoing = rx.recv() => {
                let Some(msg) = outgoing else { break };
                if send_json(&mut socket, &msg).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&mut socket, &state, &user, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    state.broker.unsubscribe(subscription.id);
}

async fn handle_client_message(socket: &mut WebSocket, state: &AppState, user: &crate::models::User, text: &str) {
    let parsed: Result<WsClientMessage, _> = serde_json::from_str(text);
    let message = match parsed {
        Ok(m) => m,
        Err(e) => {
            let _ = send_json(socket, &WsServerMessage::Error { error: e.to_string() }).await;
            return;
        }
    };

    match message {
        WsClientMessage::Refresh => {
            if let Ok(graph) = state.graph.snapshot().await {
                let _ = send_json(socket, &WsServerMessage::Snapshot { graph }).await;
            }
        }
        WsClientMessage::Connect { source, dest } => {
            if !perms::authorize(user, Action::MutateGraph, state.rooms.single_room_mode()) {
                let _ = send_json(socket, &WsServerMessage::Error {
                    error: "patchbay access required".to_string(),
                })
                .await;
                return;
            }
            match state.graph.connect_ports(&source, &dest).await {
                Ok(crate::graph::ConnectOutcome::Connected) => {
                    state.broker.broadcast(WsServerMessage::EdgeAdded { source, dest })
                }
                Ok(crate::graph::ConnectOutcome::AlreadyConnected) => {}
                Err(e) => {
                    let _ = send_json(socket, &WsServerMessage::Error { error: e.to_string() }).await;
                }
            }
        }
        WsClientMessage::Disconnect { source, dest } => {
            if !perms::authorize(user, Action::MutateGraph, state.rooms.single_room_mode()) {
                let _ = send_json(socket, &WsServerMessage::Error {
                    error: "patchbay access required".to_string(),
                })
                .await;
                return;
            }
            match state.graph.disconnect_ports(&source, &dest).await {
                Ok(()) => state.broker.broadcast(WsServerMessage::EdgeRemoved { source, dest }),
                Err(e) => {
                    let _ = send_json(socket, &WsServerMessage::Error { error: e.to_string() }).await;
                }
            }
        }
    }
}

async fn send_json(socket: &mut WebSocket, message: &WsServerMessage) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).expect("WsServerMessage always serializes");
    socket.send(Message::Text(text)).await
}
