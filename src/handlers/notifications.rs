// src/handlers/notifications.rs
//
// Websocket endpoint for the notification fan-out. Browsers cannot set an
// Authorization header on a websocket handshake, so the JWT travels in the
// query string.

use axum::{
    extract::{Query, State, WebSocketUpgrade, ws::Message, ws::WebSocket},
    response::Response,
};
use serde::Deserialize;
use serde_json::Value;

use crate::{error::AppError, state::AppState, utils::jwt::verify_jwt};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: String,
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    if state.blocklist.contains(&params.token) {
        return Err(AppError::AuthError("Token blocked".to_string()));
    }
    let claims = verify_jwt(&params.token, &state.config.jwt_secret)?;
    let user_id = claims.user_id()?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user_id)))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, user_id: i64) {
    let mut rx = state.notifier.register(user_id);
    tracing::debug!(user_id, "websocket connected");

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(payload) = outbound else { break };
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&state, user_id, text.as_str());
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(user_id, "websocket error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    state.notifier.unregister(user_id);
    tracing::debug!(user_id, "websocket disconnected");
}

/// The only inbound message clients send is a topic subscription:
/// `{"type": "subscribe", "topic": "questions/math/algebra"}`.
/// Anything else is ignored.
fn handle_client_message(state: &AppState, user_id: i64, text: &str) {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return;
    };

    if value.get("type").and_then(Value::as_str) == Some("subscribe") {
        if let Some(topic) = value.get("topic").and_then(Value::as_str) {
            state.notifier.subscribe(user_id, topic);
        }
    }
}
