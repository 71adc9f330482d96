//! WebSocket notifications
//!
//! - GET /api/ws?token= - Upgrade to a socket that streams store events
//!
//! The session token comes from the `token` query parameter (browsers cannot
//! set headers on a WebSocket handshake), the bearer header or the session
//! cookie. Each socket only receives events addressed to its user, plus the
//! admin feed for admins. A text `ping` is answered with `pong`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::api::middleware::{session_token, ApiError, AppState};
use crate::models::User;
use crate::services::NotificationHub;

/// Query string of the upgrade request
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub token: Option<String>,
}

/// Build the WebSocket router (authenticates on its own)
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(upgrade))
}

/// GET /api/ws
async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let token = query
        .token
        .filter(|t| !t.trim().is_empty())
        .or_else(|| session_token(&headers))
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await?
        .filter(|u| !u.is_banned())
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    let hub = state.notifications.clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, hub, user)))
}

async fn handle_socket(socket: WebSocket, hub: NotificationHub, user: User) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = hub.subscribe();
    debug!(user_id = user.id, "websocket connected");

    let hello = json!({ "event": "connected", "payload": { "user_id": user.id } });
    if sender.send(Message::Text(hello.to_string().into())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.as_str() == "ping"
                            && sender.send(Message::Text("pong".into())).await.is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(user_id = user.id, "websocket receive error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            event = events.recv() => {
                match event {
                    Ok(notification) => {
                        if !notification.is_visible_to(&user) {
                            continue;
                        }
                        let Ok(body) = serde_json::to_string(&notification) else {
                            continue;
                        };
                        if sender.send(Message::Text(body.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(user_id = user.id, skipped, "websocket client lagging, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    debug!(user_id = user.id, "websocket disconnected");
}
