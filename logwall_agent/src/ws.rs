//! WebSocket upgrade and per-connection handler.
//!
//! A connection is authorized before the upgrade; unauthorized requests get a
//! plain 401 and never touch the broadcaster. An accepted connection receives
//! one `init` frame and then every broadcast frame until it closes, lags
//! behind the channel, or stalls on a write.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::broadcast::encode;
use crate::session::Credentials;
use crate::state::AppState;
use crate::types::Event;

/// Longest a single socket write may take before the subscriber is dropped.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(q): Query<WsQuery>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let creds = Credentials::from_request(&headers, q.token);
    let authorized = state.gate.authorize(&creds).await;
    if !authorized {
        debug!("ws connect refused");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };
    let peer = peer
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".into());
    ws.on_upgrade(move |socket| handle_socket(socket, state, authorized, peer))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, authorized: bool, peer: String) {
    let Some(mut sub) = state.hub.subscribe(authorized, peer).await else {
        return;
    };
    let id = sub.id;

    let init = state.init_payload(&sub.basis).await;
    let Some(frame) = encode(&Event::Init(init)) else {
        return;
    };
    if !send_frame(&mut socket, frame.to_string()).await {
        debug!(id, "init send failed");
        return;
    }

    loop {
        tokio::select! {
            result = sub.rx.recv() => match result {
                Ok(frame) => {
                    if !send_frame(&mut socket, frame.to_string()).await {
                        debug!(id, "send failed, dropping subscriber");
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(id, skipped = n, "subscriber lagged, disconnecting");
                    break;
                }
                Err(RecvError::Closed) => break,
            },
            msg = socket.recv() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Ping(data))) => {
                    if !send_message(&mut socket, Message::Pong(data)).await {
                        break;
                    }
                }
                Some(Err(e)) => {
                    debug!(id, "socket error: {e}");
                    break;
                }
                // client text/binary is ignored
                Some(Ok(_)) => {}
            },
        }
    }
    drop(sub);
    info!(id, subscribers = state.hub.subscriber_count(), "subscriber left");
}

async fn send_frame(socket: &mut WebSocket, text: String) -> bool {
    send_message(socket, Message::Text(text)).await
}

async fn send_message(socket: &mut WebSocket, msg: Message) -> bool {
    match tokio::time::timeout(SEND_TIMEOUT, socket.send(msg)).await {
        Ok(Ok(())) => true,
        Ok(Err(_)) => false,
        Err(_) => {
            warn!("socket write timed out");
            false
        }
    }
}
