//! `WS /api/v0/websocket/{prefix}[/{file_path}]` - subscribes the caller to
//! mutation notifications on the pub/sub bus and relays them as JSON text
//! frames until either side closes.

use std::time::Instant;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use block_core::GatewayError;

use super::{reject, require_auth_header};
use crate::state::AppState;

const SUBPROTOCOL: &str = "v0.ws.block.qabel.de";

pub async fn for_prefix(
    State(state): State<AppState>,
    Path(prefix): Path<String>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, GatewayError> {
    let header = require_auth_header(&headers).map_err(|e| reject(&state, e))?;
    let outcome = state.auth.auth(header).await.map_err(GatewayError::from).map_err(|e| reject(&state, e))?;
    if !outcome.is_bypass() {
        let owns = state.db.has_prefix(outcome.user().user_id, &prefix).await.map_err(GatewayError::from)?;
        if !owns {
            return Err(reject(&state, GatewayError::Unauthorized("prefix not owned by this user".into())));
        }
    }

    let channel = prefix;
    Ok(ws
        .protocols([SUBPROTOCOL])
        .on_upgrade(move |socket| pump(socket, state, channel, true)))
}

pub async fn for_file(
    State(state): State<AppState>,
    Path((prefix, file_path)): Path<(String, String)>,
    ws: WebSocketUpgrade,
) -> Response {
    if file_path.starts_with("block/") {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    let channel = format!("{prefix}/{file_path}");
    ws.protocols([SUBPROTOCOL]).on_upgrade(move |socket| pump(socket, state, channel, false))
}

async fn pump(mut socket: WebSocket, state: AppState, channel: String, wildcard: bool) {
    state.metrics.websocket_connections.inc();
    state.metrics.pubsub_connections.inc();
    let started = Instant::now();

    let mut connection = match state.pubsub.connect().await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to open pub/sub connection for websocket");
            state.metrics.websocket_connections.dec();
            state.metrics.pubsub_connections.dec();
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    if let Err(e) = connection.subscribe(&channel, wildcard).await {
        tracing::error!(error = %e, %channel, "failed to subscribe");
        let _ = socket.send(Message::Close(None)).await;
        state.metrics.websocket_connections.dec();
        state.metrics.pubsub_connections.dec();
        return;
    }

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue, // clients never send anything meaningful here
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "websocket read error");
                        break;
                    }
                }
            }
            message = connection.next_message() => {
                match message {
                    Ok(Some(value)) => {
                        state.metrics.websocket_messages.inc();
                        if socket.send(Message::Text(value.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "pub/sub read error");
                        break;
                    }
                }
            }
        }
    }

    let _ = connection.close().await;
    state.metrics.websocket_connections.dec();
    state.metrics.pubsub_connections.dec();
    state.metrics.websocket_connection_duration.observe(started.elapsed().as_secs_f64());
}
