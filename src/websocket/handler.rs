use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::{header, HeaderMap, Uri},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Deserialize;

use crate::server::AppState;

use super::session::{SessionContext, SessionRequest};

#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
    pub room: Option<String>,
}

/// WebSocket upgrade handler. Any path not claimed by another route names a room.
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, query, headers, uri),
    fields(path = %uri.path(), has_query_token = query.token.is_some())
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let token = extract_token(&query, &headers);
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let request = SessionRequest::new(uri.path(), query.room, host, token);
    let admitted = match request.admit(&state.admission) {
        Ok(admitted) => admitted,
        Err(e) => return e.into_response(),
    };

    let ws_settings = &state.settings.websocket;
    let ctx = SessionContext {
        registry: state.registry.clone(),
        outbound_queue_size: ws_settings.outbound_queue_size,
        idle_timeout: ws_settings.idle_timeout(),
        echo_to_sender: ws_settings.echo_to_sender,
        shutdown: state.shutdown_tx.subscribe(),
    };

    tracing::debug!(room = %admitted.room(), "WebSocket upgrade accepted");

    ws.read_buffer_size(ws_settings.read_buffer_size)
        .write_buffer_size(ws_settings.write_buffer_size)
        .max_message_size(ws_settings.max_message_size)
        .on_upgrade(move |socket| async move {
            let (sink, stream) = socket.split();
            admitted.run(ctx, sink, stream).await;
        })
}

/// Extract token from query parameter or Authorization header
fn extract_token(query: &WsQuery, headers: &HeaderMap) -> Option<String> {
    // First try query parameter
    if let Some(ref token) = query.token {
        return Some(token.clone());
    }

    // Then try Authorization header
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}
