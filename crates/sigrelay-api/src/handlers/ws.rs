//! WebSocket upgrade handler.
//!
//! Peers declare their role either in the query string
//! (`/ws?type=player`) or in the path itself
//! (`/type=streamer&insid=...&projectid=...`).

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::Uri;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use sigrelay_core::AppResult;
use sigrelay_core::error::AppError;
use sigrelay_realtime::connection::attributes::ConnectionAttributes;
use sigrelay_realtime::connection::handle::OutboundFrame;

use crate::state::AppState;

/// GET /ws?type={role}&id={id}
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let attributes = ConnectionAttributes::from_pairs(params)?;
    Ok(upgrade(state, ws, attributes))
}

/// GET /{attributes}, with `type=...&insid=...` in the path itself
pub async fn ws_upgrade_path(
    State(state): State<AppState>,
    uri: Uri,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let attributes = parse_path_attributes(uri.path())?;
    Ok(upgrade(state, ws, attributes))
}

/// Parses `/type=streamer&insid=...` style paths. Values are URL-decoded.
pub fn parse_path_attributes(path: &str) -> AppResult<ConnectionAttributes> {
    let raw = path.trim_start_matches('/');
    if !raw.contains('=') {
        return Err(AppError::not_found(format!("No route for /{raw}")));
    }

    let uri: Uri = format!("/?{raw}")
        .parse()
        .map_err(|e| AppError::validation(format!("Invalid connection path: {e}")))?;
    let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(&uri)
        .map_err(|e| AppError::validation(format!("Invalid connection attributes: {e}")))?;

    ConnectionAttributes::from_pairs(pairs)
}

fn upgrade(state: AppState, ws: WebSocketUpgrade, attributes: ConnectionAttributes) -> Response {
    let max_bytes = state.config.signalling.max_message_bytes;
    ws.max_message_size(max_bytes.saturating_mul(2))
        .on_upgrade(move |socket| handle_ws_connection(state, attributes, socket))
}

/// Handles an established WebSocket connection.
async fn handle_ws_connection(state: AppState, attributes: ConnectionAttributes, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let connections = state.engine.connections.clone();

    let (handle, mut outbound_rx) = connections.open(attributes);
    let conn_id = handle.session_id;

    // Outbound forwarder: drains the connection's queue into the socket.
    let mut outbound_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            match frame {
                OutboundFrame::Text(text) => {
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                OutboundFrame::Close { reason } => {
                    let close = CloseFrame {
                        code: close_code::NORMAL,
                        reason: reason.into(),
                    };
                    let _ = ws_tx.send(Message::Close(Some(close))).await;
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut outbound_task => {
                debug!(conn_id = %conn_id, "Outbound side finished");
                break;
            }
            next = ws_rx.next() => match next {
                Some(Ok(Message::Text(text))) => {
                    connections.handle_inbound(&handle, text.as_str());
                }
                Some(Ok(Message::Binary(data))) => {
                    connections.handle_binary(&handle, &data);
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    // Transport keepalives count as activity but carry no signalling.
                    handle.touch();
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    warn!(conn_id = %conn_id, error = %e, "WebSocket error");
                    break;
                }
            }
        }
    }

    outbound_task.abort();
    connections.close(&handle);

    info!(conn_id = %conn_id, peer_id = %handle.id(), "WebSocket connection closed");
}
