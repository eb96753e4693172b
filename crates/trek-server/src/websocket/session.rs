//! Lifecycle of one accepted socket, from upgrade to cleanup.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use trek_core::ConnectionId;

use super::connection::ClientConnection;
use super::handler::ConnectionHandler;
use crate::context::ServerContext;
use crate::endpoint::Endpoint;
use crate::protocol::Envelope;

/// Per-socket knobs taken from the server configuration.
#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    /// Outbound frames buffered before sends are dropped.
    pub send_queue_capacity: usize,
    /// Delay before the welcome frame.
    pub welcome_delay: Duration,
}

/// Serve one client on `endpoint` until either side closes.
///
/// 1. Spawns the writer task draining the outbound queue
/// 2. Schedules the welcome frame
/// 3. Feeds inbound text frames to a [`ConnectionHandler`]
/// 4. On exit closes the push handle, then releases the session
#[instrument(skip_all, fields(endpoint = %endpoint.name, connection_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    endpoint: Endpoint,
    ctx: Arc<ServerContext>,
    options: SessionOptions,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(options.send_queue_capacity);

    let connection_id = ConnectionId::new();
    let _ = tracing::Span::current().record("connection_id", connection_id.as_str());
    let connection = Arc::new(ClientConnection::new(connection_id, send_tx));
    let _guard = ctx.track_connection();
    info!(active = ctx.active_connections(), "client connected");

    let writer = tokio::spawn(async move {
        while let Some(frame) = send_rx.recv().await {
            if ws_tx.send(Message::Text(String::clone(&frame).into())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let welcome_conn = Arc::clone(&connection);
    let welcome_endpoint = endpoint.name.clone();
    let welcome = tokio::spawn(async move {
        tokio::time::sleep(options.welcome_delay).await;
        let envelope = Envelope::welcome(&welcome_endpoint, welcome_conn.id().as_str());
        if let Err(e) = welcome_conn.send_envelope(&envelope) {
            debug!(error = %e, "welcome not sent");
        }
    });

    let mut handler = ConnectionHandler::new(endpoint, Arc::clone(&connection), Arc::clone(&ctx));
    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "websocket read error");
                break;
            }
        };
        let reply = match msg {
            Message::Text(text) => handler.handle_frame(text.as_str()).await,
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => handler.handle_frame(text).await,
                Err(_) => {
                    debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                    continue;
                }
            },
            Message::Close(frame) => {
                info!(code = ?frame.as_ref().map(|f| f.code), "client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };
        if let Some(reply) = reply {
            if let Err(e) = connection.send_envelope(&reply) {
                warn!(error = %e, event = %reply.event, "reply dropped");
            }
        }
    }

    connection.close();
    handler.close();
    welcome.abort();
    writer.abort();
    let dropped = connection.drop_count();
    if dropped > 0 {
        warn!(dropped, "frames dropped during connection");
    }
    info!(
        age_ms = u64::try_from(connection.age().as_millis()).unwrap_or(u64::MAX),
        "client disconnected"
    );
}

/// Close an upgrade on an unrecognised path with `1002 Invalid path`.
pub async fn reject_invalid_path(mut ws: WebSocket) {
    let frame = CloseFrame {
        code: close_code::PROTOCOL,
        reason: Utf8Bytes::from_static("Invalid path"),
    };
    if let Err(e) = ws.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "failed to send invalid-path close frame");
    }
}
