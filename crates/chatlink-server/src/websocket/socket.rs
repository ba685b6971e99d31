//! Per-connection socket loop: writes queued frames, reads client frames,
//! and watches liveness and shutdown.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::connection::{ClientConnection, Outgoing};
use super::handler::handle_message;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use super::presence::PresenceRegistry;

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client closed the socket or the stream ended.
    ClientClosed,
    /// The client stopped answering Pings.
    HeartbeatTimeout,
    /// Writing to the socket failed.
    SendFailed,
    /// The server is shutting down.
    Shutdown,
}

impl DisconnectReason {
    /// Metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::SendFailed => "send_failed",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Liveness timing for one connection.
#[derive(Debug, Clone, Copy)]
pub struct Liveness {
    /// Interval between Pings.
    pub interval: Duration,
    /// Consecutive silent intervals tolerated.
    pub max_missed: u32,
}

/// Drive `socket` until the client leaves, goes quiet, or `cancel` fires.
pub async fn serve_connection(
    socket: WebSocket,
    connection: Arc<ClientConnection>,
    mut outgoing: mpsc::Receiver<Outgoing>,
    presence: Arc<PresenceRegistry>,
    liveness: Liveness,
    cancel: CancellationToken,
) -> DisconnectReason {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let heartbeat_cancel = cancel.child_token();
    let mut heartbeat = tokio::spawn(run_heartbeat(
        connection.clone(),
        liveness.interval,
        liveness.max_missed,
        heartbeat_cancel.clone(),
    ));

    let reason = loop {
        tokio::select! {
            out = outgoing.recv() => {
                let Some(out) = out else { break DisconnectReason::SendFailed };
                let message = match out {
                    Outgoing::Text(text) => WsMessage::Text(text.as_str().into()),
                    Outgoing::Ping => WsMessage::Ping(Bytes::new()),
                };
                if let Err(e) = ws_tx.send(message).await {
                    debug!(conn_id = %connection.id, error = %e, "socket write failed");
                    break DisconnectReason::SendFailed;
                }
            }
            inbound = ws_rx.next() => match inbound {
                Some(Ok(WsMessage::Text(text))) => {
                    let _ = handle_message(text.as_str(), &connection, &presence).await;
                }
                Some(Ok(WsMessage::Pong(_))) => {
                    trace!(conn_id = %connection.id, "pong");
                    connection.mark_alive();
                }
                Some(Ok(WsMessage::Close(_))) | None => break DisconnectReason::ClientClosed,
                Some(Ok(WsMessage::Binary(_))) => {
                    warn!(conn_id = %connection.id, "binary frame ignored");
                }
                // axum answers Pings itself
                Some(Ok(WsMessage::Ping(_))) => {}
                Some(Err(e)) => {
                    debug!(conn_id = %connection.id, error = %e, "socket read failed");
                    break DisconnectReason::ClientClosed;
                }
            },
            result = &mut heartbeat => {
                break match result {
                    Ok(HeartbeatResult::TimedOut) => DisconnectReason::HeartbeatTimeout,
                    Ok(HeartbeatResult::Cancelled) | Err(_) => DisconnectReason::Shutdown,
                };
            }
            () = cancel.cancelled() => break DisconnectReason::Shutdown,
        }
    };

    heartbeat_cancel.cancel();
    if matches!(
        reason,
        DisconnectReason::HeartbeatTimeout | DisconnectReason::Shutdown
    ) {
        let _ = ws_tx.send(WsMessage::Close(None)).await;
    }
    reason
}
