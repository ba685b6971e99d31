//! WebSocket transport over `tokio-tungstenite`.
//!
//! Dials `<server_url>?userId=<identity>` and speaks JSON text frames
//! `{"event", "data"}`. The session task translates everything it sees into
//! [`TransportEvent`]s; it never decides anything about reconnection.

use chatlink_core::events::CloseReason;
use chatlink_core::wire::{Envelope, url_with_identity};
use chatlink_core::TransportEvent;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tracing::{debug, warn};

use super::{OpenRequest, Outbound, TransportFactory, TransportHandle, TransportPeer};

/// Factory for real WebSocket sessions.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebSocketTransport;

impl TransportFactory for WebSocketTransport {
    fn open(&self, request: OpenRequest) -> TransportHandle {
        let (handle, peer) = TransportHandle::pair();
        drop(tokio::spawn(run_session(request, peer)));
        handle
    }
}

async fn run_session(request: OpenRequest, mut peer: TransportPeer) {
    let url = url_with_identity(&request.server_url, &request.identity);
    debug!(server_url = %request.server_url, "dialing websocket");

    let stream = match tokio::time::timeout(request.connect_timeout, connect_async(url)).await {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            let _ = peer.emit(TransportEvent::OpenFailure {
                message: e.to_string(),
            });
            return;
        }
        Err(_) => {
            let _ = peer.emit(TransportEvent::OpenFailure {
                message: format!(
                    "connect timed out after {}ms",
                    request.connect_timeout.as_millis()
                ),
            });
            return;
        }
    };
    if !peer.emit(TransportEvent::OpenSuccess) {
        return;
    }

    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            frame = peer.next_outbound() => {
                let envelope = match frame {
                    Some(Outbound::Probe) => Envelope::ping(),
                    Some(Outbound::Message { event, data }) => Envelope::new(event, data),
                    Some(Outbound::Close) | None => {
                        let _ = write.send(Message::Close(None)).await;
                        let _ = peer.emit(TransportEvent::Closed { reason: CloseReason::Local });
                        return;
                    }
                };
                let text = match envelope.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, event = %envelope.event, "dropping unencodable frame");
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(text.into())).await {
                    let _ = peer.emit(TransportEvent::Error { message: e.to_string() });
                    return;
                }
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match Envelope::decode(text.as_str()).and_then(Envelope::into_client_event) {
                        Ok(event) => {
                            if !peer.emit(event) {
                                return;
                            }
                        }
                        Err(e) => warn!(error = %e, "dropping malformed frame"),
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let _ = peer.emit(TransportEvent::Closed { reason: remote_reason(frame) });
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = peer.emit(TransportEvent::Error { message: e.to_string() });
                    return;
                }
                None => {
                    let _ = peer.emit(TransportEvent::Closed {
                        reason: CloseReason::remote("transport close"),
                    });
                    return;
                }
            },
        }
    }
}

fn remote_reason(frame: Option<CloseFrame>) -> CloseReason {
    match frame {
        Some(frame) => CloseReason::Remote {
            code: Some(u16::from(frame.code)),
            message: if frame.reason.is_empty() {
                "server close".to_owned()
            } else {
                frame.reason.as_str().to_owned()
            },
        },
        None => CloseReason::remote("server close"),
    }
}
