//! Transport seam between the connection manager and the network.
//!
//! A [`TransportFactory`] turns an [`OpenRequest`] into a [`TransportHandle`]
//! without blocking: the open result, and everything after it, arrives on
//! the handle's event channel as [`TransportEvent`]s in arrival order.
//! Implementations keep the other end of the handle as a [`TransportPeer`].

pub mod websocket;

use std::time::Duration;

use chatlink_core::errors::{ChatlinkError, Result};
use chatlink_core::{IdentityToken, TransportEvent};
use serde_json::Value;
use tokio::sync::mpsc;

pub use websocket::WebSocketTransport;

/// Parameters for one open attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenRequest {
    /// Identity the session is bound to.
    pub identity: IdentityToken,
    /// Server endpoint.
    pub server_url: String,
    /// Bound on establishing the session.
    pub connect_timeout: Duration,
}

/// A frame the manager asks the transport to send.
#[derive(Clone, Debug, PartialEq)]
pub enum Outbound {
    /// Heartbeat probe.
    Probe,
    /// Pass-through application message.
    Message {
        /// Event name.
        event: String,
        /// Payload.
        data: Value,
    },
    /// Close the session locally.
    Close,
}

/// Write half of a transport handle.
#[derive(Clone, Debug)]
pub struct TransportSink {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl TransportSink {
    /// Queue a frame for the transport.
    pub fn send(&self, frame: Outbound) -> Result<()> {
        self.tx
            .send(frame)
            .map_err(|_| ChatlinkError::Transport("transport is closed".into()))
    }

    /// Ask the transport to close. A transport that is already gone is fine.
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }

    /// Whether the transport side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// One session as seen by the manager. Replaced, never reused.
#[derive(Debug)]
pub struct TransportHandle {
    /// Lifecycle and inbound events.
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
    /// Outbound frames.
    pub sink: TransportSink,
}

impl TransportHandle {
    /// Create a handle and the peer end a transport implementation drives.
    pub fn pair() -> (Self, TransportPeer) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let handle = Self {
            events: event_rx,
            sink: TransportSink { tx: out_tx },
        };
        let peer = TransportPeer {
            events: event_tx,
            outbound: out_rx,
        };
        (handle, peer)
    }
}

/// The transport implementation's end of a [`TransportHandle`].
#[derive(Debug)]
pub struct TransportPeer {
    events: mpsc::UnboundedSender<TransportEvent>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
}

impl TransportPeer {
    /// Report an event. Returns `false` once the manager has let go.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Next frame to send; `None` when the sink was dropped.
    pub async fn next_outbound(&mut self) -> Option<Outbound> {
        self.outbound.recv().await
    }

    /// Non-blocking variant of [`next_outbound`](Self::next_outbound).
    pub fn try_outbound(&mut self) -> Option<Outbound> {
        self.outbound.try_recv().ok()
    }

    /// Whether the manager dropped its event receiver.
    pub fn is_detached(&self) -> bool {
        self.events.is_closed()
    }
}

/// Opens transport sessions.
pub trait TransportFactory: Send + Sync + 'static {
    /// Start opening a session. Must not block.
    fn open(&self, request: OpenRequest) -> TransportHandle;
}
