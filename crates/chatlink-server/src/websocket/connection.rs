//! One live WebSocket client.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chatlink_core::wire::Envelope;
use chatlink_core::{ConnectionId, PeerId};
use tokio::sync::mpsc;
use tracing::warn;

/// Work for a connection's socket writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outgoing {
    /// An encoded JSON text frame.
    Text(Arc<String>),
    /// A protocol-level Ping.
    Ping,
}

/// A connected client, bound to the user id it upgraded with.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// The user this connection speaks for.
    pub peer: PeerId,
    tx: mpsc::Sender<Outgoing>,
    /// When this connection was established.
    pub connected_at: Instant,
    is_alive: AtomicBool,
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(id: ConnectionId, peer: PeerId, tx: mpsc::Sender<Outgoing>) -> Self {
        Self {
            id,
            peer,
            tx,
            connected_at: Instant::now(),
            is_alive: AtomicBool::new(true),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Queue a text frame.
    ///
    /// Returns `false` if the queue is full or closed, and counts the drop.
    pub fn send(&self, frame: Arc<String>) -> bool {
        self.enqueue(Outgoing::Text(frame))
    }

    /// Encode and queue an envelope.
    pub fn send_envelope(&self, envelope: &Envelope) -> bool {
        match envelope.encode() {
            Ok(text) => self.send(Arc::new(text)),
            Err(e) => {
                warn!(conn_id = %self.id, error = %e, "failed to encode frame");
                false
            }
        }
    }

    /// Queue a protocol-level Ping.
    pub fn ping(&self) -> bool {
        self.enqueue(Outgoing::Ping)
    }

    fn enqueue(&self, item: Outgoing) -> bool {
        if self.tx.try_send(item).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record a Pong (or any proof of life).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Read and clear the alive flag.
    ///
    /// Returns `true` if the client proved itself alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
