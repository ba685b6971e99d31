//! Status publisher: the single observable [`ConnectionState`].

use chatlink_core::ConnectionState;
use tokio::sync::watch;
use tracing::{info, warn};

/// Result of a requested status change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// The status moved.
    Changed {
        /// Previous value.
        from: ConnectionState,
        /// New value.
        to: ConnectionState,
    },
    /// The requested value was already current.
    Unchanged,
    /// The edge is not in the transition table; nothing was published.
    Refused {
        /// Current value.
        from: ConnectionState,
        /// Rejected target.
        to: ConnectionState,
    },
}

/// Publishes status changes to any number of readers.
pub struct StatusPublisher {
    tx: watch::Sender<ConnectionState>,
}

impl StatusPublisher {
    /// Start at [`ConnectionState::Disconnected`].
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::default());
        Self { tx }
    }

    /// Current value.
    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Receiver that observes every published change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Move to `next` if the transition table allows it.
    pub fn transition(&self, next: ConnectionState) -> Transition {
        let from = self.current();
        if from == next {
            return Transition::Unchanged;
        }
        if !from.can_transition_to(next) {
            warn!(from = %from, to = %next, "refusing illegal status transition");
            return Transition::Refused { from, to: next };
        }
        let _ = self.tx.send_replace(next);
        info!(from = %from, to = %next, "connection status changed");
        Transition::Changed { from, to: next }
    }
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new()
    }
}
