//! Presence tracker: the latest server-pushed roster.

use chatlink_core::PeerId;
use tokio::sync::watch;

/// Holds the current roster; every push replaces it wholesale.
pub struct PresenceTracker {
    tx: watch::Sender<Vec<PeerId>>,
}

impl PresenceTracker {
    /// Start with an empty roster.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self { tx }
    }

    /// Replace the roster. Returns `false` when `peers` equals the current one.
    pub fn replace(&self, peers: Vec<PeerId>) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == peers {
                false
            } else {
                *current = peers;
                true
            }
        })
    }

    /// Empty the roster. Returns `false` if it was already empty.
    pub fn clear(&self) -> bool {
        self.replace(Vec::new())
    }

    /// Copy of the current roster.
    pub fn snapshot(&self) -> Vec<PeerId> {
        self.tx.borrow().clone()
    }

    /// Read-only view for collaborators.
    pub fn subscribe(&self) -> watch::Receiver<Vec<PeerId>> {
        self.tx.subscribe()
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new()
    }
}
