//! Who is online, and fan-out to their connections.
//!
//! A user may hold several connections. The roster is the sorted set of
//! users with at least one live connection; it is pushed to everyone when a
//! user comes online or goes offline, and to a joining connection always.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chatlink_core::wire::Envelope;
use chatlink_core::{ConnectionId, PeerId};
use metrics::{counter, gauge};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::connection::ClientConnection;
use crate::metrics::{ONLINE_USERS, WS_CONNECTIONS_ACTIVE, WS_SEND_DROPS_TOTAL};

/// Live connections indexed by connection ID.
#[derive(Default)]
pub struct PresenceRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
}

impl PresenceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and push the roster.
    ///
    /// Returns `true` if this brought the user online.
    pub async fn join(&self, connection: Arc<ClientConnection>) -> bool {
        let mut conns = self.connections.write().await;
        let came_online = !conns.values().any(|c| c.peer == connection.peer);
        let _ = conns.insert(connection.id.clone(), connection.clone());

        let roster = roster_of(&conns);
        record_gauges(conns.len(), roster.len());
        let frame = Envelope::roster(&roster);
        if came_online {
            info!(peer = %connection.peer, online = roster.len(), "user online");
            let _ = fan_out(conns.values(), &frame);
        } else {
            debug!(peer = %connection.peer, conn_id = %connection.id, "additional connection");
            let _ = connection.send_envelope(&frame);
        }
        came_online
    }

    /// Remove a connection, pushing the roster if its user went offline.
    ///
    /// Returns `true` if this took the user offline.
    pub async fn leave(&self, connection_id: &ConnectionId) -> bool {
        let mut conns = self.connections.write().await;
        let Some(gone) = conns.remove(connection_id) else {
            return false;
        };
        let went_offline = !conns.values().any(|c| c.peer == gone.peer);

        let roster = roster_of(&conns);
        record_gauges(conns.len(), roster.len());
        if went_offline {
            info!(peer = %gone.peer, online = roster.len(), "user offline");
            let _ = fan_out(conns.values(), &Envelope::roster(&roster));
        }
        went_offline
    }

    /// Sorted ids of everyone online.
    pub async fn roster(&self) -> Vec<PeerId> {
        roster_of(&*self.connections.read().await)
    }

    /// Queue `envelope` to every connection except `sender`.
    ///
    /// Returns the number of connections it was queued to.
    pub async fn relay_from(&self, sender: &ConnectionId, envelope: &Envelope) -> usize {
        let conns = self.connections.read().await;
        fan_out(conns.values().filter(|c| &c.id != sender), envelope)
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Number of distinct users online.
    pub async fn online_count(&self) -> usize {
        let conns = self.connections.read().await;
        conns.values().map(|c| &c.peer).collect::<BTreeSet<_>>().len()
    }
}

fn roster_of(conns: &HashMap<ConnectionId, Arc<ClientConnection>>) -> Vec<PeerId> {
    conns
        .values()
        .map(|c| c.peer.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn fan_out<'a>(
    targets: impl Iterator<Item = &'a Arc<ClientConnection>>,
    envelope: &Envelope,
) -> usize {
    let text = match envelope.encode() {
        Ok(text) => Arc::new(text),
        Err(e) => {
            warn!(event = %envelope.event, error = %e, "failed to encode broadcast");
            return 0;
        }
    };
    let mut delivered = 0;
    for conn in targets {
        if conn.send(text.clone()) {
            delivered += 1;
        } else {
            counter!(WS_SEND_DROPS_TOTAL).increment(1);
            warn!(conn_id = %conn.id, event = %envelope.event, "failed to queue frame to client");
        }
    }
    delivered
}

fn record_gauges(connections: usize, online: usize) {
    gauge!(WS_CONNECTIONS_ACTIVE).set(connections as f64);
    gauge!(ONLINE_USERS).set(online as f64);
}
