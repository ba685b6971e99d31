//! WebSocket message dispatch: parses an incoming text frame as an
//! [`Envelope`] and answers, relays, or drops it.

use chatlink_core::wire::{EVENT_ONLINE_USERS, EVENT_PING, EVENT_PONG, Envelope};
use metrics::counter;
use tracing::{debug, instrument, warn};

use super::connection::ClientConnection;
use super::presence::PresenceRegistry;
use crate::metrics::RELAYED_MESSAGES_TOTAL;

/// What became of one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Heartbeat probe answered with `pong` to the sender.
    Pong,
    /// Roster requested; sent to the sender.
    Roster,
    /// Relayed to this many other connections.
    Relayed {
        /// Connections the frame was queued to.
        recipients: usize,
    },
    /// A server-only event sent by a client.
    Ignored,
    /// Not a valid envelope.
    Malformed,
}

/// Handle an incoming text frame from `connection`.
#[instrument(skip_all, fields(conn_id = %connection.id, event))]
pub async fn handle_message(
    text: &str,
    connection: &ClientConnection,
    presence: &PresenceRegistry,
) -> HandleOutcome {
    let envelope = match Envelope::decode(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, len = text.len(), "malformed frame ignored");
            return HandleOutcome::Malformed;
        }
    };
    let _ = tracing::Span::current().record("event", envelope.event.as_str());
    connection.mark_alive();

    match envelope.event.as_str() {
        EVENT_PING => {
            let _ = connection.send_envelope(&Envelope::pong());
            HandleOutcome::Pong
        }
        EVENT_ONLINE_USERS => {
            let roster = presence.roster().await;
            let _ = connection.send_envelope(&Envelope::roster(&roster));
            HandleOutcome::Roster
        }
        EVENT_PONG => {
            debug!("client-sent pong ignored");
            HandleOutcome::Ignored
        }
        _ => {
            let recipients = presence.relay_from(&connection.id, &envelope).await;
            counter!(RELAYED_MESSAGES_TOTAL).increment(1);
            debug!(recipients, "relayed");
            HandleOutcome::Relayed { recipients }
        }
    }
}
