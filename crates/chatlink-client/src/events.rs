//! Notifications broadcast to collaborators.

use chatlink_core::{ConnectionState, PeerId};
use serde_json::Value;

/// Something collaborators may want to react to.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    /// The published status moved.
    StatusChanged {
        /// Previous status.
        from: ConnectionState,
        /// New status.
        to: ConnectionState,
    },
    /// The presence roster was replaced.
    RosterUpdated(Vec<PeerId>),
    /// Automatic reconnection gave up; only an explicit connect resumes.
    RetriesExhausted {
        /// Attempts made before giving up.
        attempts: u32,
    },
    /// An inbound application message, passed through untouched.
    Message {
        /// Event name.
        event: String,
        /// Payload.
        data: Value,
    },
}
