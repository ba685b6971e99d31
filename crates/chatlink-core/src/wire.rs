//! JSON wire envelope shared by the client transport and the relay server.
//!
//! Every text frame is `{"event": <name>, "data": <json>}`. A handful of
//! event names are reserved for liveness and presence; all others are
//! application messages relayed verbatim.

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ChatlinkError, Result};
use crate::events::{InboundMessage, TransportEvent};
use crate::ids::{IdentityToken, PeerId};

/// Heartbeat probe sent by the client.
pub const EVENT_PING: &str = "ping";
/// Heartbeat acknowledgment sent by the server.
pub const EVENT_PONG: &str = "pong";
/// Presence roster pushed by the server.
pub const EVENT_ONLINE_USERS: &str = "getOnlineUsers";
/// Query parameter carrying the identity on the upgrade request.
pub const IDENTITY_QUERY_PARAM: &str = "userId";

/// One JSON text frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name.
    pub event: String,
    /// Event payload (`null` when absent).
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl Envelope {
    /// Build an envelope with a payload.
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Heartbeat probe.
    pub fn ping() -> Self {
        Self::new(EVENT_PING, Value::Null)
    }

    /// Heartbeat acknowledgment.
    pub fn pong() -> Self {
        Self::new(EVENT_PONG, Value::Null)
    }

    /// Presence roster push.
    pub fn roster(peers: &[PeerId]) -> Self {
        let ids = peers
            .iter()
            .map(|p| Value::String(p.as_str().to_owned()))
            .collect();
        Self::new(EVENT_ONLINE_USERS, Value::Array(ids))
    }

    /// Serialize to a text frame.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ChatlinkError::InvalidFrame(e.to_string()))
    }

    /// Parse a text frame.
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ChatlinkError::InvalidFrame(e.to_string()))
    }

    /// Whether this is a heartbeat probe.
    pub fn is_ping(&self) -> bool {
        self.event == EVENT_PING
    }

    /// Translate a server frame into the transport event the client reports.
    ///
    /// A roster frame whose payload is not an array of strings is rejected so
    /// a malformed push never replaces a good roster.
    pub fn into_client_event(self) -> Result<TransportEvent> {
        match self.event.as_str() {
            EVENT_PONG => Ok(TransportEvent::Ack),
            EVENT_ONLINE_USERS => {
                let peers: Vec<PeerId> = serde_json::from_value(self.data).map_err(|e| {
                    ChatlinkError::InvalidFrame(format!("roster payload: {e}"))
                })?;
                Ok(TransportEvent::Message(InboundMessage::Roster(peers)))
            }
            _ => Ok(TransportEvent::Message(InboundMessage::Application {
                event: self.event,
                data: self.data,
            })),
        }
    }
}

/// Append the identity query parameter to a server URL.
pub fn url_with_identity(server_url: &str, identity: &IdentityToken) -> String {
    let separator = if server_url.contains('?') { '&' } else { '?' };
    let encoded = utf8_percent_encode(identity.as_str(), NON_ALPHANUMERIC);
    format!("{server_url}{separator}{IDENTITY_QUERY_PARAM}={encoded}")
}
