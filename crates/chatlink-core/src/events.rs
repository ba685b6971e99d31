//! Transport events: the closed set of things a transport handle can report.
//!
//! Every transport implementation (WebSocket, scripted test transport)
//! translates its native callbacks into [`TransportEvent`]s, so the
//! connection manager's dispatch is an exhaustive `match`.

use std::fmt;

use serde_json::Value;

use crate::ids::PeerId;

/// One event emitted by a transport handle, in arrival order.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    /// The open attempt succeeded; the session is usable.
    OpenSuccess,
    /// The open attempt failed before the session became usable.
    OpenFailure {
        /// Human-readable cause.
        message: String,
    },
    /// A transport-level error on an established (or establishing) session.
    Error {
        /// Human-readable cause.
        message: String,
    },
    /// The session closed.
    Closed {
        /// Who closed it and why.
        reason: CloseReason,
    },
    /// An inbound frame decoded from the server.
    Message(InboundMessage),
    /// Heartbeat acknowledgment (answer to a probe).
    Ack,
}

impl TransportEvent {
    /// Short kind name for logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OpenSuccess => "open_success",
            Self::OpenFailure { .. } => "open_failure",
            Self::Error { .. } => "error",
            Self::Closed { .. } => "closed",
            Self::Message(_) => "message",
            Self::Ack => "ack",
        }
    }
}

/// Why a session closed.
///
/// Only [`CloseReason::Remote`] is eligible for automatic reconnection; a
/// local close is the echo of our own teardown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// Closed by this client (explicit disconnect or handle replacement).
    Local,
    /// Closed by the server or lost to the network.
    Remote {
        /// WebSocket close code, if one was received.
        code: Option<u16>,
        /// Human-readable description.
        message: String,
    },
}

impl CloseReason {
    /// Convenience constructor for a remote close without a code.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            code: None,
            message: message.into(),
        }
    }

    /// Whether this close was initiated locally.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local)
    }

    /// Metric label for this reason.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote { .. } => "remote",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local disconnect"),
            Self::Remote {
                code: Some(code),
                message,
            } => write!(f, "{message} (code: {code})"),
            Self::Remote {
                code: None,
                message,
            } => f.write_str(message),
        }
    }
}

/// A decoded inbound application frame.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundMessage {
    /// Server-pushed presence roster; replaces the previous one wholesale.
    Roster(Vec<PeerId>),
    /// Any other named event, passed through to subscribers untouched.
    Application {
        /// Event name.
        event: String,
        /// Event payload.
        data: Value,
    },
}
