//! Error hierarchy for chatlink.
//!
//! Transport failures are not errors at this level: they are reported as
//! [`TransportEvent`](crate::events::TransportEvent)s and folded into state
//! transitions. [`ChatlinkError`] only covers what an imperative caller can
//! get back synchronously.

use thiserror::Error;

use crate::state::ConnectionState;

/// Errors returned by chatlink's public entry points.
#[derive(Debug, Error)]
pub enum ChatlinkError {
    /// `connect` was called without a usable identity.
    #[error("no identity available; refusing to connect")]
    MissingIdentity,

    /// An outbound message was attempted while the transport is not open.
    #[error("not connected (status: {state})")]
    NotConnected {
        /// Status at the time of the attempt.
        state: ConnectionState,
    },

    /// The connection manager task has stopped.
    #[error("connection manager is no longer running")]
    ClientClosed,

    /// The transport refused an outbound frame.
    #[error("transport error: {0}")]
    Transport(String),

    /// A frame could not be encoded or decoded.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Client timing or retry configuration is inconsistent.
    #[error("invalid client config: {0}")]
    InvalidConfig(String),
}

/// Result type for chatlink operations.
pub type Result<T> = std::result::Result<T, ChatlinkError>;
