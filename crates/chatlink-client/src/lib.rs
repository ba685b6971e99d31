//! # chatlink-client
//!
//! Keeps one persistent messaging channel to the relay server alive and
//! reports on it truthfully.
//!
//! - **Connection manager**: a single tokio task owning the transport handle,
//!   debouncing connect requests and wiring the pieces below together
//! - **Heartbeat**: probes on an interval that follows host visibility and
//!   declares the transport dead after one missed ack window
//! - **Reconnect**: `min(base * 2^n, max)` backoff with an attempt ceiling
//! - **Presence**: the latest server-pushed roster, replaced wholesale
//! - **Status**: one observable [`ConnectionState`](chatlink_core::ConnectionState)
//!
//! Collaborators talk to it through [`ConnectionClient`].

#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod events;
pub mod heartbeat;
mod manager;
pub mod metrics;
pub mod presence;
pub mod reconnect;
pub mod status;
pub mod timers;
pub mod transport;

#[cfg(test)]
mod testutil;

pub use client::ConnectionClient;
pub use config::{ClientConfig, HeartbeatConfig};
pub use events::ClientEvent;
pub use transport::{
    OpenRequest, Outbound, TransportFactory, TransportHandle, TransportPeer, TransportSink,
    WebSocketTransport,
};
