//! # chatlink-core
//!
//! Foundation types shared by the chatlink client, relay server, and binary.
//!
//! - **Branded IDs**: `IdentityToken`, `PeerId`, `ConnectionId` as newtypes for type safety
//! - **Connection state**: [`ConnectionState`] and its legal transition table
//! - **Transport events**: the closed [`TransportEvent`] union every transport emits
//! - **Wire envelope**: the `{"event", "data"}` JSON frame spoken by client and server
//! - **Retry**: exponential backoff math for the reconnect scheduler
//! - **Errors**: [`ChatlinkError`] via `thiserror`
//! - **Logging**: `tracing` subscriber setup and test capture utilities

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod retry;
pub mod state;
pub mod wire;

pub use errors::{ChatlinkError, Result};
pub use events::{CloseReason, InboundMessage, TransportEvent};
pub use ids::{ConnectionId, IdentityToken, PeerId};
pub use state::{ConnectionState, Visibility};
