//! WebSocket connections, presence, liveness, and message dispatch.

pub mod connection;
pub mod handler;
pub mod heartbeat;
pub mod presence;
pub mod socket;
