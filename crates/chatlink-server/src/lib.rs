//! # chatlink-server
//!
//! Presence relay server the chatlink client connects to.
//!
//! - `WebSocket` gateway at `/ws?userId=<id>`: app-level `ping` → `pong`,
//!   roster push on join/leave, relay of every other event to the other peers
//! - Protocol-level liveness: Ping frames on an interval, drop after missed Pongs
//! - HTTP endpoints: `/health`, `/metrics` (Prometheus text)
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::ChatlinkServer;
