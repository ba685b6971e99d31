//! Server configuration.

use std::time::Duration;

use chatlink_settings::ServerSettings;

/// Configuration for the relay server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Interval between protocol-level Ping frames.
    pub heartbeat_interval: Duration,
    /// Drop a connection after this long without a Pong.
    pub heartbeat_timeout: Duration,
    /// Per-connection outbound queue depth.
    pub send_queue_capacity: usize,
}

impl ServerConfig {
    /// Consecutive missed Pongs tolerated before a connection is dropped.
    pub fn max_missed_pongs(&self) -> u32 {
        let interval = self.heartbeat_interval.as_millis().max(1);
        (self.heartbeat_timeout.as_millis() / interval).max(1) as u32
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            ..Self::from(&ServerSettings::default())
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            heartbeat_interval: Duration::from_millis(settings.heartbeat_interval_ms),
            heartbeat_timeout: Duration::from_millis(settings.heartbeat_timeout_ms),
            send_queue_capacity: settings.send_queue_capacity,
        }
    }
}
