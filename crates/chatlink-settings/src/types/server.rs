//! Relay server and logging settings.

use chatlink_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Relay server network and liveness settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` to auto-assign).
    pub port: u16,
    /// Interval between protocol-level Ping frames, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Drop a connection after this long without a Pong, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Per-connection outbound queue depth.
    pub send_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5001,
            heartbeat_interval_ms: 25_000,
            heartbeat_timeout_ms: 75_000,
            send_queue_capacity: 256,
        }
    }
}

impl ServerSettings {
    /// Validate liveness timing and queue size.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_ms == 0 || self.heartbeat_timeout_ms < self.heartbeat_interval_ms
        {
            return Err(SettingsError::InvalidValue(format!(
                "server heartbeat needs 0 < heartbeatIntervalMs <= heartbeatTimeoutMs (got {} / {})",
                self.heartbeat_interval_ms, self.heartbeat_timeout_ms
            )));
        }
        if self.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueCapacity must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level or `EnvFilter` directive.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
