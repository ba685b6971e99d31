//! Client connection-lifecycle settings.

use chatlink_core::retry::RetryConfig;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Settings consumed by the connection manager.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// WebSocket endpoint of the relay server.
    pub server_url: String,
    /// Quiet period collapsing bursts of connect requests, in milliseconds.
    pub debounce_ms: u64,
    /// Upper bound on a single dial before it counts as an open failure.
    pub connect_timeout_ms: u64,
    /// Liveness probing.
    pub heartbeat: HeartbeatSettings,
    /// Reconnect backoff and attempt ceiling.
    pub reconnect: RetryConfig,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:5001/ws".to_string(),
            debounce_ms: 300,
            connect_timeout_ms: 10_000,
            heartbeat: HeartbeatSettings::default(),
            reconnect: RetryConfig::default(),
        }
    }
}

impl ClientSettings {
    /// Validate intervals and backoff bounds.
    pub fn validate(&self) -> Result<()> {
        if self.server_url.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "client.serverUrl must not be empty".into(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "client.connectTimeoutMs must be positive".into(),
            ));
        }
        self.heartbeat.validate()?;
        let reconnect = &self.reconnect;
        if reconnect.base_delay_ms == 0 || reconnect.max_delay_ms < reconnect.base_delay_ms {
            return Err(SettingsError::InvalidValue(format!(
                "client.reconnect needs 0 < baseDelayMs <= maxDelayMs (got {} / {})",
                reconnect.base_delay_ms, reconnect.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// Heartbeat probe timing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeartbeatSettings {
    /// Probe interval while the page is visible.
    pub interval_ms: u64,
    /// Probe interval while the page is hidden; at least twice `interval_ms`.
    pub background_interval_ms: u64,
    /// How long a probe may stay unacknowledged; shorter than `interval_ms`.
    pub ack_timeout_ms: u64,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            background_interval_ms: 60_000,
            ack_timeout_ms: 5_000,
        }
    }
}

impl HeartbeatSettings {
    /// Enforce `0 < ack < interval` and `background >= 2 * interval`.
    pub fn validate(&self) -> Result<()> {
        if self.ack_timeout_ms == 0 || self.ack_timeout_ms >= self.interval_ms {
            return Err(SettingsError::InvalidValue(format!(
                "heartbeat.ackTimeoutMs ({}) must be positive and below intervalMs ({})",
                self.ack_timeout_ms, self.interval_ms
            )));
        }
        if self.background_interval_ms < self.interval_ms.saturating_mul(2) {
            return Err(SettingsError::InvalidValue(format!(
                "heartbeat.backgroundIntervalMs ({}) must be at least twice intervalMs ({})",
                self.background_interval_ms, self.interval_ms
            )));
        }
        Ok(())
    }
}
