//! Explicit configuration handed to the connection manager.
//!
//! The manager never reads process-wide settings; callers build a
//! [`ClientConfig`] (usually from [`ClientSettings`]) and pass it in.

use std::time::Duration;

use chatlink_core::errors::{ChatlinkError, Result};
use chatlink_core::retry::RetryConfig;
use chatlink_settings::{ClientSettings, HeartbeatSettings};

/// Default capacity of the [`ClientEvent`](crate::ClientEvent) broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Heartbeat timing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Probe interval while the host page is visible.
    pub foreground_interval: Duration,
    /// Probe interval while the host page is hidden.
    pub background_interval: Duration,
    /// How long a probe may go unacknowledged.
    pub ack_timeout: Duration,
}

impl From<&HeartbeatSettings> for HeartbeatConfig {
    fn from(settings: &HeartbeatSettings) -> Self {
        Self {
            foreground_interval: Duration::from_millis(settings.interval_ms),
            background_interval: Duration::from_millis(settings.background_interval_ms),
            ack_timeout: Duration::from_millis(settings.ack_timeout_ms),
        }
    }
}

impl HeartbeatConfig {
    /// Enforce `0 < ack < foreground` and `background >= 2 * foreground`.
    pub fn validate(&self) -> Result<()> {
        if self.ack_timeout.is_zero() || self.ack_timeout >= self.foreground_interval {
            return Err(ChatlinkError::InvalidConfig(format!(
                "heartbeat ack timeout ({:?}) must be positive and below the interval ({:?})",
                self.ack_timeout, self.foreground_interval
            )));
        }
        if self.background_interval < self.foreground_interval.saturating_mul(2) {
            return Err(ChatlinkError::InvalidConfig(format!(
                "background heartbeat interval ({:?}) must be at least twice {:?}",
                self.background_interval, self.foreground_interval
            )));
        }
        Ok(())
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self::from(&HeartbeatSettings::default())
    }
}

/// Everything the connection manager needs to run.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// WebSocket endpoint; the identity is appended as a query parameter.
    pub server_url: String,
    /// Quiet period for collapsing connect requests.
    pub debounce: Duration,
    /// Bound on a single dial.
    pub connect_timeout: Duration,
    /// Liveness probing.
    pub heartbeat: HeartbeatConfig,
    /// Backoff and attempt ceiling.
    pub retry: RetryConfig,
    /// Buffered [`ClientEvent`](crate::ClientEvent)s per subscriber.
    pub event_capacity: usize,
}

impl From<&ClientSettings> for ClientConfig {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            server_url: settings.server_url.clone(),
            debounce: Duration::from_millis(settings.debounce_ms),
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            heartbeat: HeartbeatConfig::from(&settings.heartbeat),
            retry: settings.reconnect.clone(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Check the relations the manager's timers rely on.
    pub fn validate(&self) -> Result<()> {
        if self.server_url.trim().is_empty() {
            return Err(ChatlinkError::InvalidConfig(
                "server url must not be empty".into(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(ChatlinkError::InvalidConfig(
                "connect timeout must be positive".into(),
            ));
        }
        self.heartbeat.validate()?;
        let retry = &self.retry;
        if retry.base_delay_ms == 0 || retry.max_delay_ms < retry.base_delay_ms {
            return Err(ChatlinkError::InvalidConfig(format!(
                "retry needs 0 < base <= max (got {}ms / {}ms)",
                retry.base_delay_ms, retry.max_delay_ms
            )));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from(&ClientSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_match_settings() {
        let config = ClientConfig::default();
        assert_eq!(config.server_url, "ws://127.0.0.1:5001/ws");
        assert_eq!(config.debounce, Duration::from_millis(300));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.heartbeat.foreground_interval, Duration::from_secs(30));
        assert_eq!(config.heartbeat.background_interval, Duration::from_secs(60));
        assert_eq!(config.heartbeat.ack_timeout, Duration::from_secs(5));
        assert_eq!(config.retry.max_attempts, 10);
    }

    #[test]
    fn built_from_custom_settings() {
        let mut settings = ClientSettings::default();
        settings.debounce_ms = 25;
        settings.reconnect.base_delay_ms = 200;
        let config = ClientConfig::from(&settings);
        assert_eq!(config.debounce, Duration::from_millis(25));
        assert_eq!(config.retry.delay_for(1), Duration::from_millis(400));
    }

    #[test]
    fn defaults_are_valid() {
        ClientConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut config = ClientConfig::default();
        config.heartbeat.foreground_interval = Duration::ZERO;
        assert_matches!(config.validate(), Err(ChatlinkError::InvalidConfig(msg)) if msg.contains("ack timeout"));
    }

    #[test]
    fn ack_must_be_shorter_than_interval() {
        let mut config = ClientConfig::default();
        config.heartbeat.ack_timeout = config.heartbeat.foreground_interval;
        assert_matches!(config.validate(), Err(ChatlinkError::InvalidConfig(_)));
    }

    #[test]
    fn background_must_be_twice_foreground() {
        let mut config = ClientConfig::default();
        config.heartbeat.background_interval = Duration::from_secs(45);
        assert_matches!(config.validate(), Err(ChatlinkError::InvalidConfig(msg)) if msg.contains("background"));
    }

    #[test]
    fn retry_base_must_be_positive_and_below_max() {
        let mut config = ClientConfig::default();
        config.retry.base_delay_ms = 0;
        assert_matches!(config.validate(), Err(ChatlinkError::InvalidConfig(_)));

        config.retry.base_delay_ms = 5_000;
        config.retry.max_delay_ms = 1_000;
        assert_matches!(config.validate(), Err(ChatlinkError::InvalidConfig(msg)) if msg.contains("base <= max"));
    }

    #[test]
    fn blank_url_and_zero_dial_timeout_are_rejected() {
        let mut config = ClientConfig::default();
        config.server_url = " ".into();
        assert_matches!(config.validate(), Err(ChatlinkError::InvalidConfig(_)));

        let mut config = ClientConfig::default();
        config.connect_timeout = Duration::ZERO;
        assert_matches!(config.validate(), Err(ChatlinkError::InvalidConfig(_)));
    }
}
