//! Heartbeat controller: probe scheduling policy and the outstanding-probe record.
//!
//! The controller is a plain struct. The connection manager drives it from
//! timer expiries and transport acks and performs the I/O it asks for.
//!
//! Liveness check: a probe stamps `last_ping_sent_at`; any ack clears it.
//! When the ack window closes, a stamp that is still present means the
//! transport is dead. Which probe an ack answers is not tracked.

use std::time::Duration;

use chatlink_core::{ConnectionState, Visibility};
use tokio::time::Instant;

use crate::config::HeartbeatConfig;

/// What the manager should do on an interval tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Send a probe and arm the ack window.
    Probe,
    /// The transport is not connected; stop the heartbeat.
    Stop,
}

/// Heartbeat state owned by the connection manager.
#[derive(Debug)]
pub struct HeartbeatController {
    config: HeartbeatConfig,
    visibility: Visibility,
    running: bool,
    last_ping_sent_at: Option<Instant>,
}

impl HeartbeatController {
    /// Create a stopped controller in the foreground.
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            config,
            visibility: Visibility::Foreground,
            running: false,
            last_ping_sent_at: None,
        }
    }

    /// Probe interval for the current visibility.
    pub fn interval(&self) -> Duration {
        match self.visibility {
            Visibility::Foreground => self.config.foreground_interval,
            Visibility::Background => self.config.background_interval,
        }
    }

    /// Acknowledgment window after each probe.
    pub fn ack_timeout(&self) -> Duration {
        self.config.ack_timeout
    }

    /// Current host visibility.
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Record a visibility change. Returns `true` if the value changed.
    pub fn set_visibility(&mut self, visibility: Visibility) -> bool {
        let changed = self.visibility != visibility;
        self.visibility = visibility;
        changed
    }

    /// Start probing. Returns the interval to arm.
    pub fn start(&mut self) -> Duration {
        self.running = true;
        self.last_ping_sent_at = None;
        self.interval()
    }

    /// Stop probing and forget any outstanding probe.
    pub fn stop(&mut self) {
        self.running = false;
        self.last_ping_sent_at = None;
    }

    /// Whether the heartbeat is running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Interval tick. Stamps the probe time when a probe should go out.
    pub fn on_tick(&mut self, state: ConnectionState, now: Instant) -> TickOutcome {
        if !self.running || state != ConnectionState::Connected {
            self.stop();
            return TickOutcome::Stop;
        }
        self.last_ping_sent_at = Some(now);
        TickOutcome::Probe
    }

    /// An ack arrived. Returns the round trip if a probe was outstanding.
    pub fn on_ack(&mut self, now: Instant) -> Option<Duration> {
        self.last_ping_sent_at
            .take()
            .map(|sent| now.saturating_duration_since(sent))
    }

    /// Whether the last probe is still unacknowledged.
    pub fn is_awaiting_ack(&self) -> bool {
        self.running && self.last_ping_sent_at.is_some()
    }

    /// When the outstanding probe was sent, if any.
    pub fn last_ping_sent_at(&self) -> Option<Instant> {
        self.last_ping_sent_at
    }
}
