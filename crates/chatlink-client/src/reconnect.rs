//! Reconnect scheduler: attempt counting and backoff decisions.

use std::time::Duration;

use chatlink_core::retry::RetryConfig;

/// Outcome of asking the scheduler for the next retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Wait `delay`, then reopen.
    Retry {
        /// Zero-based index of the attempt being scheduled.
        attempt: u32,
        /// Backoff before reopening.
        delay: Duration,
    },
    /// The attempt ceiling is reached; stop until the next explicit connect.
    GiveUp {
        /// Attempts made before giving up.
        attempts: u32,
    },
}

/// Owns `attempt_count` for the current run of failures.
#[derive(Debug)]
pub struct ReconnectScheduler {
    config: RetryConfig,
    attempts: u32,
}

impl ReconnectScheduler {
    /// Create a scheduler with no attempts recorded.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Attempts scheduled since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Decide what follows a failure.
    ///
    /// The delay is `min(base * 2^attempts, max)`; the count only moves when
    /// the reconnect timer actually fires.
    pub fn schedule(&self) -> ReconnectDecision {
        if self.config.is_exhausted(self.attempts) {
            ReconnectDecision::GiveUp {
                attempts: self.attempts,
            }
        } else {
            ReconnectDecision::Retry {
                attempt: self.attempts,
                delay: self.config.delay_for(self.attempts),
            }
        }
    }

    /// The reconnect timer fired; count the attempt about to be made.
    pub fn on_timer_fired(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    /// Forget all attempts (successful open or explicit connect/disconnect).
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
