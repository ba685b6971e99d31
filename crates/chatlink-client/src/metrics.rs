//! Metric names recorded by the connection manager.
//!
//! Recording goes through the `metrics` facade; without an installed
//! recorder every call is a no-op.

/// Open attempts started (counter).
pub const CONNECT_ATTEMPTS_TOTAL: &str = "chatlink_connect_attempts_total";
/// Open attempts that succeeded (counter).
pub const CONNECT_SUCCESS_TOTAL: &str = "chatlink_connect_success_total";
/// Open failures and transport errors (counter, labels: kind).
pub const CONNECT_FAILURES_TOTAL: &str = "chatlink_connect_failures_total";
/// Open request to open success (histogram, seconds).
pub const CONNECT_DURATION_SECONDS: &str = "chatlink_connect_duration_seconds";
/// Probes that went unacknowledged (counter).
pub const HEARTBEAT_TIMEOUTS_TOTAL: &str = "chatlink_heartbeat_timeouts_total";
/// Reconnect timers armed (counter).
pub const RECONNECTS_SCHEDULED_TOTAL: &str = "chatlink_reconnects_scheduled_total";
/// Times the attempt ceiling was reached (counter).
pub const RETRIES_EXHAUSTED_TOTAL: &str = "chatlink_retries_exhausted_total";
/// Session ends (counter, labels: reason).
pub const DISCONNECTS_TOTAL: &str = "chatlink_disconnects_total";
/// Outbound application messages (counter).
pub const MESSAGES_SENT_TOTAL: &str = "chatlink_messages_sent_total";
/// Inbound application messages (counter).
pub const MESSAGES_RECEIVED_TOTAL: &str = "chatlink_messages_received_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_are_prefixed_snake_case() {
        let names = [
            CONNECT_ATTEMPTS_TOTAL,
            CONNECT_SUCCESS_TOTAL,
            CONNECT_FAILURES_TOTAL,
            CONNECT_DURATION_SECONDS,
            HEARTBEAT_TIMEOUTS_TOTAL,
            RECONNECTS_SCHEDULED_TOTAL,
            RETRIES_EXHAUSTED_TOTAL,
            DISCONNECTS_TOTAL,
            MESSAGES_SENT_TOTAL,
            MESSAGES_RECEIVED_TOTAL,
        ];
        for name in names {
            assert!(name.starts_with("chatlink_"), "{name}");
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
