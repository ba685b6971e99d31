//! Protocol-level Ping/Pong liveness monitoring.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::connection::ClientConnection;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The client stopped answering Pings.
    TimedOut,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// Ping a connection every `interval` until it goes quiet or `cancel` fires.
///
/// Each tick first checks whether anything arrived since the previous Ping,
/// then queues the next one. After `max_missed` consecutive silent ticks the
/// connection is considered dead.
pub async fn run_heartbeat(
    connection: Arc<ClientConnection>,
    interval: Duration,
    max_missed: u32,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let max_missed = max_missed.max(1);
    let mut missed: u32 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if connection.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    debug!(conn_id = %connection.id, missed, max_missed, "missed pong");
                    if missed >= max_missed {
                        return HeartbeatResult::TimedOut;
                    }
                }
                if connection.ping() {
                    trace!(conn_id = %connection.id, "sent ping");
                }
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}
