//! Named, generation-checked timer slots.
//!
//! Each [`TimerKind`] owns at most one live tokio task. Arming a slot aborts
//! whatever was there and bumps the slot's generation; the task reports back
//! through a channel as a [`TimerFired`] stamped with the generation it was
//! armed under. [`TimerSlots::accept`] drops anything stamped with an older
//! generation, so a fire that raced a cancel can never act.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::trace;

/// The four timers the connection manager owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Collapses bursts of connect requests.
    Debounce,
    /// Repeating heartbeat probe tick.
    Heartbeat,
    /// Single-shot check after each probe.
    AckTimeout,
    /// Backoff wait before the next open attempt.
    Reconnect,
}

impl TimerKind {
    const ALL: [Self; 4] = [
        Self::Debounce,
        Self::Heartbeat,
        Self::AckTimeout,
        Self::Reconnect,
    ];

    fn index(self) -> usize {
        match self {
            Self::Debounce => 0,
            Self::Heartbeat => 1,
            Self::AckTimeout => 2,
            Self::Reconnect => 3,
        }
    }

    /// Short name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debounce => "debounce",
            Self::Heartbeat => "heartbeat",
            Self::AckTimeout => "ack_timeout",
            Self::Reconnect => "reconnect",
        }
    }
}

/// A timer expiry, delivered to the owner's event loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerFired {
    /// Which slot fired.
    pub kind: TimerKind,
    /// Slot generation at arming time.
    pub generation: u64,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    repeating: bool,
    task: Option<JoinHandle<()>>,
}

impl Slot {
    fn cancel(&mut self) -> bool {
        self.generation += 1;
        match self.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

/// Owner of every pending timer.
pub struct TimerSlots {
    tx: mpsc::UnboundedSender<TimerFired>,
    slots: [Slot; 4],
}

impl TimerSlots {
    /// Create empty slots that report expiries on `tx`.
    pub fn new(tx: mpsc::UnboundedSender<TimerFired>) -> Self {
        Self {
            tx,
            slots: Default::default(),
        }
    }

    /// Arm a single-shot timer, replacing any timer in the same slot.
    pub fn arm_once(&mut self, kind: TimerKind, delay: Duration) {
        let generation = self.rearm(kind, false);
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = tx.send(TimerFired { kind, generation });
        });
        self.slots[kind.index()].task = Some(task);
        trace!(timer = kind.as_str(), generation, delay_ms = delay.as_millis() as u64, "timer armed");
    }

    /// Arm a repeating timer whose first expiry is one `period` from now.
    pub fn arm_repeating(&mut self, kind: TimerKind, period: Duration) {
        let generation = self.rearm(kind, true);
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                let _ = ticker.tick().await;
                if tx.send(TimerFired { kind, generation }).is_err() {
                    break;
                }
            }
        });
        self.slots[kind.index()].task = Some(task);
        trace!(timer = kind.as_str(), generation, period_ms = period.as_millis() as u64, "repeating timer armed");
    }

    /// Cancel the timer in `kind`'s slot. Returns whether one was live.
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        let was_armed = self.slots[kind.index()].cancel();
        if was_armed {
            trace!(timer = kind.as_str(), "timer cancelled");
        }
        was_armed
    }

    /// Cancel every slot.
    pub fn cancel_all(&mut self) {
        for kind in TimerKind::ALL {
            let _ = self.cancel(kind);
        }
    }

    /// Whether `kind`'s slot currently holds a live timer.
    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.slots[kind.index()].task.is_some()
    }

    /// Decide whether a delivered expiry is still current.
    ///
    /// A current single-shot fire empties its slot.
    pub fn accept(&mut self, fired: TimerFired) -> bool {
        let slot = &mut self.slots[fired.kind.index()];
        if slot.generation != fired.generation || slot.task.is_none() {
            trace!(
                timer = fired.kind.as_str(),
                generation = fired.generation,
                current = slot.generation,
                "dropping stale timer"
            );
            return false;
        }
        if !slot.repeating {
            slot.task = None;
        }
        true
    }

    fn rearm(&mut self, kind: TimerKind, repeating: bool) -> u64 {
        let slot = &mut self.slots[kind.index()];
        let _ = slot.cancel();
        slot.repeating = repeating;
        slot.generation
    }
}

impl Drop for TimerSlots {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
