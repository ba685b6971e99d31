//! Connection manager: the single task that owns every piece of lifecycle state.
//!
//! Commands from [`ConnectionClient`](crate::ConnectionClient), transport
//! events and timer expiries all arrive on channels and are handled one at
//! a time, each to completion. Nothing else mutates the state, so there is
//! at most one open attempt in flight.
//!
//! Each transport handle gets a session generation. Its events are forwarded
//! tagged with that generation, and the forwarder is aborted when the handle
//! is torn down; anything still queued from an older generation is dropped.

use std::sync::Arc;

use chatlink_core::errors::{ChatlinkError, Result};
use chatlink_core::{
    CloseReason, ConnectionState, IdentityToken, InboundMessage, PeerId, TransportEvent,
    Visibility,
};
use metrics::{counter, histogram};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::ClientConfig;
use crate::events::ClientEvent;
use crate::heartbeat::{HeartbeatController, TickOutcome};
use crate::metrics::{
    CONNECT_ATTEMPTS_TOTAL, CONNECT_DURATION_SECONDS, CONNECT_FAILURES_TOTAL,
    CONNECT_SUCCESS_TOTAL, DISCONNECTS_TOTAL, HEARTBEAT_TIMEOUTS_TOTAL, MESSAGES_RECEIVED_TOTAL,
    MESSAGES_SENT_TOTAL, RECONNECTS_SCHEDULED_TOTAL, RETRIES_EXHAUSTED_TOTAL,
};
use crate::presence::PresenceTracker;
use crate::reconnect::{ReconnectDecision, ReconnectScheduler};
use crate::status::{StatusPublisher, Transition};
use crate::timers::{TimerFired, TimerKind, TimerSlots};
use crate::transport::{OpenRequest, Outbound, TransportFactory, TransportSink};

// ─────────────────────────────────────────────────────────────────────────────
// Inputs
// ─────────────────────────────────────────────────────────────────────────────

/// Requests from the public handle.
#[derive(Debug)]
pub(crate) enum Command {
    Connect(IdentityToken),
    Disconnect,
    SetVisibility(Visibility),
    Send {
        event: String,
        data: Value,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// A transport event tagged with the session it came from.
#[derive(Debug)]
struct SessionEvent {
    generation: u64,
    event: TransportEvent,
}

struct Session {
    generation: u64,
    sink: TransportSink,
    forwarder: JoinHandle<()>,
    opened_at: Instant,
}

/// Read sides handed to the public handle.
pub(crate) struct Outputs {
    pub status: watch::Receiver<ConnectionState>,
    pub roster: watch::Receiver<Vec<PeerId>>,
    pub events: broadcast::Sender<ClientEvent>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Manager
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) struct ConnectionManager {
    config: ClientConfig,
    factory: Arc<dyn TransportFactory>,
    identity: Option<IdentityToken>,
    pending_identity: Option<IdentityToken>,
    session: Option<Session>,
    session_generation: u64,
    timers: TimerSlots,
    heartbeat: HeartbeatController,
    reconnect: ReconnectScheduler,
    status: StatusPublisher,
    presence: PresenceTracker,
    events: broadcast::Sender<ClientEvent>,
    session_tx: mpsc::UnboundedSender<SessionEvent>,
    session_rx: mpsc::UnboundedReceiver<SessionEvent>,
    timer_rx: mpsc::UnboundedReceiver<TimerFired>,
}

impl ConnectionManager {
    pub(crate) fn new(config: ClientConfig, factory: Arc<dyn TransportFactory>) -> (Self, Outputs) {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (session_tx, session_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let status = StatusPublisher::new();
        let presence = PresenceTracker::new();

        let outputs = Outputs {
            status: status.subscribe(),
            roster: presence.subscribe(),
            events: events.clone(),
        };
        let manager = Self {
            heartbeat: HeartbeatController::new(config.heartbeat.clone()),
            reconnect: ReconnectScheduler::new(config.retry.clone()),
            config,
            factory,
            identity: None,
            pending_identity: None,
            session: None,
            session_generation: 0,
            timers: TimerSlots::new(timer_tx),
            status,
            presence,
            events,
            session_tx,
            session_rx,
            timer_rx,
        };
        (manager, outputs)
    }

    /// Event loop. Returns after a shutdown command or once every handle is gone.
    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        debug!("connection manager started");
        loop {
            tokio::select! {
                biased;
                cmd = commands.recv() => match cmd {
                    Some(Command::Shutdown { done }) => {
                        self.disconnect();
                        let _ = done.send(());
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        self.disconnect();
                        break;
                    }
                },
                Some(event) = self.session_rx.recv() => self.handle_session_event(event),
                Some(fired) = self.timer_rx.recv() => self.handle_timer(fired),
            }
        }
        debug!("connection manager stopped");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect(identity) => self.request_connect(identity),
            Command::Disconnect => self.disconnect(),
            Command::SetVisibility(visibility) => self.set_visibility(visibility),
            Command::Send { event, data, reply } => {
                let _ = reply.send(self.send(event, data));
            }
            // Handled by the loop.
            Command::Shutdown { .. } => {}
        }
    }

    // ── Connect / disconnect ─────────────────────────────────────────────

    fn request_connect(&mut self, identity: IdentityToken) {
        debug!(
            debounce_ms = self.config.debounce.as_millis() as u64,
            "connect requested"
        );
        self.pending_identity = Some(identity);
        self.timers.arm_once(TimerKind::Debounce, self.config.debounce);
        // An explicit connect starts a fresh retry budget. The pending
        // reconnect must not fire with the old identity while debouncing.
        if !self.status.current().is_busy() {
            self.reconnect.reset();
            if self.timers.cancel(TimerKind::Reconnect) {
                debug!("pending reconnect superseded by explicit connect");
            }
        }
    }

    /// Debounce expired: the last requested identity wins.
    fn on_debounce(&mut self) {
        let Some(identity) = self.pending_identity.take() else {
            return;
        };
        let state = self.status.current();
        if state.is_busy() {
            debug!(state = %state, "connect ignored; session already open or opening");
            return;
        }
        self.reconnect.reset();
        self.identity = Some(identity);
        self.open_now();
    }

    fn open_now(&mut self) {
        let state = self.status.current();
        if state.is_busy() {
            debug!(state = %state, "open skipped; session already open or opening");
            return;
        }
        let Some(identity) = self.identity.clone() else {
            warn!("no identity available; refusing to open transport");
            return;
        };

        let _ = self.teardown_session();
        self.set_status(ConnectionState::Connecting);

        self.session_generation += 1;
        let generation = self.session_generation;
        let handle = self.factory.open(OpenRequest {
            identity,
            server_url: self.config.server_url.clone(),
            connect_timeout: self.config.connect_timeout,
        });
        let forwarder = spawn_forwarder(generation, handle.events, self.session_tx.clone());
        self.session = Some(Session {
            generation,
            sink: handle.sink,
            forwarder,
            opened_at: Instant::now(),
        });

        counter!(CONNECT_ATTEMPTS_TOTAL).increment(1);
        info!(
            generation,
            attempt = self.reconnect.attempts(),
            "opening transport"
        );
    }

    /// Explicit, local disconnect. Terminal until the next connect.
    fn disconnect(&mut self) {
        self.timers.cancel_all();
        self.pending_identity = None;
        self.heartbeat.stop();
        if self.teardown_session() {
            counter!(DISCONNECTS_TOTAL, "reason" => CloseReason::Local.label()).increment(1);
        }
        self.reconnect.reset();
        self.identity = None;
        if self.presence.clear() {
            let _ = self.events.send(ClientEvent::RosterUpdated(Vec::new()));
        }
        self.set_status(ConnectionState::Disconnected);
    }

    fn set_visibility(&mut self, visibility: Visibility) {
        if !self.heartbeat.set_visibility(visibility) {
            return;
        }
        debug!(visibility = %self.heartbeat.visibility(), "visibility changed");
        if self.heartbeat.is_running() {
            self.timers
                .arm_repeating(TimerKind::Heartbeat, self.heartbeat.interval());
        }
    }

    fn send(&mut self, event: String, data: Value) -> Result<()> {
        let state = self.status.current();
        let session = match (&self.session, state) {
            (Some(session), ConnectionState::Connected) => session,
            _ => return Err(ChatlinkError::NotConnected { state }),
        };
        session.sink.send(Outbound::Message { event, data })?;
        counter!(MESSAGES_SENT_TOTAL).increment(1);
        Ok(())
    }

    // ── Transport events ─────────────────────────────────────────────────

    fn handle_session_event(&mut self, SessionEvent { generation, event }: SessionEvent) {
        let current = self.session.as_ref().map(|s| s.generation);
        if current != Some(generation) {
            trace!(
                generation,
                current = self.session_generation,
                kind = event.kind(),
                "dropping event from replaced transport"
            );
            return;
        }
        trace!(generation, kind = event.kind(), "transport event");

        match event {
            TransportEvent::OpenSuccess => self.on_open_success(),
            TransportEvent::OpenFailure { message } => self.on_failure("open_failure", &message),
            TransportEvent::Error { message } => self.on_failure("error", &message),
            TransportEvent::Closed { reason } => self.on_closed(reason),
            TransportEvent::Message(InboundMessage::Roster(peers)) => self.on_roster(peers),
            TransportEvent::Message(InboundMessage::Application { event, data }) => {
                counter!(MESSAGES_RECEIVED_TOTAL).increment(1);
                let _ = self.events.send(ClientEvent::Message { event, data });
            }
            TransportEvent::Ack => self.on_ack(),
        }
    }

    fn on_open_success(&mut self) {
        if self.status.current() != ConnectionState::Connecting {
            debug!(state = %self.status.current(), "ignoring duplicate open success");
            return;
        }
        self.set_status(ConnectionState::Connected);
        self.reconnect.reset();
        let interval = self.heartbeat.start();
        self.timers.arm_repeating(TimerKind::Heartbeat, interval);

        counter!(CONNECT_SUCCESS_TOTAL).increment(1);
        if let Some(session) = &self.session {
            histogram!(CONNECT_DURATION_SECONDS).record(session.opened_at.elapsed().as_secs_f64());
        }
    }

    /// Open failure, transport error, or heartbeat timeout.
    fn on_failure(&mut self, kind: &'static str, message: &str) {
        warn!(kind, error = message, "transport failure");
        counter!(CONNECT_FAILURES_TOTAL, "kind" => kind).increment(1);
        self.stop_heartbeat();
        let _ = self.teardown_session();
        self.schedule_reconnect();
    }

    fn on_closed(&mut self, reason: CloseReason) {
        if reason.is_local() {
            debug!("local close acknowledged");
            return;
        }
        info!(reason = %reason, "transport closed by remote");
        counter!(DISCONNECTS_TOTAL, "reason" => reason.label()).increment(1);
        self.stop_heartbeat();
        let _ = self.teardown_session();
        self.set_status(ConnectionState::Disconnected);
        self.schedule_reconnect();
    }

    fn on_roster(&mut self, peers: Vec<PeerId>) {
        // Presence is independent of status; apply it whatever state we are in.
        if self.presence.replace(peers.clone()) {
            info!(peers = peers.len(), "roster updated");
            let _ = self.events.send(ClientEvent::RosterUpdated(peers));
        }
    }

    fn on_ack(&mut self) {
        if let Some(rtt) = self.heartbeat.on_ack(Instant::now()) {
            trace!(rtt_ms = rtt.as_millis() as u64, "heartbeat acknowledged");
        }
    }

    // ── Timers ───────────────────────────────────────────────────────────

    fn handle_timer(&mut self, fired: TimerFired) {
        if !self.timers.accept(fired) {
            return;
        }
        match fired.kind {
            TimerKind::Debounce => self.on_debounce(),
            TimerKind::Heartbeat => self.on_heartbeat_tick(),
            TimerKind::AckTimeout => self.on_ack_timeout(),
            TimerKind::Reconnect => self.on_reconnect_timer(),
        }
    }

    fn on_heartbeat_tick(&mut self) {
        match self.heartbeat.on_tick(self.status.current(), Instant::now()) {
            TickOutcome::Probe => {
                let sent = self
                    .session
                    .as_ref()
                    .map(|session| session.sink.send(Outbound::Probe));
                if let Some(Err(e)) = sent {
                    debug!(error = %e, "probe not sent; ack window will decide");
                }
                self.timers
                    .arm_once(TimerKind::AckTimeout, self.heartbeat.ack_timeout());
                debug!("heartbeat probe sent");
            }
            TickOutcome::Stop => {
                debug!(state = %self.status.current(), "heartbeat stopped; not connected");
                self.stop_heartbeat();
            }
        }
    }

    fn on_ack_timeout(&mut self) {
        if !self.heartbeat.is_awaiting_ack() {
            return;
        }
        warn!(
            ack_timeout_ms = self.heartbeat.ack_timeout().as_millis() as u64,
            "heartbeat timed out; forcing transport closed"
        );
        counter!(HEARTBEAT_TIMEOUTS_TOTAL).increment(1);
        self.on_failure("heartbeat_timeout", "no heartbeat acknowledgment");
    }

    fn on_reconnect_timer(&mut self) {
        let attempt = self.reconnect.on_timer_fired();
        debug!(attempt, "reconnect timer fired");
        self.open_now();
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn schedule_reconnect(&mut self) {
        match self.reconnect.schedule() {
            ReconnectDecision::Retry { attempt, delay } => {
                self.set_status(ConnectionState::Reconnecting);
                self.timers.arm_once(TimerKind::Reconnect, delay);
                counter!(RECONNECTS_SCHEDULED_TOTAL).increment(1);
                info!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "reconnect scheduled"
                );
            }
            ReconnectDecision::GiveUp { attempts } => {
                let _ = self.timers.cancel(TimerKind::Reconnect);
                self.set_status(ConnectionState::Disconnected);
                counter!(RETRIES_EXHAUSTED_TOTAL).increment(1);
                warn!(attempts, "reconnect attempts exhausted; giving up");
                let _ = self.events.send(ClientEvent::RetriesExhausted { attempts });
            }
        }
    }

    fn stop_heartbeat(&mut self) {
        self.heartbeat.stop();
        let _ = self.timers.cancel(TimerKind::Heartbeat);
        let _ = self.timers.cancel(TimerKind::AckTimeout);
    }

    /// Detach from and close the current handle. Returns whether one existed.
    fn teardown_session(&mut self) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        session.forwarder.abort();
        session.sink.close();
        trace!(generation = session.generation, "transport torn down");
        true
    }

    fn set_status(&mut self, next: ConnectionState) {
        if let Transition::Changed { from, to } = self.status.transition(next) {
            let _ = self.events.send(ClientEvent::StatusChanged { from, to });
        }
    }
}

fn spawn_forwarder(
    generation: u64,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    tx: mpsc::UnboundedSender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if tx.send(SessionEvent { generation, event }).is_err() {
                break;
            }
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use chatlink_core::ConnectionState::{Connected, Connecting, Disconnected, Reconnecting};
    use chatlink_core::logging::capture_logs;
    use chatlink_core::retry::RetryConfig;
    use proptest::prelude::*;
    use serde_json::json;
    use tokio::time::{sleep, timeout};
    use tracing::Level;

    use super::*;
    use crate::client::ConnectionClient;
    use crate::testutil::{ScriptedFactory, ScriptedServer};

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    /// Let every ready task run to idle (paused clock moves by 1ms).
    async fn settle() {
        sleep(ms(1)).await;
    }

    struct Harness {
        client: ConnectionClient,
        factory: Arc<ScriptedFactory>,
        opens: mpsc::UnboundedReceiver<ScriptedServer>,
        events: broadcast::Receiver<ClientEvent>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_config(ClientConfig::default())
        }

        fn with_retry(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
            Self::with_config(ClientConfig {
                retry: RetryConfig {
                    max_attempts,
                    base_delay_ms,
                    max_delay_ms,
                },
                ..ClientConfig::default()
            })
        }

        fn with_config(config: ClientConfig) -> Self {
            let (factory, opens) = ScriptedFactory::new();
            let client = ConnectionClient::spawn(config, factory.clone()).unwrap();
            let events = client.subscribe();
            Self {
                client,
                factory,
                opens,
                events,
            }
        }

        async fn next_open(&mut self) -> ScriptedServer {
            timeout(Duration::from_secs(600), self.opens.recv())
                .await
                .expect("no open attempt in time")
                .expect("factory dropped")
        }

        async fn connected(&mut self, identity: &str) -> ScriptedServer {
            self.client.connect(identity).unwrap();
            let server = self.next_open().await;
            server.open();
            settle().await;
            assert_eq!(self.client.status(), Connected);
            let _ = self.drain_events();
            server
        }

        fn drain_events(&mut self) -> Vec<ClientEvent> {
            std::iter::from_fn(|| self.events.try_recv().ok()).collect()
        }

        fn statuses(&mut self) -> Vec<(ConnectionState, ConnectionState)> {
            self.drain_events()
                .into_iter()
                .filter_map(|event| match event {
                    ClientEvent::StatusChanged { from, to } => Some((from, to)),
                    _ => None,
                })
                .collect()
        }
    }

    fn assert_waited(waited: Duration, expected_ms: u64) {
        assert!(
            waited >= ms(expected_ms) && waited < ms(expected_ms + 20),
            "expected ~{expected_ms}ms, waited {waited:?}"
        );
    }

    // ── Connect / debounce ──────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn connect_reaches_connected() {
        let mut h = Harness::new();
        h.client.connect("alice").unwrap();

        let server = h.next_open().await;
        assert_eq!(server.request.identity.as_str(), "alice");
        assert_eq!(server.request.server_url, "ws://127.0.0.1:5001/ws");
        assert_eq!(h.client.status(), Connecting);

        sleep(ms(50)).await;
        server.open();
        settle().await;

        assert_eq!(h.client.status(), Connected);
        assert_eq!(
            h.statuses(),
            [(Disconnected, Connecting), (Connecting, Connected)]
        );
        assert_eq!(h.factory.open_count(), 1);

        // A failure right away backs off by the base delay: the count is 0.
        server.error("reset by peer");
        let failed_at = Instant::now();
        let _ = h.next_open().await;
        assert_waited(failed_at.elapsed(), 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_connects_opens_once() {
        let mut h = Harness::new();
        let start = Instant::now();
        for _ in 0..5 {
            h.client.connect("alice").unwrap();
            sleep(ms(100)).await;
        }
        let _ = h.next_open().await;
        assert!(start.elapsed() >= ms(700));

        sleep(ms(1000)).await;
        assert_eq!(h.factory.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn last_identity_in_burst_wins() {
        let mut h = Harness::new();
        h.client.connect("alice").unwrap();
        h.client.connect("bob").unwrap();
        let server = h.next_open().await;
        assert_eq!(server.request.identity.as_str(), "bob");
        assert_eq!(h.factory.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn blank_identity_is_refused() {
        let h = Harness::new();
        assert_matches!(h.client.connect("  "), Err(ChatlinkError::MissingIdentity));
        sleep(ms(1000)).await;
        assert_eq!(h.factory.open_count(), 0);
        assert_eq!(h.client.status(), Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_while_connected_is_a_no_op() {
        let mut h = Harness::new();
        let _server = h.connected("alice").await;
        h.client.connect("alice").unwrap();
        sleep(ms(1000)).await;
        assert_eq!(h.factory.open_count(), 1);
        assert_eq!(h.client.status(), Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_while_opening_is_a_no_op() {
        let mut h = Harness::new();
        h.client.connect("alice").unwrap();
        let _server = h.next_open().await;
        h.client.connect("alice").unwrap();
        sleep(ms(1000)).await;
        assert_eq!(h.factory.open_count(), 1);
        assert_eq!(h.client.status(), Connecting);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn requests_within_window_open_once(gaps in prop::collection::vec(0u64..290, 1..12)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .start_paused(true)
                .build()
                .unwrap();
            let opens = rt.block_on(async move {
                let h = Harness::new();
                for gap in gaps {
                    h.client.connect("alice").unwrap();
                    sleep(ms(gap)).await;
                }
                sleep(ms(1000)).await;
                h.factory.open_count()
            });
            prop_assert_eq!(opens, 1);
        }
    }

    // ── Reconnect ───────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn three_failures_back_off_then_connect() {
        let mut h = Harness::new();
        h.client.connect("alice").unwrap();
        let mut server = h.next_open().await;

        for expected in [1000, 2000, 4000] {
            server.fail("connection refused");
            let failed_at = Instant::now();
            server = h.next_open().await;
            assert_waited(failed_at.elapsed(), expected);
        }
        server.open();
        settle().await;

        assert_eq!(h.client.status(), Connected);
        assert_eq!(
            h.statuses(),
            [
                (Disconnected, Connecting),
                (Connecting, Reconnecting),
                (Reconnecting, Connecting),
                (Connecting, Reconnecting),
                (Reconnecting, Connecting),
                (Connecting, Reconnecting),
                (Reconnecting, Connecting),
                (Connecting, Connected),
            ]
        );
        assert_eq!(h.factory.open_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_settle_disconnected() {
        let (logs, _guard) = capture_logs();
        let mut h = Harness::with_retry(2, 100, 400);
        h.client.connect("alice").unwrap();

        for _ in 0..3 {
            let server = h.next_open().await;
            server.fail("connection refused");
        }
        settle().await;

        assert_eq!(h.client.status(), Disconnected);
        let events = h.drain_events();
        assert!(events.contains(&ClientEvent::RetriesExhausted { attempts: 2 }));
        assert!(logs.has_event(Level::WARN, "attempts exhausted"));

        sleep(Duration::from_secs(120)).await;
        assert!(h.opens.try_recv().is_err());
        assert_eq!(h.factory.open_count(), 3);
        assert_eq!(h.client.status(), Disconnected);

        // Only an explicit connect resumes, with a fresh budget.
        h.client.connect("alice").unwrap();
        let server = h.next_open().await;
        server.fail("still down");
        let failed_at = Instant::now();
        let _ = h.next_open().await;
        assert_waited(failed_at.elapsed(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_connect_while_reconnecting_resets_budget() {
        let mut h = Harness::with_retry(5, 1000, 30_000);
        h.client.connect("alice").unwrap();
        let server = h.next_open().await;
        server.fail("refused");
        let server = h.next_open().await;
        server.fail("refused");
        settle().await;
        assert_eq!(h.client.status(), Reconnecting);

        // Pending backoff is 2s; the debounced connect preempts it.
        let requested_at = Instant::now();
        h.client.connect("alice").unwrap();
        let server = h.next_open().await;
        assert_waited(requested_at.elapsed(), 300);

        server.fail("refused");
        let failed_at = Instant::now();
        let _ = h.next_open().await;
        assert_waited(failed_at.elapsed(), 1000);
        assert_eq!(h.factory.open_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_during_backoff_supersedes_pending_retry() {
        let mut h = Harness::with_retry(5, 100, 1000);
        h.client.connect("alice").unwrap();
        let server = h.next_open().await;
        server.fail("refused");
        settle().await;
        assert_eq!(h.client.status(), Reconnecting);

        // The 100ms retry would land inside the 300ms debounce window.
        let requested_at = Instant::now();
        h.client.connect("bob").unwrap();
        let server = h.next_open().await;
        assert_eq!(server.request.identity.as_str(), "bob");
        assert_waited(requested_at.elapsed(), 300);
        assert_eq!(h.factory.open_count(), 2);

        server.fail("refused");
        let failed_at = Instant::now();
        let server = h.next_open().await;
        assert_eq!(server.request.identity.as_str(), "bob");
        assert_waited(failed_at.elapsed(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_close_reports_disconnected_then_reconnects() {
        let mut h = Harness::new();
        let server = h.connected("alice").await;

        server.close_remote("transport close");
        let closed_at = Instant::now();
        settle().await;
        assert_eq!(
            h.statuses(),
            [(Connected, Disconnected), (Disconnected, Reconnecting)]
        );

        let _ = h.next_open().await;
        assert_waited(closed_at.elapsed(), 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_while_reconnecting_cancels_retry() {
        let mut h = Harness::new();
        h.client.connect("alice").unwrap();
        let server = h.next_open().await;
        server.fail("refused");
        settle().await;
        assert_eq!(h.client.status(), Reconnecting);
        let _ = h.drain_events();

        h.client.disconnect().unwrap();
        settle().await;
        assert_eq!(h.client.status(), Disconnected);

        sleep(Duration::from_secs(120)).await;
        assert_eq!(h.factory.open_count(), 1);
        assert_eq!(h.statuses(), [(Reconnecting, Disconnected)]);
    }

    // ── Heartbeat ───────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn missed_ack_forces_one_close_and_reconnects() {
        let (logs, _guard) = capture_logs();
        let mut h = Harness::new();
        let mut server = h.connected("alice").await;

        let probe = server.expect_frame(ms(31_000)).await;
        assert_eq!(probe, Outbound::Probe);
        let probed_at = Instant::now();

        sleep(ms(5_500)).await;
        assert_eq!(server.drain(), [Outbound::Close]);
        assert_eq!(h.client.status(), Reconnecting);
        assert_eq!(h.statuses(), [(Connected, Reconnecting)]);
        assert!(logs.has_event(Level::WARN, "heartbeat timed out"));

        // First retry after a stable connection uses attempt 0.
        let _ = h.next_open().await;
        assert_waited(probed_at.elapsed(), 6000);
        assert!(server.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missed_ack_without_retry_budget_settles_disconnected() {
        let mut h = Harness::with_retry(0, 1000, 30_000);
        let mut server = h.connected("alice").await;

        let probe = server.expect_frame(ms(31_000)).await;
        assert_eq!(probe, Outbound::Probe);
        sleep(ms(5_500)).await;

        assert_eq!(server.drain(), [Outbound::Close]);
        assert_eq!(h.client.status(), Disconnected);
        let events = h.drain_events();
        assert!(events.contains(&ClientEvent::StatusChanged {
            from: Connected,
            to: Disconnected,
        }));
        assert!(events.contains(&ClientEvent::RetriesExhausted { attempts: 0 }));
        assert!(!events.iter().any(|e| matches!(
            e,
            ClientEvent::StatusChanged { to: Reconnecting, .. }
        )));

        sleep(Duration::from_secs(120)).await;
        assert_eq!(h.factory.open_count(), 1);
        assert_eq!(h.client.status(), Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn acked_probes_keep_connection() {
        let mut h = Harness::new();
        let mut server = h.connected("alice").await;

        for _ in 0..3 {
            let probe = server.expect_frame(ms(31_000)).await;
            assert_eq!(probe, Outbound::Probe);
            sleep(ms(20)).await;
            server.ack();
        }
        sleep(ms(10_000)).await;

        assert_eq!(h.client.status(), Connected);
        assert!(server.drain().is_empty());
        assert_eq!(h.factory.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn background_visibility_stretches_interval() {
        let mut h = Harness::new();
        let mut server = h.connected("alice").await;

        h.client.set_visibility(Visibility::Background).unwrap();
        sleep(ms(45_000)).await;
        assert!(server.drain().is_empty());

        let probe = server.expect_frame(ms(20_000)).await;
        assert_eq!(probe, Outbound::Probe);
    }

    #[tokio::test(start_paused = true)]
    async fn returning_to_foreground_rearms_short_interval() {
        let mut h = Harness::new();
        let mut server = h.connected("alice").await;

        h.client.set_visibility(Visibility::Background).unwrap();
        sleep(ms(20_000)).await;
        let flipped_at = Instant::now();
        h.client.set_visibility(Visibility::Foreground).unwrap();
        sleep(ms(29_000)).await;
        assert!(server.drain().is_empty());

        let probe = server.expect_frame(ms(2_000)).await;
        assert_eq!(probe, Outbound::Probe);
        assert_waited(flipped_at.elapsed(), 30_000);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_stops_after_disconnect() {
        let mut h = Harness::new();
        let mut server = h.connected("alice").await;
        h.client.disconnect().unwrap();
        settle().await;
        assert_eq!(server.drain(), [Outbound::Close]);

        sleep(Duration::from_secs(120)).await;
        assert!(server.drain().is_empty());
    }

    // ── Disconnect / stale handles ──────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn explicit_disconnect_is_terminal() {
        let mut h = Harness::new();
        let mut server = h.connected("alice").await;
        server.roster(&["alice", "bob"]);
        settle().await;
        assert_eq!(h.client.online_users().len(), 2);

        h.client.disconnect().unwrap();
        settle().await;
        assert_eq!(server.drain(), [Outbound::Close]);
        assert_eq!(h.client.status(), Disconnected);
        assert!(h.client.online_users().is_empty());

        // A late close from the old handle cannot revive anything.
        server.close_remote("gone");
        sleep(Duration::from_secs(120)).await;
        assert_eq!(h.factory.open_count(), 1);
        assert_eq!(h.client.status(), Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn replaced_handle_events_are_ignored() {
        let mut h = Harness::new();
        h.client.connect("alice").unwrap();
        let first = h.next_open().await;
        first.error("reset");
        let second = h.next_open().await;

        first.open();
        first.roster(&["ghost"]);
        settle().await;
        assert_eq!(h.client.status(), Connecting);
        assert!(h.client.online_users().is_empty());

        second.open();
        settle().await;
        assert_eq!(h.client.status(), Connected);
    }

    // ── Presence / messages ─────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn roster_applies_before_connected_and_redelivery_is_idempotent() {
        let mut h = Harness::new();
        h.client.connect("alice").unwrap();
        let server = h.next_open().await;

        server.roster(&["bob", "alice"]);
        settle().await;
        let expected: Vec<PeerId> = vec!["bob".into(), "alice".into()];
        assert_eq!(h.client.online_users(), expected);

        server.roster(&["bob", "alice"]);
        settle().await;
        assert_eq!(h.client.online_users(), expected);
        assert_eq!(*h.client.watch_roster().borrow(), expected);

        let updates = h
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, ClientEvent::RosterUpdated(_)))
            .count();
        assert_eq!(updates, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn send_requires_connected() {
        let mut h = Harness::new();
        assert_matches!(
            h.client.send("newGroupMessage", json!({})).await,
            Err(ChatlinkError::NotConnected {
                state: ConnectionState::Disconnected
            })
        );

        let mut server = h.connected("alice").await;
        h.client
            .send("newGroupMessage", json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(
            server.drain(),
            [Outbound::Message {
                event: "newGroupMessage".into(),
                data: json!({"text": "hi"}),
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_messages_are_passed_through() {
        let mut h = Harness::new();
        let server = h.connected("alice").await;
        server.emit(TransportEvent::Message(InboundMessage::Application {
            event: "newGroupMessage".into(),
            data: json!({"groupId": "g1"}),
        }));
        settle().await;
        assert_eq!(
            h.drain_events(),
            [ClientEvent::Message {
                event: "newGroupMessage".into(),
                data: json!({"groupId": "g1"}),
            }]
        );
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    #[tokio::test]
    async fn inconsistent_config_is_refused_at_spawn() {
        let (factory, _opens) = ScriptedFactory::new();
        let mut config = ClientConfig::default();
        config.heartbeat.foreground_interval = Duration::ZERO;

        let spawned = ConnectionClient::spawn(config, factory.clone());
        assert_matches!(spawned.err(), Some(ChatlinkError::InvalidConfig(_)));
        assert_eq!(factory.open_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_transport_and_stops() {
        let mut h = Harness::new();
        let mut server = h.connected("alice").await;
        h.client.shutdown().await;
        settle().await;

        assert_eq!(server.drain(), [Outbound::Close]);
        assert_eq!(h.client.status(), Disconnected);
        assert_matches!(h.client.connect("alice"), Err(ChatlinkError::ClientClosed));
    }
}
