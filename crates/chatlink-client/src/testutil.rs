//! Scripted transport for driving the manager from tests.
//!
//! Every `open` hands the test a [`ScriptedServer`] that plays the remote
//! side of that one handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chatlink_core::{CloseReason, InboundMessage, PeerId, TransportEvent};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::transport::{OpenRequest, Outbound, TransportFactory, TransportHandle, TransportPeer};

pub(crate) struct ScriptedFactory {
    opens: AtomicUsize,
    requests: Mutex<Vec<OpenRequest>>,
    tx: mpsc::UnboundedSender<ScriptedServer>,
}

impl ScriptedFactory {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ScriptedServer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let factory = Arc::new(Self {
            opens: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            tx,
        });
        (factory, rx)
    }

    pub(crate) fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<OpenRequest> {
        self.requests.lock().clone()
    }
}

impl TransportFactory for ScriptedFactory {
    fn open(&self, request: OpenRequest) -> TransportHandle {
        let _ = self.opens.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        let (handle, peer) = TransportHandle::pair();
        let _ = self.tx.send(ScriptedServer { request, peer });
        handle
    }
}

pub(crate) struct ScriptedServer {
    pub(crate) request: OpenRequest,
    peer: TransportPeer,
}

impl ScriptedServer {
    pub(crate) fn emit(&self, event: TransportEvent) {
        let _ = self.peer.emit(event);
    }

    pub(crate) fn open(&self) {
        self.emit(TransportEvent::OpenSuccess);
    }

    pub(crate) fn fail(&self, message: &str) {
        self.emit(TransportEvent::OpenFailure {
            message: message.into(),
        });
    }

    pub(crate) fn error(&self, message: &str) {
        self.emit(TransportEvent::Error {
            message: message.into(),
        });
    }

    pub(crate) fn close_remote(&self, message: &str) {
        self.emit(TransportEvent::Closed {
            reason: CloseReason::remote(message),
        });
    }

    pub(crate) fn ack(&self) {
        self.emit(TransportEvent::Ack);
    }

    pub(crate) fn roster(&self, ids: &[&str]) {
        let peers = ids.iter().map(|id| PeerId::from(*id)).collect();
        self.emit(TransportEvent::Message(InboundMessage::Roster(peers)));
    }

    /// Every frame the manager has queued so far.
    pub(crate) fn drain(&mut self) -> Vec<Outbound> {
        std::iter::from_fn(|| self.peer.try_outbound()).collect()
    }

    /// Wait for the next frame, failing the test after `within`.
    pub(crate) async fn expect_frame(&mut self, within: Duration) -> Outbound {
        tokio::time::timeout(within, self.peer.next_outbound())
            .await
            .expect("no outbound frame in time")
            .expect("sink dropped")
    }
}
