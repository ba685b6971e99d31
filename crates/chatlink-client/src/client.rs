//! Public handle to a running connection manager.

use std::sync::Arc;

use chatlink_core::errors::{ChatlinkError, Result};
use chatlink_core::{ConnectionState, IdentityToken, PeerId, Visibility};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::config::ClientConfig;
use crate::events::ClientEvent;
use crate::manager::{Command, ConnectionManager};
use crate::transport::TransportFactory;

/// Cheap, non-blocking entry points into the connection lifecycle.
///
/// Every call returns immediately; effects land asynchronously and show up
/// through [`status`](Self::status), [`online_users`](Self::online_users)
/// and [`subscribe`](Self::subscribe). Dropping the last handle stops the
/// manager after an implicit disconnect.
pub struct ConnectionClient {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ConnectionState>,
    roster: watch::Receiver<Vec<PeerId>>,
    events: broadcast::Sender<ClientEvent>,
}

impl ConnectionClient {
    /// Spawn the manager task on the current tokio runtime.
    ///
    /// Fails with [`ChatlinkError::InvalidConfig`] before anything is spawned
    /// if the heartbeat or retry timings are inconsistent.
    pub fn spawn(config: ClientConfig, factory: Arc<dyn TransportFactory>) -> Result<Self> {
        config.validate()?;
        let (manager, outputs) = ConnectionManager::new(config, factory);
        let (commands, command_rx) = mpsc::unbounded_channel();
        drop(tokio::spawn(manager.run(command_rx)));
        Ok(Self {
            commands,
            status: outputs.status,
            roster: outputs.roster,
            events: outputs.events,
        })
    }

    /// Ask for a connection bound to `identity` (debounced).
    ///
    /// A blank identity is refused. While reconnecting or after retries ran
    /// out, this also resets the retry budget.
    pub fn connect(&self, identity: impl Into<IdentityToken>) -> Result<()> {
        let identity = identity.into();
        if identity.is_blank() {
            return Err(ChatlinkError::MissingIdentity);
        }
        self.command(Command::Connect(identity))
    }

    /// Explicit disconnect. Never followed by an automatic reconnect.
    pub fn disconnect(&self) -> Result<()> {
        self.command(Command::Disconnect)
    }

    /// Report host visibility; the heartbeat interval follows it.
    pub fn set_visibility(&self, visibility: Visibility) -> Result<()> {
        self.command(Command::SetVisibility(visibility))
    }

    /// Send an application message. Fails unless the status is `connected`.
    pub async fn send(&self, event: impl Into<String>, data: Value) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Send {
            event: event.into(),
            data,
            reply,
        })?;
        rx.await.map_err(|_| ChatlinkError::ClientClosed)?
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionState {
        *self.status.borrow()
    }

    /// Receiver for status changes.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionState> {
        self.status.clone()
    }

    /// Current presence roster.
    pub fn online_users(&self) -> Vec<PeerId> {
        self.roster.borrow().clone()
    }

    /// Receiver for roster changes.
    pub fn watch_roster(&self) -> watch::Receiver<Vec<PeerId>> {
        self.roster.clone()
    }

    /// Subscribe to status, roster, exhaustion and message notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Disconnect and stop the manager task, waiting for it to finish.
    pub async fn shutdown(&self) {
        let (done, rx) = oneshot::channel();
        if self.command(Command::Shutdown { done }).is_ok() {
            let _ = rx.await;
        }
    }

    fn command(&self, cmd: Command) -> Result<()> {
        self.commands
            .send(cmd)
            .map_err(|_| ChatlinkError::ClientClosed)
    }
}
