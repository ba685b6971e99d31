//! `ChatlinkServer`: Axum HTTP + WebSocket relay server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use chatlink_core::wire::IDENTITY_QUERY_PARAM;
use chatlink_core::{ConnectionId, PeerId};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics::{WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::connection::ClientConnection;
use crate::websocket::presence::PresenceRegistry;
use crate::websocket::socket::{Liveness, serve_connection};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Who is online.
    pub presence: Arc<PresenceRegistry>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The relay server.
pub struct ChatlinkServer {
    state: AppState,
}

impl ChatlinkServer {
    /// Create a new server.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            state: AppState {
                presence: Arc::new(PresenceRegistry::new()),
                shutdown: Arc::new(ShutdownCoordinator::new()),
                config: Arc::new(config),
                start_time: Instant::now(),
                metrics: None,
            },
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve in a background task.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task,
    /// which finishes once the shutdown coordinator is cancelled.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.state.config.host, self.state.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "chatlink server listening");

        let router = self.router();
        let token = self.state.shutdown.token();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server stopped with error");
            }
        });
        Ok((local_addr, handle))
    }

    /// Presence registry.
    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.state.presence
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }
}

#[derive(Debug, Deserialize)]
struct ConnectParams {
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

/// GET /ws?userId=<id>
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Response {
    let peer = params
        .user_id
        .map(PeerId::from)
        .filter(|peer| !peer.is_blank());
    let Some(peer) = peer else {
        warn!("websocket upgrade refused: no {IDENTITY_QUERY_PARAM}");
        return (StatusCode::UNAUTHORIZED, "missing userId").into_response();
    };
    if state.shutdown.is_shutting_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, peer, state))
}

/// Handle a new WebSocket connection.
async fn handle_socket(socket: WebSocket, peer: PeerId, state: AppState) {
    let (tx, rx) = mpsc::channel(state.config.send_queue_capacity.max(1));
    let connection = Arc::new(ClientConnection::new(ConnectionId::new(), peer, tx));
    info!(conn_id = %connection.id, peer = %connection.peer, "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);

    let _ = state.presence.join(connection.clone()).await;
    let liveness = Liveness {
        interval: state.config.heartbeat_interval,
        max_missed: state.config.max_missed_pongs(),
    };
    let reason = serve_connection(
        socket,
        connection.clone(),
        rx,
        state.presence.clone(),
        liveness,
        state.shutdown.token(),
    )
    .await;
    let _ = state.presence.leave(&connection.id).await;

    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
    info!(
        conn_id = %connection.id,
        peer = %connection.peer,
        reason = reason.as_str(),
        age_secs = connection.age().as_secs(),
        dropped = connection.drop_count(),
        "client disconnected"
    );
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.presence.connection_count().await;
    let online = state.presence.online_count().await;
    Json(health::health_check(state.start_time, connections, online))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
