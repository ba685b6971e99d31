//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// Call once at startup, before anything is recorded. Client-side metrics
/// recorded in the same process land in the same registry.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// WebSocket connections accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "chatlink_ws_connections_total";
/// WebSocket connections closed (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "chatlink_ws_disconnections_total";
/// Live WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "chatlink_ws_connections_active";
/// Frames dropped because a connection's send queue was full (counter).
pub const WS_SEND_DROPS_TOTAL: &str = "chatlink_ws_send_drops_total";
/// Distinct users online (gauge).
pub const ONLINE_USERS: &str = "chatlink_online_users";
/// Application events relayed to other peers (counter).
pub const RELAYED_MESSAGES_TOTAL: &str = "chatlink_relayed_messages_total";
