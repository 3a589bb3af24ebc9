//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Returns the handle used to render `/metrics`. Call once at startup,
/// before any metric is recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// A handle whose recorder is not installed globally. Renders nothing
/// recorded through the `metrics` macros.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

// Metric name constants to avoid typos across modules.

/// Convoys created (counter, labels: flow).
pub const CONVOY_CREATED_TOTAL: &str = "convoy_created_total";
/// Members joined (counter).
pub const MEMBER_JOINED_TOTAL: &str = "member_joined_total";
/// Members left (counter).
pub const MEMBER_LEFT_TOTAL: &str = "member_left_total";
/// Accepted location writes (counter, labels: via).
pub const LOCATION_UPDATES_TOTAL: &str = "location_updates_total";
/// WebSocket connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Open WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Channels closed because a push could not be queued (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Snapshots published (counter).
pub const BROADCASTS_TOTAL: &str = "broadcasts_total";
/// Unverified convoys deleted by the sweep (counter).
pub const VERIFICATIONS_REAPED_TOTAL: &str = "verifications_reaped_total";
/// Requests rejected by the rate limiter (counter, labels: scope).
pub const RATE_LIMITED_TOTAL: &str = "rate_limited_total";
