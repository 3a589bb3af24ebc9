//! `/health` endpoint body.

use std::time::Instant;

use convoy_store::StoreStats;
use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `"ok"`, or `"draining"` once shutdown has begun.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open channels.
    pub connections: usize,
    /// Convoys held in memory.
    pub convoys: usize,
    /// Served convoys with members.
    pub active_convoys: usize,
    /// Unredeemed verification records.
    pub pending_verifications: usize,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    connections: usize,
    stats: StoreStats,
    draining: bool,
) -> HealthResponse {
    HealthResponse {
        status: if draining { "draining" } else { "ok" },
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        convoys: stats.convoys,
        active_convoys: stats.active_convoys,
        pending_verifications: stats.pending_verifications,
    }
}
