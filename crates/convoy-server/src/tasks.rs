//! Periodic background loops: status refresh and verification expiry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use convoy_store::ConvoyStore;
use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::metrics::VERIFICATIONS_REAPED_TOTAL;
use crate::rate_limit::RateLimiter;
use crate::websocket::RealtimeHub;

/// What one expiry sweep did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Pending convoys deleted.
    pub reaped: usize,
    /// Channels closed because their convoy was reaped.
    pub closed_channels: usize,
    /// Limiter windows dropped.
    pub pruned_windows: usize,
}

/// Re-derive statuses for every convoy with channels and push the ones
/// that changed. Returns the number of frames delivered.
pub fn refresh_once(store: &ConvoyStore, hub: &RealtimeHub) -> usize {
    hub.convoy_ids()
        .iter()
        .map(|convoy_id| hub.refresh(store, convoy_id))
        .sum()
}

/// Reap expired pending convoys, close their channels, and prune elapsed
/// limiter windows.
pub fn sweep_once(store: &ConvoyStore, hub: &RealtimeHub, limiter: &RateLimiter) -> SweepReport {
    let cleanup = store.cleanup_expired_verifications();
    let mut report = SweepReport {
        reaped: cleanup.reaped.len(),
        ..SweepReport::default()
    };
    for convoy_id in &cleanup.reaped {
        report.closed_channels += hub.close_convoy(convoy_id);
    }
    report.pruned_windows = limiter.prune(Instant::now());

    if report.reaped > 0 {
        counter!(VERIFICATIONS_REAPED_TOTAL).increment(report.reaped as u64);
        info!(
            reaped = report.reaped,
            closed_channels = report.closed_channels,
            orphaned_records = cleanup.orphaned_records,
            "expired verifications reaped"
        );
    } else {
        debug!(
            orphaned_records = cleanup.orphaned_records,
            pruned_windows = report.pruned_windows,
            "expiry sweep found nothing to reap"
        );
    }
    report
}

/// Spawn the status refresh loop. Stops when `cancel` fires.
pub fn spawn_status_refresh(
    store: Arc<ConvoyStore>,
    hub: Arc<RealtimeHub>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let delivered = refresh_once(&store, &hub);
                    if delivered > 0 {
                        debug!(delivered, "status refresh pushed snapshots");
                    }
                }
                () = cancel.cancelled() => break,
            }
        }
        debug!("status refresh stopped");
    })
}

/// Spawn the verification expiry sweep. Stops when `cancel` fires.
pub fn spawn_expiry_sweep(
    store: Arc<ConvoyStore>,
    hub: Arc<RealtimeHub>,
    limiter: Arc<RateLimiter>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = sweep_once(&store, &hub, &limiter);
                }
                () = cancel.cancelled() => break,
            }
        }
        debug!("expiry sweep stopped");
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
