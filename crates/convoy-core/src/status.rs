//! Member status and convoy health derivation.
//!
//! Pure functions: no clock reads, no I/O. Callers pass `now` and the
//! liveness signal so results are deterministic.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Observable connectivity of a member.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    /// Live channel and recent location.
    Connected,
    /// Live channel but location updates are overdue.
    Lagging,
    /// Live channel, never sent a real location.
    Inactive,
    /// No live channel.
    Disconnected,
}

impl MemberStatus {
    /// Wire string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Lagging => "lagging",
            Self::Inactive => "inactive",
            Self::Disconnected => "disconnected",
        }
    }
}

/// Convoy-wide health bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvoyHealth {
    /// No members.
    Empty,
    /// Half or more of the convoy is disconnected.
    Critical,
    /// Significant degradation.
    Warning,
    /// Some member is not fully connected.
    Caution,
    /// Everyone connected.
    Healthy,
}

/// Tunable thresholds for [`derive_member_status`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusThresholds {
    /// Elapsed time since the last update after which a member is lagging.
    pub lag_after: TimeDelta,
}

impl StatusThresholds {
    /// Lagging once `update_interval * factor` has elapsed without an update.
    pub fn from_update_interval(update_interval: Duration, factor: u32) -> Self {
        let lag_after = update_interval
            .checked_mul(factor.max(1))
            .and_then(|d| TimeDelta::from_std(d).ok())
            .unwrap_or(TimeDelta::MAX);
        Self { lag_after }
    }
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self::from_update_interval(Duration::from_secs(5), 2)
    }
}

/// Raw signals for one member.
#[derive(Clone, Copy, Debug)]
pub struct MemberSignals {
    /// Time of the last accepted location write.
    pub last_update: DateTime<Utc>,
    /// Whether a real location was ever recorded.
    pub has_reported_location: bool,
    /// Whether the hub holds an open channel for this member.
    pub has_live_channel: bool,
}

/// Compute a member's status at `now`.
pub fn derive_member_status(
    now: DateTime<Utc>,
    signals: MemberSignals,
    thresholds: StatusThresholds,
) -> MemberStatus {
    if !signals.has_live_channel {
        return MemberStatus::Disconnected;
    }
    if now.signed_duration_since(signals.last_update) > thresholds.lag_after {
        return MemberStatus::Lagging;
    }
    if !signals.has_reported_location {
        return MemberStatus::Inactive;
    }
    MemberStatus::Connected
}

/// Histogram of member statuses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    /// Connected members.
    pub connected: usize,
    /// Lagging members.
    pub lagging: usize,
    /// Inactive members.
    pub inactive: usize,
    /// Disconnected members.
    pub disconnected: usize,
}

impl StatusCounts {
    /// Tally an iterator of statuses.
    pub fn tally(statuses: impl IntoIterator<Item = MemberStatus>) -> Self {
        statuses.into_iter().fold(Self::default(), |mut acc, s| {
            match s {
                MemberStatus::Connected => acc.connected += 1,
                MemberStatus::Lagging => acc.lagging += 1,
                MemberStatus::Inactive => acc.inactive += 1,
                MemberStatus::Disconnected => acc.disconnected += 1,
            }
            acc
        })
    }

    /// Total members counted.
    pub fn total(&self) -> usize {
        self.connected + self.lagging + self.inactive + self.disconnected
    }
}

/// Classify a convoy. Buckets overlap, so they are checked in order
/// critical → warning → caution → healthy and the first match wins.
#[allow(clippy::cast_precision_loss)]
pub fn derive_convoy_health(counts: &StatusCounts) -> ConvoyHealth {
    let total = counts.total();
    if total == 0 {
        return ConvoyHealth::Empty;
    }
    let ratio = |n: usize| n as f64 / total as f64;
    let disconnected = ratio(counts.disconnected);
    let lagging = ratio(counts.lagging);
    let inactive = ratio(counts.inactive);

    if disconnected >= 0.5 {
        ConvoyHealth::Critical
    } else if disconnected > 0.2 || lagging >= 0.5 || inactive >= 0.5 {
        ConvoyHealth::Warning
    } else if counts.disconnected + counts.lagging + counts.inactive > 0 {
        ConvoyHealth::Caution
    } else {
        ConvoyHealth::Healthy
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
