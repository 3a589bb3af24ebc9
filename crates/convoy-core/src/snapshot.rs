//! Snapshot wire types pushed to clients.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ids::ConvoyId;
use crate::model::{Convoy, Destination, Member};
use crate::status::{ConvoyHealth, StatusCounts, derive_convoy_health};

/// Envelope `type` tag for snapshots.
pub const SNAPSHOT_EVENT: &str = "convoy.snapshot";

/// Full client-visible state of one convoy.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvoySnapshot {
    /// Convoy ID.
    pub id: ConvoyId,
    /// Members in join order with derived statuses.
    pub members: Vec<Member>,
    /// Current destination, `null` when unset.
    pub destination: Option<Destination>,
    /// Convoy-wide health.
    pub health: ConvoyHealth,
    /// Status histogram behind `health`.
    pub status_counts: StatusCounts,
    /// Whether the convoy has been verified.
    pub is_verified: bool,
    /// Monotonic state revision.
    pub revision: u64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl ConvoySnapshot {
    /// Build from a convoy whose member statuses are already derived.
    pub fn from_convoy(convoy: &Convoy) -> Self {
        let status_counts = StatusCounts::tally(convoy.members.iter().map(|m| m.status));
        Self {
            id: convoy.id.clone(),
            members: convoy.members.clone(),
            destination: convoy.destination.clone(),
            health: derive_convoy_health(&status_counts),
            status_counts,
            is_verified: convoy.is_verified,
            revision: convoy.revision,
            created_at: convoy.created_at,
        }
    }
}

/// `{"type": "...", "timestamp": ..., "data": ...}` frame.
#[derive(Clone, Debug, Serialize)]
pub struct Envelope<T> {
    /// Event tag.
    #[serde(rename = "type")]
    pub event_type: &'static str,
    /// Server time the frame was built.
    pub timestamp: DateTime<Utc>,
    /// Payload.
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    /// Wrap a payload.
    pub fn new(event_type: &'static str, data: T) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            data,
        }
    }

    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Envelope<ConvoySnapshot> {
    /// Snapshot frame.
    pub fn snapshot(snapshot: ConvoySnapshot) -> Self {
        Self::new(SNAPSHOT_EVENT, snapshot)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
