//! Live-channel presence seam.

use convoy_core::{ConvoyId, MemberId};

/// Answers whether a member currently holds an open channel.
///
/// The store calls this while holding its own lock, so implementations must
/// never call back into the store.
pub trait PresenceProbe: Send + Sync {
    /// Whether `member_id` has at least one open channel in `convoy_id`.
    fn has_active_connection(&self, convoy_id: &ConvoyId, member_id: MemberId) -> bool;
}

/// A probe that reports nobody as connected.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPresence;

impl PresenceProbe for NoPresence {
    fn has_active_connection(&self, _convoy_id: &ConvoyId, _member_id: MemberId) -> bool {
        false
    }
}
