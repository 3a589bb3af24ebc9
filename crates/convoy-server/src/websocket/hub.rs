//! Realtime hub: the channel registry and snapshot fan-out.
//!
//! The hub never calls into the store while holding its own lock, so the
//! store may consult [`RealtimeHub::has_active_connection`] from inside its
//! critical section.

use std::collections::HashMap;
use std::sync::Arc;

use convoy_core::{ConvoyError, ConvoyId, ConvoySnapshot, Envelope, MemberId};
use convoy_store::{ConvoyStore, PresenceProbe};
use metrics::counter;
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::connection::ClientConnection;
use crate::metrics::{BROADCASTS_TOTAL, WS_BROADCAST_DROPS_TOTAL};

/// How a snapshot competes with ones already delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishMode {
    /// Follows a mutation. Delivered unless an older revision than the last
    /// delivered one.
    Mutation,
    /// Periodic status refresh. Delivered only if strictly newer.
    Refresh,
}

#[derive(Default)]
struct ConvoyChannels {
    connections: HashMap<String, Arc<ClientConnection>>,
    live_members: HashMap<MemberId, usize>,
    last_revision: u64,
}

impl ConvoyChannels {
    fn insert(&mut self, conn: Arc<ClientConnection>) {
        if let Some(member_id) = conn.member_id {
            *self.live_members.entry(member_id).or_insert(0) += 1;
        }
        let _ = self.connections.insert(conn.id.clone(), conn);
    }

    fn remove(&mut self, conn_id: &str) -> Option<Arc<ClientConnection>> {
        let conn = self.connections.remove(conn_id)?;
        if let Some(member_id) = conn.member_id {
            if let Some(count) = self.live_members.get_mut(&member_id) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    let _ = self.live_members.remove(&member_id);
                }
            }
        }
        Some(conn)
    }
}

/// Registry of open channels grouped by convoy.
#[derive(Default)]
pub struct RealtimeHub {
    registry: RwLock<HashMap<ConvoyId, ConvoyChannels>>,
}

impl RealtimeHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `conn` and start delivering its convoy's broadcasts to it.
    /// Returns `false` if the channel was already closed.
    pub fn register(&self, conn: Arc<ClientConnection>) -> bool {
        if !conn.open() {
            return false;
        }
        let convoy_id = conn.convoy_id.clone();
        self.registry
            .write()
            .entry(convoy_id)
            .or_default()
            .insert(conn);
        true
    }

    /// Remove `conn` from the registry. Returns `false` if it was not
    /// registered (already dropped by a failed push or a teardown).
    pub fn unregister(&self, conn: &ClientConnection) -> bool {
        let mut registry = self.registry.write();
        let Some(channels) = registry.get_mut(&conn.convoy_id) else {
            return false;
        };
        let removed = channels.remove(&conn.id).is_some();
        if channels.connections.is_empty() {
            let _ = registry.remove(&conn.convoy_id);
        }
        removed
    }

    /// Whether any channel is registered for the convoy.
    pub fn has_channels(&self, convoy_id: &ConvoyId) -> bool {
        self.registry.read().contains_key(convoy_id)
    }

    /// Channels registered for the convoy.
    pub fn channel_count(&self, convoy_id: &ConvoyId) -> usize {
        self.registry
            .read()
            .get(convoy_id)
            .map_or(0, |c| c.connections.len())
    }

    /// Total registered channels.
    pub fn connection_count(&self) -> usize {
        self.registry
            .read()
            .values()
            .map(|c| c.connections.len())
            .sum()
    }

    /// Convoys with at least one registered channel.
    pub fn convoy_ids(&self) -> Vec<ConvoyId> {
        self.registry.read().keys().cloned().collect()
    }

    /// Push the convoy's current snapshot after a mutation.
    pub fn broadcast(&self, store: &ConvoyStore, convoy_id: &ConvoyId) -> usize {
        self.publish_current(store, convoy_id, PublishMode::Mutation)
    }

    /// Push the convoy's snapshot only if re-deriving statuses moved it on.
    pub fn refresh(&self, store: &ConvoyStore, convoy_id: &ConvoyId) -> usize {
        self.publish_current(store, convoy_id, PublishMode::Refresh)
    }

    fn publish_current(&self, store: &ConvoyStore, convoy_id: &ConvoyId, mode: PublishMode) -> usize {
        if !self.has_channels(convoy_id) {
            return 0;
        }
        match store.snapshot(convoy_id) {
            Ok(snapshot) => self.publish(snapshot, mode),
            Err(ConvoyError::ConvoyNotFound(_)) => {
                let closed = self.close_convoy(convoy_id);
                debug!(convoy_id = %convoy_id, closed, "convoy gone, closed its channels");
                0
            }
            Err(e) => {
                warn!(convoy_id = %convoy_id, error = %e, "snapshot failed, broadcast skipped");
                0
            }
        }
    }

    /// Deliver `snapshot` to every channel of its convoy.
    ///
    /// The frame is serialized once. A channel whose queue is full or whose
    /// writer is gone is closed and removed; the rest still receive the
    /// frame. Returns how many channels accepted it.
    pub fn publish(&self, snapshot: ConvoySnapshot, mode: PublishMode) -> usize {
        let convoy_id = snapshot.id.clone();
        let revision = snapshot.revision;
        let frame = match Envelope::snapshot(snapshot).to_json() {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(convoy_id = %convoy_id, error = %e, "failed to serialize snapshot");
                return 0;
            }
        };

        let mut registry = self.registry.write();
        let Some(channels) = registry.get_mut(&convoy_id) else {
            return 0;
        };
        let stale = match mode {
            PublishMode::Mutation => revision < channels.last_revision,
            PublishMode::Refresh => revision <= channels.last_revision,
        };
        if stale {
            debug!(convoy_id = %convoy_id, revision, last = channels.last_revision, "stale snapshot skipped");
            return 0;
        }
        channels.last_revision = revision;

        let mut delivered = 0;
        let mut failed = Vec::new();
        for conn in channels.connections.values() {
            if conn.send(Arc::clone(&frame)) {
                delivered += 1;
            } else {
                failed.push(conn.id.clone());
            }
        }
        for conn_id in &failed {
            if let Some(conn) = channels.remove(conn_id) {
                let _ = conn.close();
                warn!(convoy_id = %convoy_id, conn_id = %conn.id, "channel stalled, closed");
            }
        }
        if channels.connections.is_empty() {
            let _ = registry.remove(&convoy_id);
        }
        drop(registry);

        counter!(BROADCASTS_TOTAL).increment(1);
        if !failed.is_empty() {
            counter!(WS_BROADCAST_DROPS_TOTAL).increment(failed.len() as u64);
        }
        debug!(convoy_id = %convoy_id, revision, delivered, dropped = failed.len(), "snapshot published");
        delivered
    }

    /// Close and remove every channel of a convoy.
    pub fn close_convoy(&self, convoy_id: &ConvoyId) -> usize {
        let removed = self.registry.write().remove(convoy_id);
        let Some(channels) = removed else {
            return 0;
        };
        for conn in channels.connections.values() {
            let _ = conn.close();
        }
        channels.connections.len()
    }

    /// Close and remove every channel reporting for one member.
    pub fn close_member(&self, convoy_id: &ConvoyId, member_id: MemberId) -> usize {
        let mut registry = self.registry.write();
        let Some(channels) = registry.get_mut(convoy_id) else {
            return 0;
        };
        let ids: Vec<String> = channels
            .connections
            .values()
            .filter(|c| c.member_id == Some(member_id))
            .map(|c| c.id.clone())
            .collect();
        for id in &ids {
            if let Some(conn) = channels.remove(id) {
                let _ = conn.close();
            }
        }
        if channels.connections.is_empty() {
            let _ = registry.remove(convoy_id);
        }
        ids.len()
    }

    /// Close every channel. Used on shutdown.
    pub fn close_all(&self) -> usize {
        let drained: Vec<ConvoyChannels> = self.registry.write().drain().map(|(_, c)| c).collect();
        let mut closed = 0;
        for conn in drained.iter().flat_map(|c| c.connections.values()) {
            let _ = conn.close();
            closed += 1;
        }
        closed
    }
}

impl PresenceProbe for RealtimeHub {
    fn has_active_connection(&self, convoy_id: &ConvoyId, member_id: MemberId) -> bool {
        self.registry
            .read()
            .get(convoy_id)
            .and_then(|c| c.live_members.get(&member_id))
            .is_some_and(|n| *n > 0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
