//! The convoy store: one reader-writer lock over every convoy.
//!
//! Every method takes the lock for its whole critical section and never
//! calls another locking method while holding it. The only outbound call
//! made under the lock is to the [`PresenceProbe`], which must not call back.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use convoy_core::status::derive_member_status;
use convoy_core::{
    Convoy, ConvoyError, ConvoyId, ConvoySnapshot, ConvoyVerification, Destination, Location,
    Member, MemberId, MemberSignals, MemberStatus, NewMember, Result, StatusThresholds,
    VerificationToken,
};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::presence::PresenceProbe;

/// Attempts at drawing a fresh convoy ID before giving up.
const ID_ATTEMPTS: usize = 3;

/// Everything behind the store lock.
#[derive(Default)]
pub(crate) struct StoreInner {
    pub(crate) convoys: HashMap<ConvoyId, Convoy>,
    pub(crate) verifications: HashMap<VerificationToken, ConvoyVerification>,
}

/// Counters for health and metrics endpoints.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Every convoy held, including empty and pending ones.
    pub convoys: usize,
    /// Served convoys with at least one member.
    pub active_convoys: usize,
    /// Verification records not yet redeemed.
    pub pending_verifications: usize,
}

/// Authoritative in-memory convoy state.
pub struct ConvoyStore {
    pub(crate) inner: RwLock<StoreInner>,
    presence: Arc<dyn PresenceProbe>,
    thresholds: StatusThresholds,
}

impl ConvoyStore {
    /// Create an empty store.
    pub fn new(presence: Arc<dyn PresenceProbe>, thresholds: StatusThresholds) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            presence,
            thresholds,
        }
    }

    /// Thresholds used when deriving member statuses.
    pub fn thresholds(&self) -> StatusThresholds {
        self.thresholds
    }

    /// Create a verified convoy with no members.
    pub fn create_convoy(&self) -> Result<Convoy> {
        let now = Utc::now();
        let mut inner = self.inner.write();
        let id = unique_convoy_id(&inner.convoys)?;
        let convoy = Convoy::new(id.clone(), now);
        let _ = inner.convoys.insert(id, convoy.clone());
        debug!(convoy_id = %convoy.id, "convoy created");
        Ok(convoy)
    }

    /// Fetch a convoy as stored. Expired unverified convoys are not served.
    pub fn get_convoy(&self, convoy_id: &ConvoyId) -> Result<Convoy> {
        let now = Utc::now();
        let inner = self.inner.read();
        inner
            .convoys
            .get(convoy_id)
            .filter(|c| !c.is_expired_unverified(now))
            .cloned()
            .ok_or_else(|| ConvoyError::ConvoyNotFound(convoy_id.clone()))
    }

    /// Append a member. Names are not deduplicated.
    pub fn add_member(&self, convoy_id: &ConvoyId, new_member: NewMember) -> Result<Member> {
        let now = Utc::now();
        let mut inner = self.inner.write();
        let convoy = served_convoy_mut(&mut inner.convoys, convoy_id, now)?;
        let member = Member {
            id: convoy.allocate_member_id(),
            name: new_member.name,
            location: new_member.location,
            status: MemberStatus::Connected,
            last_update: now,
            joined_at: now,
            has_reported_location: !new_member.location.is_placeholder(),
        };
        convoy.members.push(member.clone());
        convoy.bump_revision();
        debug!(convoy_id = %convoy_id, member_id = %member.id, "member added");
        Ok(member)
    }

    /// Record a location write.
    ///
    /// A `disconnected` member is flipped back to `connected` only while the
    /// presence probe reports an open channel, so a write that lands after
    /// the channel closed cannot revive the member.
    pub fn update_member_location(
        &self,
        convoy_id: &ConvoyId,
        member_id: MemberId,
        location: Location,
    ) -> Result<Member> {
        location.validate()?;
        let now = Utc::now();
        let mut inner = self.inner.write();
        let convoy = served_convoy_mut(&mut inner.convoys, convoy_id, now)?;
        let member = convoy
            .member_mut(member_id)
            .ok_or_else(|| member_not_found(convoy_id, member_id))?;

        member.location = location;
        member.last_update = now;
        if !location.is_placeholder() {
            member.has_reported_location = true;
        }
        if member.status == MemberStatus::Disconnected
            && self.presence.has_active_connection(convoy_id, member_id)
        {
            member.status = MemberStatus::Connected;
        }
        let updated = member.clone();
        convoy.bump_revision();
        Ok(updated)
    }

    /// Override a member's status.
    pub fn update_member_status(
        &self,
        convoy_id: &ConvoyId,
        member_id: MemberId,
        status: MemberStatus,
    ) -> Result<()> {
        let now = Utc::now();
        let mut inner = self.inner.write();
        let convoy = served_convoy_mut(&mut inner.convoys, convoy_id, now)?;
        let member = convoy
            .member_mut(member_id)
            .ok_or_else(|| member_not_found(convoy_id, member_id))?;
        if member.status != status {
            member.status = status;
            convoy.bump_revision();
        }
        Ok(())
    }

    /// Replace the destination wholesale.
    pub fn set_convoy_destination(
        &self,
        convoy_id: &ConvoyId,
        destination: Destination,
    ) -> Result<()> {
        destination.validate()?;
        let now = Utc::now();
        let mut inner = self.inner.write();
        let convoy = served_convoy_mut(&mut inner.convoys, convoy_id, now)?;
        convoy.destination = Some(destination);
        convoy.bump_revision();
        Ok(())
    }

    /// Remove a member. The convoy is kept even when it becomes empty.
    pub fn leave_convoy(&self, convoy_id: &ConvoyId, member_id: MemberId) -> Result<Member> {
        let now = Utc::now();
        let mut inner = self.inner.write();
        let convoy = served_convoy_mut(&mut inner.convoys, convoy_id, now)?;
        let idx = convoy
            .members
            .iter()
            .position(|m| m.id == member_id)
            .ok_or_else(|| member_not_found(convoy_id, member_id))?;
        let removed = convoy.members.remove(idx);
        convoy.bump_revision();
        debug!(convoy_id = %convoy_id, member_id = %member_id, "member left");
        Ok(removed)
    }

    /// Served convoys with at least one member.
    pub fn get_all_active_convoys(&self) -> Vec<Convoy> {
        let now = Utc::now();
        let inner = self.inner.read();
        inner
            .convoys
            .values()
            .filter(|c| is_active(c, now))
            .cloned()
            .collect()
    }

    /// Re-derive member statuses and build a snapshot.
    pub fn snapshot(&self, convoy_id: &ConvoyId) -> Result<ConvoySnapshot> {
        self.snapshot_at(convoy_id, Utc::now())
    }

    /// [`Self::snapshot`] with an explicit clock.
    ///
    /// Derived statuses are written back, and the revision moves only when
    /// at least one status changed.
    pub fn snapshot_at(&self, convoy_id: &ConvoyId, now: DateTime<Utc>) -> Result<ConvoySnapshot> {
        let mut inner = self.inner.write();
        let convoy = served_convoy_mut(&mut inner.convoys, convoy_id, now)?;
        let mut changed = false;
        for member in &mut convoy.members {
            let signals = MemberSignals {
                last_update: member.last_update,
                has_reported_location: member.has_reported_location,
                has_live_channel: self.presence.has_active_connection(&convoy.id, member.id),
            };
            let status = derive_member_status(now, signals, self.thresholds);
            if status != member.status {
                member.status = status;
                changed = true;
            }
        }
        if changed {
            convoy.bump_revision();
        }
        Ok(ConvoySnapshot::from_convoy(convoy))
    }

    /// Sizes for the health endpoint.
    pub fn stats(&self) -> StoreStats {
        let now = Utc::now();
        let inner = self.inner.read();
        StoreStats {
            convoys: inner.convoys.len(),
            active_convoys: inner.convoys.values().filter(|c| is_active(c, now)).count(),
            pending_verifications: inner
                .verifications
                .values()
                .filter(|v| v.is_pending())
                .count(),
        }
    }
}

/// Draw random IDs until one is free, retrying entropy failures.
pub(crate) fn unique_convoy_id(existing: &HashMap<ConvoyId, Convoy>) -> Result<ConvoyId> {
    let mut last_err = None;
    for _ in 0..ID_ATTEMPTS {
        match ConvoyId::generate() {
            Ok(id) if !existing.contains_key(&id) => return Ok(id),
            Ok(id) => warn!(convoy_id = %id, "convoy id collision, regenerating"),
            Err(e) => {
                warn!(error = %e, "convoy id generation failed, retrying");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| ConvoyError::Internal("no free convoy id".into())))
}

/// Look up a convoy that may be served at `now`.
pub(crate) fn served_convoy_mut<'a>(
    convoys: &'a mut HashMap<ConvoyId, Convoy>,
    convoy_id: &ConvoyId,
    now: DateTime<Utc>,
) -> Result<&'a mut Convoy> {
    convoys
        .get_mut(convoy_id)
        .filter(|c| !c.is_expired_unverified(now))
        .ok_or_else(|| ConvoyError::ConvoyNotFound(convoy_id.clone()))
}

/// Served at `now` and has at least one member.
fn is_active(convoy: &Convoy, now: DateTime<Utc>) -> bool {
    !convoy.members.is_empty() && !convoy.is_expired_unverified(now)
}

fn member_not_found(convoy_id: &ConvoyId, member_id: MemberId) -> ConvoyError {
    ConvoyError::MemberNotFound {
        convoy_id: convoy_id.clone(),
        member_id,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
