//! Verification-record operations on [`ConvoyStore`].
//!
//! Records are keyed by token. A convoy has at most one live record; resend
//! swaps it for a fresh one under a new key.

use chrono::{DateTime, Utc};
use convoy_core::model::clean_member_name;
use convoy_core::{
    Convoy, ConvoyError, ConvoyId, ConvoyVerification, Result, VerificationId, VerificationToken,
};
use tracing::{debug, warn};

use crate::store::{ConvoyStore, StoreInner, unique_convoy_id};

/// Outcome of one expiry sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Convoys deleted along with their expired verification.
    pub reaped: Vec<ConvoyId>,
    /// Expired records whose convoy was already gone.
    pub orphaned_records: usize,
}

impl ConvoyStore {
    /// Create an unverified convoy bound to `token`.
    pub fn create_convoy_with_verification(
        &self,
        email: &str,
        leader_name: &str,
        token: VerificationToken,
        expires_at: DateTime<Utc>,
    ) -> Result<Convoy> {
        let email = email.trim();
        if email.is_empty() {
            return Err(ConvoyError::invalid("email must not be empty"));
        }
        let leader_name = clean_member_name(leader_name)?;
        let now = Utc::now();

        let mut inner = self.inner.write();
        if inner.verifications.contains_key(&token) {
            return Err(ConvoyError::Internal("verification token collision".into()));
        }
        let id = unique_convoy_id(&inner.convoys)?;
        let convoy = Convoy::pending(
            id.clone(),
            email.to_owned(),
            leader_name,
            token.clone(),
            expires_at,
            now,
        );
        let record = ConvoyVerification {
            id: VerificationId::new(),
            convoy_id: id.clone(),
            email: email.to_owned(),
            token: token.clone(),
            expires_at,
            verified_at: None,
            created_at: now,
        };
        let _ = inner.verifications.insert(token, record);
        let _ = inner.convoys.insert(id, convoy.clone());
        debug!(convoy_id = %convoy.id, "pending convoy created");
        Ok(convoy)
    }

    /// Redeem a token.
    pub fn verify_convoy(&self, token: &VerificationToken) -> Result<Convoy> {
        self.verify_convoy_at(token, Utc::now())
    }

    /// [`Self::verify_convoy`] with an explicit clock. A redeemed token
    /// reports `TokenAlreadyUsed` even after it would have expired.
    pub fn verify_convoy_at(&self, token: &VerificationToken, now: DateTime<Utc>) -> Result<Convoy> {
        let mut inner = self.inner.write();
        let StoreInner {
            convoys,
            verifications,
        } = &mut *inner;

        let record = verifications
            .get_mut(token)
            .ok_or(ConvoyError::VerificationNotFound)?;
        if !record.is_pending() {
            return Err(ConvoyError::TokenAlreadyUsed);
        }
        if record.is_expired(now) {
            return Err(ConvoyError::TokenExpired);
        }
        let convoy = convoys
            .get_mut(&record.convoy_id)
            .ok_or_else(|| ConvoyError::ConvoyNotFound(record.convoy_id.clone()))?;

        record.verified_at = Some(now);
        convoy.is_verified = true;
        convoy.verified_at = Some(now);
        convoy.bump_revision();
        debug!(convoy_id = %convoy.id, token = token.redacted(), "convoy verified");
        Ok(convoy.clone())
    }

    /// Rotate the pending token. The old token stops resolving immediately.
    pub fn update_verification_token(
        &self,
        convoy_id: &ConvoyId,
        new_token: VerificationToken,
        new_expires_at: DateTime<Utc>,
    ) -> Result<ConvoyVerification> {
        let now = Utc::now();
        let mut inner = self.inner.write();
        let StoreInner {
            convoys,
            verifications,
        } = &mut *inner;

        let convoy = convoys
            .get_mut(convoy_id)
            .filter(|c| !c.is_expired_unverified(now))
            .ok_or_else(|| ConvoyError::ConvoyNotFound(convoy_id.clone()))?;
        if convoy.is_verified {
            return Err(ConvoyError::AlreadyVerified(convoy_id.clone()));
        }
        if verifications.contains_key(&new_token) {
            return Err(ConvoyError::Internal("verification token collision".into()));
        }

        let previous = convoy
            .verification_token
            .take()
            .and_then(|old| verifications.remove(&old));
        let (id, email, created_at) = match previous {
            Some(p) => (p.id, p.email, p.created_at),
            None => (
                VerificationId::new(),
                convoy.created_by_email.clone().unwrap_or_default(),
                now,
            ),
        };
        let record = ConvoyVerification {
            id,
            convoy_id: convoy_id.clone(),
            email,
            token: new_token.clone(),
            expires_at: new_expires_at,
            verified_at: None,
            created_at,
        };
        convoy.verification_token = Some(new_token.clone());
        convoy.verification_expires_at = Some(new_expires_at);
        let _ = verifications.insert(new_token, record.clone());
        debug!(convoy_id = %convoy_id, token = record.token.redacted(), "verification token rotated");
        Ok(record)
    }

    /// Delete every expired pending verification and its convoy.
    pub fn cleanup_expired_verifications(&self) -> CleanupReport {
        self.cleanup_expired_verifications_at(Utc::now())
    }

    /// [`Self::cleanup_expired_verifications`] with an explicit clock.
    pub fn cleanup_expired_verifications_at(&self, now: DateTime<Utc>) -> CleanupReport {
        let mut inner = self.inner.write();
        let StoreInner {
            convoys,
            verifications,
        } = &mut *inner;

        let expired: Vec<VerificationToken> = verifications
            .values()
            .filter(|v| v.is_pending() && v.is_expired(now))
            .map(|v| v.token.clone())
            .collect();

        let mut report = CleanupReport::default();
        for token in expired {
            let Some(record) = verifications.remove(&token) else {
                continue;
            };
            match convoys.get(&record.convoy_id) {
                Some(convoy) if convoy.is_verified => {
                    warn!(convoy_id = %record.convoy_id, "stale pending record on verified convoy, dropping record");
                    report.orphaned_records += 1;
                }
                Some(_) => {
                    let _ = convoys.remove(&record.convoy_id);
                    report.reaped.push(record.convoy_id);
                }
                None => {
                    warn!(convoy_id = %record.convoy_id, "expired verification without convoy, dropping record");
                    report.orphaned_records += 1;
                }
            }
        }
        report
    }

    /// Email the pending verification for `convoy_id` was issued to.
    /// An expired pending convoy is reported as not found, same as reads.
    pub fn pending_verification_email(&self, convoy_id: &ConvoyId) -> Result<String> {
        let now = Utc::now();
        let inner = self.inner.read();
        let convoy = inner
            .convoys
            .get(convoy_id)
            .filter(|c| !c.is_expired_unverified(now))
            .ok_or_else(|| ConvoyError::ConvoyNotFound(convoy_id.clone()))?;
        if convoy.is_verified {
            return Err(ConvoyError::AlreadyVerified(convoy_id.clone()));
        }
        let from_record = convoy
            .verification_token
            .as_ref()
            .and_then(|t| inner.verifications.get(t))
            .map(|v| v.email.clone());
        from_record
            .or_else(|| convoy.created_by_email.clone())
            .ok_or_else(|| ConvoyError::Internal("pending convoy without email".into()))
    }

    /// Look up the record behind a token.
    pub fn get_verification(&self, token: &VerificationToken) -> Option<ConvoyVerification> {
        self.inner.read().verifications.get(token).cloned()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
