//! Verification flow: create, email, verify, resend.
//!
//! Rate limits are enforced by the HTTP layer before these calls.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use convoy_core::{Convoy, ConvoyError, ConvoyId, Result, VerificationToken};
use convoy_store::ConvoyStore;
use metrics::counter;
use tracing::{info, warn};

use crate::metrics::CONVOY_CREATED_TOTAL;
use crate::notifier::VerificationNotifier;
use crate::websocket::RealtimeHub;

/// Token generation attempts before giving up on entropy failures.
const TOKEN_ATTEMPTS: usize = 3;

/// Result of starting a verified convoy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedVerification {
    /// The new, still unverified convoy.
    pub convoy_id: ConvoyId,
    /// When the issued token stops working.
    pub expires_at: DateTime<Utc>,
    /// Whether the notifier accepted the message.
    pub email_sent: bool,
}

/// Result of rotating a pending token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResentVerification {
    /// Expiry of the new token.
    pub expires_at: DateTime<Utc>,
    /// Whether the notifier accepted the message.
    pub email_sent: bool,
}

/// Trim and sanity-check an email address.
pub fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim();
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && !domain.is_empty() && !domain.contains('@') =>
        {
            Ok(email.to_owned())
        }
        _ => Err(ConvoyError::invalid("email address is not valid")),
    }
}

fn generate_token() -> Result<VerificationToken> {
    let mut last_err = ConvoyError::Entropy("no attempt made".into());
    for _ in 0..TOKEN_ATTEMPTS {
        match VerificationToken::generate() {
            Ok(token) => return Ok(token),
            Err(e) => {
                warn!(error = %e, "token generation failed, retrying");
                last_err = e;
            }
        }
    }
    Err(last_err)
}

/// Coordinates the store, the notifier, and the hub for the email
/// verification lifecycle.
pub struct VerificationFlow {
    store: Arc<ConvoyStore>,
    hub: Arc<RealtimeHub>,
    notifier: Arc<dyn VerificationNotifier>,
    token_ttl: TimeDelta,
}

impl VerificationFlow {
    /// Create a flow issuing tokens valid for `token_ttl`.
    pub fn new(
        store: Arc<ConvoyStore>,
        hub: Arc<RealtimeHub>,
        notifier: Arc<dyn VerificationNotifier>,
        token_ttl: Duration,
    ) -> Self {
        Self {
            store,
            hub,
            notifier,
            token_ttl: TimeDelta::from_std(token_ttl).unwrap_or(TimeDelta::hours(1)),
        }
    }

    /// Create a pending convoy led by `leader_name` and send its link.
    pub async fn create(&self, email: &str, leader_name: &str) -> Result<CreatedVerification> {
        let email = normalize_email(email)?;
        let token = generate_token()?;
        let expires_at = Utc::now() + self.token_ttl;
        let convoy =
            self.store
                .create_convoy_with_verification(&email, leader_name, token.clone(), expires_at)?;
        counter!(CONVOY_CREATED_TOTAL, "flow" => "verified").increment(1);

        let email_sent = self
            .notifier
            .send_verification_email(&email, &token, &convoy.id, expires_at)
            .await;
        info!(convoy_id = %convoy.id, email_sent, "verification started");
        Ok(CreatedVerification {
            convoy_id: convoy.id,
            expires_at,
            email_sent,
        })
    }

    /// Redeem a token and push the verified state to open channels.
    pub fn verify(&self, token: &VerificationToken) -> Result<Convoy> {
        let convoy = self.store.verify_convoy(token)?;
        info!(convoy_id = %convoy.id, "convoy verified");
        let _ = self.hub.broadcast(&self.store, &convoy.id);
        Ok(convoy)
    }

    /// Rotate the pending token and send a fresh link.
    pub async fn resend(&self, convoy_id: &ConvoyId) -> Result<ResentVerification> {
        let token = generate_token()?;
        let expires_at = Utc::now() + self.token_ttl;
        let record = self
            .store
            .update_verification_token(convoy_id, token.clone(), expires_at)?;

        let email_sent = self
            .notifier
            .send_verification_email(&record.email, &token, convoy_id, expires_at)
            .await;
        info!(convoy_id = %convoy_id, email_sent, "verification resent");
        Ok(ResentVerification {
            expires_at,
            email_sent,
        })
    }
}
