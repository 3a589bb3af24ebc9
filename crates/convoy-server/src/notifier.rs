//! Verification message delivery.
//!
//! The flow only needs to know whether delivery succeeded; a failed send
//! never fails the request that triggered it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use convoy_core::{ConvoyId, VerificationToken};
use convoy_settings::NotifierSettings;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

/// Delivers verification links to convoy creators.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VerificationNotifier: Send + Sync {
    /// Send the link for `token`. Returns whether delivery succeeded.
    async fn send_verification_email(
        &self,
        email: &str,
        token: &VerificationToken,
        convoy_id: &ConvoyId,
        expires_at: DateTime<Utc>,
    ) -> bool;
}

/// Link a recipient follows to redeem `token`.
pub fn verify_url(base_url: &str, token: &VerificationToken) -> String {
    format!("{}/convoys/verify/{token}", base_url.trim_end_matches('/'))
}

/// Writes the link to the log. Always succeeds.
pub struct LogNotifier {
    base_url: String,
}

impl LogNotifier {
    /// Create a log notifier building links under `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl VerificationNotifier for LogNotifier {
    async fn send_verification_email(
        &self,
        email: &str,
        token: &VerificationToken,
        convoy_id: &ConvoyId,
        expires_at: DateTime<Utc>,
    ) -> bool {
        info!(
            email,
            convoy_id = %convoy_id,
            token = token.redacted(),
            %expires_at,
            verify_url = %verify_url(&self.base_url, token),
            "verification link issued"
        );
        true
    }
}

/// Webhook delivery failure.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Transport error or timeout.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Relay answered with a non-success status.
    #[error("relay returned status {0}")]
    Status(u16),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload<'a> {
    email: &'a str,
    convoy_id: &'a ConvoyId,
    verify_url: String,
    expires_at: DateTime<Utc>,
}

/// POSTs each message as JSON to an external mail relay.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    base_url: String,
}

impl WebhookNotifier {
    /// Create a webhook notifier. `timeout` bounds each request.
    pub fn new(url: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "webhook client build failed, using defaults");
                reqwest::Client::new()
            });
        Self {
            client,
            url: url.into(),
            base_url: base_url.into(),
        }
    }

    async fn post(&self, payload: &WebhookPayload<'_>) -> Result<(), WebhookError> {
        let resp = self.client.post(&self.url).json(payload).send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(WebhookError::Status(status.as_u16()))
        }
    }
}

#[async_trait]
impl VerificationNotifier for WebhookNotifier {
    async fn send_verification_email(
        &self,
        email: &str,
        token: &VerificationToken,
        convoy_id: &ConvoyId,
        expires_at: DateTime<Utc>,
    ) -> bool {
        let payload = WebhookPayload {
            email,
            convoy_id,
            verify_url: verify_url(&self.base_url, token),
            expires_at,
        };
        match self.post(&payload).await {
            Ok(()) => {
                info!(convoy_id = %convoy_id, "verification email relayed");
                true
            }
            Err(e) => {
                warn!(convoy_id = %convoy_id, error = %e, "verification email delivery failed");
                false
            }
        }
    }
}

/// Build the notifier selected in settings.
pub fn build_notifier(
    settings: &NotifierSettings,
    base_url: &str,
) -> Arc<dyn VerificationNotifier> {
    match settings {
        NotifierSettings::Log => Arc::new(LogNotifier::new(base_url)),
        NotifierSettings::Webhook { url, timeout_ms } => Arc::new(WebhookNotifier::new(
            url.clone(),
            base_url,
            Duration::from_millis(*timeout_ms),
        )),
    }
}
