//! Verification lifecycle, notifier, and rate limit settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Token lifetime and expiry sweep.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VerificationSettings {
    /// Lifetime of a freshly issued token.
    pub token_ttl_secs: u64,
    /// Period of the expired-verification sweep.
    pub sweep_interval_secs: u64,
    /// Base URL used to build verification links.
    pub public_base_url: String,
    /// How verification emails are delivered.
    pub notifier: NotifierSettings,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            token_ttl_secs: 3_600,
            sweep_interval_secs: 300,
            public_base_url: "http://localhost:8080".to_string(),
            notifier: NotifierSettings::default(),
        }
    }
}

impl VerificationSettings {
    /// Token lifetime as a [`Duration`].
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    /// Sweep period as a [`Duration`].
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Default webhook request timeout.
pub const DEFAULT_WEBHOOK_TIMEOUT_MS: u64 = 5_000;

fn default_webhook_timeout_ms() -> u64 {
    DEFAULT_WEBHOOK_TIMEOUT_MS
}

/// Verification email delivery backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum NotifierSettings {
    /// Log the verification link (development).
    #[default]
    Log,
    /// POST the message to an external mail relay.
    Webhook {
        /// Relay endpoint.
        url: String,
        /// Request timeout.
        #[serde(default = "default_webhook_timeout_ms")]
        timeout_ms: u64,
    },
}

/// Fixed-window request caps for the verification endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitSettings {
    /// Requests per email address per hour.
    pub email_per_hour: u32,
    /// Requests per client address per hour.
    pub ip_per_hour: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            email_per_hour: 5,
            ip_per_hour: 20,
        }
    }
}
