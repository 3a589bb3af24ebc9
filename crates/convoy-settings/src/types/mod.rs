//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a partial
//! JSON file only needs the keys it changes.

mod server;
mod verification;

pub use server::*;
pub use verification::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the convoy coordinator.
///
/// ```json
/// {
///   "server": { "port": 9090 },
///   "verification": { "notifier": { "kind": "webhook", "url": "https://relay/send" } }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConvoySettings {
    /// Listener and channel settings.
    pub server: ServerSettings,
    /// Status derivation and refresh cadence.
    pub status: StatusSettings,
    /// Verification lifecycle and notifier.
    pub verification: VerificationSettings,
    /// Verification endpoint rate limits.
    pub rate_limit: RateLimitSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl ConvoySettings {
    /// Reject values that parse but cannot work at runtime.
    pub fn validate(&self) -> Result<()> {
        let checks: [(bool, &str); 8] = [
            (self.server.channel_buffer == 0, "server.channelBuffer must be > 0"),
            (self.server.ping_interval_ms == 0, "server.pingIntervalMs must be > 0"),
            (
                self.server.pong_timeout_ms <= self.server.ping_interval_ms,
                "server.pongTimeoutMs must exceed server.pingIntervalMs",
            ),
            (self.status.update_interval_ms == 0, "status.updateIntervalMs must be > 0"),
            (self.status.refresh_interval_ms == 0, "status.refreshIntervalMs must be > 0"),
            (self.verification.token_ttl_secs == 0, "verification.tokenTtlSecs must be > 0"),
            (
                self.verification.sweep_interval_secs == 0,
                "verification.sweepIntervalSecs must be > 0",
            ),
            (
                matches!(&self.verification.notifier, NotifierSettings::Webhook { url, .. } if url.is_empty()),
                "verification.notifier.url must be set for webhook",
            ),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, msg)) => Err(SettingsError::InvalidValue((*msg).to_string())),
            None => Ok(()),
        }
    }
}
