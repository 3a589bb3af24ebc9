//! Network, channel, and status-derivation settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// HTTP listener and live-channel settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port. `0` picks an ephemeral port.
    pub port: u16,
    /// Frames queued per connection before it is treated as stalled.
    pub channel_buffer: usize,
    /// Interval between server WebSocket pings.
    pub ping_interval_ms: u64,
    /// Close a channel after this long without any inbound frame.
    pub pong_timeout_ms: u64,
    /// Largest inbound WebSocket frame accepted, in bytes.
    pub max_message_size: usize,
    /// How long shutdown waits for tasks to drain.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            channel_buffer: 64,
            ping_interval_ms: 15_000,
            pong_timeout_ms: 45_000,
            max_message_size: 64 * 1024,
            shutdown_timeout_ms: 10_000,
        }
    }
}

impl ServerSettings {
    /// Ping cadence as a [`Duration`].
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Idle timeout as a [`Duration`].
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }

    /// Shutdown drain budget as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Member status derivation and refresh cadence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusSettings {
    /// Expected interval between client location updates.
    pub update_interval_ms: u64,
    /// A member lags after `updateIntervalMs * lagFactor` without an update.
    pub lag_factor: u32,
    /// Period of the status refresh broadcast.
    pub refresh_interval_ms: u64,
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self {
            update_interval_ms: 5_000,
            lag_factor: 2,
            refresh_interval_ms: 3_000,
        }
    }
}

impl StatusSettings {
    /// Expected client cadence as a [`Duration`].
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    /// Refresh tick as a [`Duration`].
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

/// Logging output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
