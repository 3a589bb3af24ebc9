//! Runtime server configuration.

use std::time::Duration;

use convoy_core::StatusThresholds;
use convoy_settings::ConvoySettings;

/// Everything the server needs at runtime, resolved from settings.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Frames queued per channel before it is closed as stalled.
    pub channel_buffer: usize,
    /// Interval between server WebSocket pings.
    pub ping_interval: Duration,
    /// Close a channel after this long without inbound traffic.
    pub pong_timeout: Duration,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Drain budget on shutdown.
    pub shutdown_timeout: Duration,
    /// Member status thresholds.
    pub thresholds: StatusThresholds,
    /// Period of the status refresh broadcast.
    pub refresh_interval: Duration,
    /// Period of the expired-verification sweep.
    pub sweep_interval: Duration,
    /// Lifetime of issued verification tokens.
    pub token_ttl: Duration,
    /// Verification requests per email per window.
    pub email_per_hour: u32,
    /// Verification requests per client address per window.
    pub ip_per_hour: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            channel_buffer: 64,
            ping_interval: Duration::from_secs(15),
            pong_timeout: Duration::from_secs(45),
            max_message_size: 64 * 1024,
            shutdown_timeout: Duration::from_secs(10),
            thresholds: StatusThresholds::default(),
            refresh_interval: Duration::from_secs(3),
            sweep_interval: Duration::from_secs(300),
            token_ttl: Duration::from_secs(3600),
            email_per_hour: 5,
            ip_per_hour: 20,
        }
    }
}

impl ServerConfig {
    /// Resolve from loaded settings.
    pub fn from_settings(settings: &ConvoySettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            channel_buffer: settings.server.channel_buffer,
            ping_interval: settings.server.ping_interval(),
            pong_timeout: settings.server.pong_timeout(),
            max_message_size: settings.server.max_message_size,
            shutdown_timeout: settings.server.shutdown_timeout(),
            thresholds: StatusThresholds::from_update_interval(
                settings.status.update_interval(),
                settings.status.lag_factor,
            ),
            refresh_interval: settings.status.refresh_interval(),
            sweep_interval: settings.verification.sweep_interval(),
            token_ttl: settings.verification.token_ttl(),
            email_per_hour: settings.rate_limit.email_per_hour,
            ip_per_hour: settings.rate_limit.ip_per_hour,
        }
    }

    /// `host:port` bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
