//! # convoy-server
//!
//! Axum HTTP + `WebSocket` front end for the convoy store.
//!
//! - REST endpoints: convoys, members, locations, destinations
//! - Email verification with per-email and per-address rate limits
//! - `WebSocket` channels: one per client, snapshot fan-out via the hub
//! - Background status refresh and verification expiry sweep
//! - Health, Prometheus metrics, and graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod extract;
mod handlers;
pub mod health;
pub mod metrics;
pub mod notifier;
pub mod rate_limit;
pub mod server;
pub mod shutdown;
pub mod tasks;
pub mod verification;
pub mod websocket;

pub use config::ServerConfig;
pub use metrics::install_recorder;
pub use notifier::{VerificationNotifier, build_notifier};
pub use server::{AppState, ConvoyServer};
pub use shutdown::ShutdownCoordinator;
