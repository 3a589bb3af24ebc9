//! # convoyd
//!
//! Convoy coordinator binary. Loads settings, wires the store, hub, and
//! verification flow together, and serves HTTP + `WebSocket` until SIGINT
//! or SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use convoy_server::{ConvoyServer, ServerConfig, build_notifier, install_recorder};
use convoy_settings::ConvoySettings;

/// Convoy coordinator server.
#[derive(Parser, Debug)]
#[command(name = "convoyd", about = "Convoy coordinator server")]
struct Cli {
    /// Settings file (defaults to `~/.convoy/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log filter directive (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Load the layered settings, then apply CLI flags on top.
    fn resolve_settings(&self) -> Result<ConvoySettings> {
        let path = self
            .settings
            .clone()
            .unwrap_or_else(convoy_settings::settings_path);
        let mut settings = convoy_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        self.apply(&mut settings);
        Ok(settings)
    }

    fn apply(&self, settings: &mut ConvoySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("Failed to listen for ctrl-c")?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.resolve_settings()?;

    convoy_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);
    let metrics = install_recorder().context("Failed to install metrics recorder")?;

    let notifier = build_notifier(
        &settings.verification.notifier,
        &settings.verification.public_base_url,
    );
    let config = ServerConfig::from_settings(&settings);
    let shutdown_timeout = config.shutdown_timeout;
    let server = Arc::new(ConvoyServer::new(config, notifier, metrics));

    let (addr, serve_handle) = server.listen().await.context("Failed to bind server")?;
    let mut handles = server.spawn_background_tasks();
    handles.push(serve_handle);
    tracing::info!(%addr, notifier = ?settings.verification.notifier, "convoyd ready");

    shutdown_signal().await?;

    tracing::info!("Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(handles, shutdown_timeout)
        .await;
    let closed = server.hub().close_all();
    tracing::info!(closed, "Shutdown complete");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
