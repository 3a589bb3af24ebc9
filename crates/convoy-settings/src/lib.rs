//! # convoy-settings
//!
//! Layered configuration for the convoy coordinator.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ConvoySettings::default()`]
//! 2. **Settings file**: `~/.convoy/settings.json` or `--settings <path>`,
//!    deep-merged over defaults
//! 3. **Environment variables**: `CONVOY_*` overrides
//!
//! The binary applies CLI flags on top of the result.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
