//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ConvoySettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `CONVOY_*` environment overrides (highest priority)
//! 4. Validate

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{ConvoySettings, DEFAULT_WEBHOOK_TIMEOUT_MS, NotifierSettings};

/// Resolve the default settings file path (`~/.convoy/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".convoy").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ConvoySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an invalid merged value
/// is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ConvoySettings> {
    let mut settings = load_file_layers(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults merged with the file at `path`, without env overrides.
fn load_file_layers(path: &Path) -> Result<ConvoySettings> {
    let defaults = serde_json::to_value(ConvoySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `CONVOY_*` environment overrides. Invalid values are ignored with
/// a warning.
pub fn apply_env_overrides(settings: &mut ConvoySettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Override logic over an arbitrary variable source.
fn apply_overrides(settings: &mut ConvoySettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("CONVOY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("CONVOY_PORT", 0, 65535) {
        settings.server.port = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("CONVOY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("CONVOY_LOG_JSON") {
        settings.logging.json = v;
    }

    // ── Verification ────────────────────────────────────────────────
    if let Some(v) = env.u64("CONVOY_TOKEN_TTL_SECS", 60, 7 * 24 * 3600) {
        settings.verification.token_ttl_secs = v;
    }
    if let Some(v) = env.u64("CONVOY_SWEEP_INTERVAL_SECS", 1, 24 * 3600) {
        settings.verification.sweep_interval_secs = v;
    }
    if let Some(v) = env.string("CONVOY_PUBLIC_BASE_URL") {
        settings.verification.public_base_url = v;
    }
    if let Some(url) = env.string("CONVOY_NOTIFIER_WEBHOOK_URL") {
        let timeout_ms = match settings.verification.notifier {
            NotifierSettings::Webhook { timeout_ms, .. } => timeout_ms,
            NotifierSettings::Log => DEFAULT_WEBHOOK_TIMEOUT_MS,
        };
        settings.verification.notifier = NotifierSettings::Webhook { url, timeout_ms };
    }

    // ── Status ──────────────────────────────────────────────────────
    if let Some(v) = env.u64("CONVOY_UPDATE_INTERVAL_MS", 100, 600_000) {
        settings.status.update_interval_ms = v;
    }
    if let Some(v) = env.u64("CONVOY_REFRESH_INTERVAL_MS", 100, 600_000) {
        settings.status.refresh_interval_ms = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Variable readers ────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, kind: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, kind, "invalid env var, ignoring");
        }
        result
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.parsed(name, "bool", parse_bool)
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.parsed(name, "u16", |v| parse_u16_range(v, min, max))
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, "u64", |v| parse_u64_range(v, min, max))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
