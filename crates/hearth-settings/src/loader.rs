//! Settings loading: figment layering plus environment overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TelemetrySettings::default()`]
//! 2. If the settings file exists, merge its values over the defaults
//! 3. Apply `HEARTH_*` environment variable overrides (highest priority)
//!
//! Each env var has strict parsing rules:
//! - Integers must be valid and within the documented range
//! - Invalid values are ignored with a warning (fall back to file/default)

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Format, Json, Serialized};
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::TelemetrySettings;

/// Resolve the default settings file path (`~/.hearth/telemetry.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".hearth").join("telemetry.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TelemetrySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a present-but-invalid file is an error.
pub fn load_settings_from_path(path: &Path) -> Result<TelemetrySettings> {
    debug!(?path, "loading telemetry settings");

    let mut settings: TelemetrySettings =
        Figment::from(Serialized::defaults(TelemetrySettings::default()))
            .merge(Json::file(path))
            .extract()?;

    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Apply environment variable overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut TelemetrySettings) {
    if let Some(v) = read_env_string("HEARTH_ENDPOINT") {
        settings.delivery.endpoint = v;
    }
    if let Some(v) = read_env_usize("HEARTH_BATCH_SIZE", 1, 1000) {
        settings.delivery.batch_size = v;
    }
    if let Some(v) = read_env_u64("HEARTH_FLUSH_INTERVAL_MS", 100, 600_000) {
        settings.delivery.flush_interval_ms = v;
    }
    if let Some(v) = read_env_u64("HEARTH_REQUEST_TIMEOUT_MS", 100, 120_000) {
        settings.delivery.request_timeout_ms = v;
    }
    if let Some(v) = read_env_u64("HEARTH_IDLE_TIMEOUT_MS", 1000, 86_400_000) {
        settings.session.idle_timeout_ms = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u64` within `[min, max]`.
pub fn parse_u64_in_range(val: &str, min: u64, max: u64) -> Option<u64> {
    match val.trim().parse::<u64>() {
        Ok(n) if (min..=max).contains(&n) => Some(n),
        _ => None,
    }
}

/// Parse a string as a `usize` within `[min, max]`.
pub fn parse_usize_in_range(val: &str, min: usize, max: usize) -> Option<usize> {
    match val.trim().parse::<usize>() {
        Ok(n) if (min..=max).contains(&n) => Some(n),
        _ => None,
    }
}

// ── Env readers ─────────────────────────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    let parsed = parse_u64_in_range(&raw, min, max);
    if parsed.is_none() {
        warn!(name, %raw, "ignoring invalid env override");
    }
    parsed
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let raw = std::env::var(name).ok()?;
    let parsed = parse_usize_in_range(&raw, min, max);
    if parsed.is_none() {
        warn!(name, %raw, "ignoring invalid env override");
    }
    parsed
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
