//! Backoff configuration and delay calculation for delivery retries.
//!
//! Failed batches are retried indefinitely, but consecutive failures are
//! spaced by capped exponential backoff so a sustained collector outage
//! does not turn into a retry storm. The math here is sync and
//! runtime-free; the delivery engine owns the actual waiting.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Configuration for retry backoff.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffConfig {
    /// Base delay for exponential backoff in ms (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay between retries in ms (default: 60000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter factor 0.0–1.0 (default: 0.2).
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}
fn default_jitter_factor() -> f64 {
    DEFAULT_JITTER_FACTOR
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Delay calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Calculate backoff delay with explicit randomness.
///
/// Formula: `min(max_delay, base_delay * 2^attempt) * (1 + (random*2 - 1) * jitter)`
///
/// `random` should be a value in `[0.0, 1.0)` from a PRNG; the jitter is
/// applied symmetrically, so a factor of 0.2 varies the delay by ±20%.
///
/// # Arguments
///
/// * `attempt` — zero-based index of the failed attempt (0 for the first
///   failure)
/// * `config` — backoff parameters
/// * `random` — jitter randomness, injectable for deterministic tests
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn backoff_delay_ms(attempt: u32, config: &BackoffConfig, random: f64) -> u64 {
    // Exponential backoff: base * 2^attempt
    let exponential = config.base_delay_ms.saturating_mul(1u64 << attempt.min(31));

    // Cap at max delay
    let capped = exponential.min(config.max_delay_ms);

    // Jitter: maps random [0,1) to [-jitter, +jitter]
    let jitter = 1.0 + (random * 2.0 - 1.0) * config.jitter_factor;
    let with_jitter = (capped as f64) * jitter;

    with_jitter.round().max(0.0) as u64
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
