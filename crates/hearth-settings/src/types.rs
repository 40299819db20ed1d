//! Settings types with compiled defaults.

use hearth_core::BackoffConfig;
use serde::{Deserialize, Serialize};

/// Root settings for the telemetry pipeline.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelemetrySettings {
    /// Session lifecycle settings.
    pub session: SessionSettings,
    /// Event delivery settings.
    pub delivery: DeliverySettings,
}

/// Session lifecycle settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Idle timeout after which the session expires, in milliseconds.
    pub idle_timeout_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 1_800_000,
        }
    }
}

/// Event delivery settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliverySettings {
    /// Collector endpoint accepting batched event arrays.
    pub endpoint: String,
    /// Queue length that triggers an immediate flush.
    pub batch_size: usize,
    /// Periodic flush interval in milliseconds.
    pub flush_interval_ms: u64,
    /// Per-request timeout for the normal delivery path, in milliseconds.
    pub request_timeout_ms: u64,
    /// Backoff applied between consecutive failed flushes.
    pub retry: BackoffConfig,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            endpoint: "https://collect.hearth.homes/v1/events".to_string(),
            batch_size: 20,
            flush_interval_ms: 3000,
            request_timeout_ms: 10_000,
            retry: BackoffConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
