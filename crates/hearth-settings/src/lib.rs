//! # hearth-settings
//!
//! Configuration for the telemetry pipeline, loaded in layers:
//!
//! 1. Compiled [`TelemetrySettings::default()`]
//! 2. An optional `telemetry.json` settings file
//! 3. `HEARTH_*` environment variable overrides (highest priority)
//!
//! Environment parsing is strict: out-of-range or unparsable values are
//! ignored with a warning, never an error: misconfigured telemetry must
//! not break the application embedding it.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::SettingsError;
pub use loader::{load_settings, load_settings_from_path};
pub use types::{DeliverySettings, SessionSettings, TelemetrySettings};
