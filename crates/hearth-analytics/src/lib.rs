//! # hearth-analytics
//!
//! The client-side telemetry pipeline for the Hearth listings marketplace:
//! visitor/session identity, reliable batched event delivery, per-session
//! dedup of repeated observations, and posting-funnel tracking.
//!
//! The public surface is the [`Analytics`] facade. Application code
//! constructs it once per page load with [`Analytics::init`], injecting
//! storage, the delivery transport, and a clock; every tracker call is
//! non-blocking and infallible from the caller's perspective; delivery
//! happens later, off the caller's path, and telemetry failures are never
//! visible to the product.
//!
//! Internals, leaf-first:
//!
//! - [`identity`]: durable anonymous id + in-memory user binding
//! - [`session`]: idle-timeout session state machine with boundary events
//! - [`dedup`]: session-scoped (kind, entity) emission guards
//! - [`queue`] / [`delivery`]: ordered buffer, batch flushes, front-requeue
//!   retries with capped backoff, and the fire-and-forget teardown path
//! - [`funnel`]: attempt-scoped posting funnel state machine

#![deny(unsafe_code)]

pub mod analytics;
pub mod dedup;
pub mod delivery;
pub mod funnel;
pub mod identity;
pub mod queue;
pub mod session;
pub mod types;

pub use analytics::Analytics;
pub use delivery::FlushOutcome;
pub use types::{ActivityKind, Diagnostics, TrackStatus};
