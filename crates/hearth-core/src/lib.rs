//! # hearth-core
//!
//! Foundation types and utilities shared across the Hearth telemetry
//! pipeline.
//!
//! This crate provides the vocabulary the other pipeline crates depend on:
//!
//! - **Branded IDs**: `AnonymousId`, `SessionId`, `AttemptId` as newtypes
//!   for type safety
//! - **Event records**: the immutable wire envelope delivered to the
//!   collector
//! - **Event names**: canonical event-name and dedup-kind constants
//! - **Backoff**: capped exponential backoff math for delivery retries
//! - **Clock**: injectable time source so expiry logic is testable

#![deny(unsafe_code)]

pub mod backoff;
pub mod clock;
pub mod constants;
pub mod ids;
pub mod record;

pub use backoff::BackoffConfig;
pub use clock::{Clock, ManualClock, SystemClock};
pub use ids::{AnonymousId, AttemptId, ListingId, SessionId, UserId};
pub use record::EventRecord;
