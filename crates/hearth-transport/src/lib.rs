//! # hearth-transport
//!
//! The delivery boundary between the telemetry pipeline and the collector.
//!
//! [`DeliveryClient`] is the trait the delivery engine talks to; it has two
//! paths:
//!
//! - **`deliver`**: the normal awaited path. A batch either succeeds as a
//!   whole or fails as a whole; the engine requeues failed batches.
//! - **`deliver_keepalive`**: the page-teardown path. Fire-and-forget: the
//!   send is dispatched detached from the caller with no way to observe the
//!   outcome, mirroring a beacon send as the page dies.
//!
//! [`HttpDeliveryClient`] is the production implementation over reqwest.

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod http;

pub use client::{DeliveryClient, KeepaliveDispatch};
pub use errors::TransportError;
pub use http::HttpDeliveryClient;
