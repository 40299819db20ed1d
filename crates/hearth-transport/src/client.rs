//! The delivery client trait.

use async_trait::async_trait;
use hearth_core::EventRecord;

use crate::errors::TransportError;

/// Outcome of attempting a fire-and-forget teardown send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeepaliveDispatch {
    /// The send was handed off; it will be attempted even if the caller
    /// disappears immediately. The outcome is unobservable.
    Dispatched,
    /// No fire-and-forget primitive is available in this context; the
    /// caller should fall back to an ordinary best-effort request.
    Unsupported,
}

/// Delivers event batches to the collector.
///
/// The collector contract is per-batch: a batch is accepted or rejected as
/// a whole, never per-event.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    /// Deliver a batch, awaiting the collector's answer.
    async fn deliver(&self, batch: &[EventRecord]) -> Result<(), TransportError>;

    /// Dispatch a batch without waiting for, or ever observing, the result.
    ///
    /// Used only at page-teardown moments. The default declines, which
    /// routes the caller to the ordinary best-effort fallback.
    fn deliver_keepalive(&self, batch: Vec<EventRecord>) -> KeepaliveDispatch {
        let _ = batch;
        KeepaliveDispatch::Unsupported
    }
}
