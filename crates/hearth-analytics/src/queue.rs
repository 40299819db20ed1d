//! The ordered event buffer.
//!
//! A plain ordered buffer with no concurrent writers: the pipeline owns it
//! behind a mutex and flushes drain the whole thing at once. The one
//! non-obvious operation is [`EventQueue::requeue_front`]: a failed batch
//! goes back *ahead* of anything enqueued while the flush was in flight,
//! so redelivery preserves the original cross-batch order.

use std::collections::VecDeque;

use hearth_core::EventRecord;

/// Insertion-ordered buffer of undelivered events.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<EventRecord>,
}

impl EventQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Append an event, returning the new queue length.
    pub fn enqueue(&mut self, record: EventRecord) -> usize {
        self.events.push_back(record);
        self.events.len()
    }

    /// Take the current full contents of the queue, oldest first.
    pub fn drain_all(&mut self) -> Vec<EventRecord> {
        self.events.drain(..).collect()
    }

    /// Reinsert a failed batch at the front, preserving its internal order
    /// ahead of anything enqueued meanwhile.
    pub fn requeue_front(&mut self, batch: Vec<EventRecord>) {
        for record in batch.into_iter().rev() {
            self.events.push_front(record);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
