//! The delivery engine.
//!
//! Owns the event queue and the transport, and implements the flush
//! contract:
//!
//! - a flush drains the *entire* queue at call time and delivers it as one
//!   batch; events enqueued during an in-flight flush wait for the next
//!   cycle
//! - on failure the batch is reinserted at the queue front, so redelivery
//!   preserves original order ahead of newer events (at-least-once, with
//!   duplicates possible when a success response is lost)
//! - consecutive failures are spaced by capped exponential backoff; a
//!   forced flush (teardown, abandonment) bypasses the backoff gate
//! - the teardown path prefers the transport's fire-and-forget primitive
//!   and falls back to one ordinary best-effort request; its events are
//!   never requeued
//!
//! Flushes never overlap: they serialize on an async mutex. Reaching the
//! batch threshold on enqueue raises the flush signal the worker task
//! listens on, rather than flushing inline, so `enqueue` stays
//! non-blocking.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use hearth_core::backoff::{BackoffConfig, backoff_delay_ms};
use hearth_core::{Clock, EventRecord};
use hearth_transport::{DeliveryClient, KeepaliveDispatch};

use crate::queue::EventQueue;

/// Result of one flush attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The queue was empty.
    Idle,
    /// The batch was delivered and dropped from the queue.
    Delivered(usize),
    /// Delivery failed; the batch is back at the queue front.
    Failed {
        /// How many events were requeued.
        requeued: usize,
    },
    /// The backoff window from a previous failure is still open.
    Deferred,
}

#[derive(Debug, Default)]
struct RetryState {
    consecutive_failures: u32,
    not_before: Option<DateTime<Utc>>,
}

/// Buffers outgoing events and flushes them in batches.
pub struct DeliveryEngine {
    queue: Mutex<EventQueue>,
    client: Mutex<Arc<dyn DeliveryClient>>,
    clock: Arc<dyn Clock>,
    backoff: BackoffConfig,
    batch_size: usize,
    retry: Mutex<RetryState>,
    flush_gate: tokio::sync::Mutex<()>,
    flush_signal: Notify,
    force_pending: AtomicBool,
}

impl DeliveryEngine {
    /// Create an engine over the given transport.
    pub fn new(
        client: Arc<dyn DeliveryClient>,
        clock: Arc<dyn Clock>,
        batch_size: usize,
        backoff: BackoffConfig,
    ) -> Self {
        Self {
            queue: Mutex::new(EventQueue::new()),
            client: Mutex::new(client),
            clock,
            backoff,
            batch_size: batch_size.max(1),
            retry: Mutex::new(RetryState::default()),
            flush_gate: tokio::sync::Mutex::new(()),
            flush_signal: Notify::new(),
            force_pending: AtomicBool::new(false),
        }
    }

    /// Swap the delivery transport.
    pub fn set_client(&self, client: Arc<dyn DeliveryClient>) {
        *self.client.lock() = client;
    }

    /// Append an event; raises the flush signal at the batch threshold.
    pub fn enqueue(&self, record: EventRecord) -> usize {
        let len = self.queue.lock().enqueue(record);
        if len >= self.batch_size {
            self.flush_signal.notify_one();
        }
        len
    }

    /// Ask the worker to flush soon. `force` bypasses the backoff gate.
    pub fn request_flush(&self, force: bool) {
        if force {
            self.force_pending.store(true, Ordering::Release);
        }
        self.flush_signal.notify_one();
    }

    /// Wait until a flush is requested (threshold reached or explicit).
    pub async fn wait_for_signal(&self) {
        self.flush_signal.notified().await;
    }

    /// Consume a pending force request.
    pub fn take_force(&self) -> bool {
        self.force_pending.swap(false, Ordering::AcqRel)
    }

    /// Events currently waiting for delivery.
    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Consecutive failed flushes since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.retry.lock().consecutive_failures
    }

    /// Drain the queue and deliver it as one batch.
    pub async fn flush(&self, force: bool) -> FlushOutcome {
        let _gate = self.flush_gate.lock().await;

        if !force && self.in_backoff_window() {
            return FlushOutcome::Deferred;
        }

        let batch = self.queue.lock().drain_all();
        if batch.is_empty() {
            return FlushOutcome::Idle;
        }

        let batch = drop_unserializable(batch);
        if batch.is_empty() {
            return FlushOutcome::Delivered(0);
        }

        let client = self.client.lock().clone();
        match client.deliver(&batch).await {
            Ok(()) => {
                let delivered = batch.len();
                let mut retry = self.retry.lock();
                retry.consecutive_failures = 0;
                retry.not_before = None;
                debug!(delivered, "flush delivered");
                FlushOutcome::Delivered(delivered)
            }
            Err(e) => {
                let requeued = batch.len();
                self.queue.lock().requeue_front(batch);

                let mut retry = self.retry.lock();
                let delay_ms =
                    backoff_delay_ms(retry.consecutive_failures, &self.backoff, rand::random());
                retry.consecutive_failures += 1;
                retry.not_before = Some(
                    self.clock.now()
                        + Duration::milliseconds(i64::try_from(delay_ms).unwrap_or(i64::MAX)),
                );
                warn!(error = %e, requeued, failures = retry.consecutive_failures,
                    "flush failed; batch requeued at front");
                FlushOutcome::Failed { requeued }
            }
        }
    }

    /// Best-effort unordered teardown flush. Lost events are accepted.
    pub async fn flush_teardown(&self) {
        let _gate = self.flush_gate.lock().await;

        let batch = self.queue.lock().drain_all();
        if batch.is_empty() {
            return;
        }

        let batch = drop_unserializable(batch);
        if batch.is_empty() {
            return;
        }

        let client = self.client.lock().clone();
        match client.deliver_keepalive(batch.clone()) {
            KeepaliveDispatch::Dispatched => {
                debug!(count = batch.len(), "teardown batch dispatched");
            }
            KeepaliveDispatch::Unsupported => {
                if let Err(e) = client.deliver(&batch).await {
                    warn!(error = %e, lost = batch.len(), "teardown delivery failed; events lost");
                }
            }
        }
    }

    fn in_backoff_window(&self) -> bool {
        let retry = self.retry.lock();
        retry
            .not_before
            .is_some_and(|not_before| self.clock.now() < not_before)
    }
}

/// Drop events whose props cannot be serialized, keeping the rest.
fn drop_unserializable(batch: Vec<EventRecord>) -> Vec<EventRecord> {
    let before = batch.len();
    let batch: Vec<EventRecord> = batch
        .into_iter()
        .filter(|record| match serde_json::to_value(record) {
            Ok(_) => true,
            Err(e) => {
                warn!(event = %record.event_name, error = %e, "dropping unserializable event");
                false
            }
        })
        .collect();
    if batch.len() < before {
        warn!(dropped = before - batch.len(), "bad events removed from batch");
    }
    batch
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use hearth_core::{AnonymousId, ManualClock, SessionId};
    use hearth_transport::TransportError;
    use std::sync::atomic::AtomicUsize;

    fn record(name: &str) -> EventRecord {
        EventRecord {
            session_id: SessionId::from("s"),
            anon_id: AnonymousId::from("a"),
            user_id: None,
            event_name: name.to_owned(),
            event_props: serde_json::Map::new(),
            occurred_at: "2025-06-01T00:00:00.000Z".to_owned(),
        }
    }

    /// Transport double: records batches, fails the first `fail_first` calls.
    struct FakeClient {
        batches: Mutex<Vec<Vec<String>>>,
        keepalive_batches: Mutex<Vec<Vec<String>>>,
        fail_first: AtomicUsize,
        keepalive_supported: bool,
    }

    impl FakeClient {
        fn new() -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                keepalive_batches: Mutex::new(Vec::new()),
                fail_first: AtomicUsize::new(0),
                keepalive_supported: false,
            }
        }

        fn failing(times: usize) -> Self {
            let client = Self::new();
            client.fail_first.store(times, Ordering::SeqCst);
            client
        }

        fn with_keepalive() -> Self {
            Self {
                keepalive_supported: true,
                ..Self::new()
            }
        }

        fn delivered(&self) -> Vec<Vec<String>> {
            self.batches.lock().clone()
        }
    }

    #[async_trait::async_trait]
    impl DeliveryClient for FakeClient {
        async fn deliver(&self, batch: &[EventRecord]) -> Result<(), TransportError> {
            let remaining = self.fail_first.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_first.store(remaining - 1, Ordering::SeqCst);
                return Err(TransportError::Status(503));
            }
            self.batches
                .lock()
                .push(batch.iter().map(|r| r.event_name.clone()).collect());
            Ok(())
        }

        fn deliver_keepalive(&self, batch: Vec<EventRecord>) -> KeepaliveDispatch {
            if !self.keepalive_supported {
                return KeepaliveDispatch::Unsupported;
            }
            self.keepalive_batches
                .lock()
                .push(batch.iter().map(|r| r.event_name.clone()).collect());
            KeepaliveDispatch::Dispatched
        }
    }

    fn engine_with(client: Arc<FakeClient>, clock: &ManualClock) -> DeliveryEngine {
        DeliveryEngine::new(
            client,
            Arc::new(clock.clone()),
            20,
            BackoffConfig::default(),
        )
    }

    fn test_clock() -> ManualClock {
        ManualClock::starting_at(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn flush_empty_queue_is_idle() {
        let client = Arc::new(FakeClient::new());
        let engine = engine_with(client, &test_clock());
        assert_eq!(engine.flush(false).await, FlushOutcome::Idle);
    }

    #[tokio::test]
    async fn flush_delivers_whole_queue_in_order() {
        let client = Arc::new(FakeClient::new());
        let engine = engine_with(client.clone(), &test_clock());

        let _ = engine.enqueue(record("e1"));
        let _ = engine.enqueue(record("e2"));
        let _ = engine.enqueue(record("e3"));

        assert_eq!(engine.flush(false).await, FlushOutcome::Delivered(3));
        assert_eq!(engine.queue_len(), 0);
        assert_eq!(client.delivered(), vec![vec!["e1", "e2", "e3"]]);
    }

    #[tokio::test]
    async fn failed_batch_requeues_at_front() {
        let clock = test_clock();
        let client = Arc::new(FakeClient::failing(1));
        let engine = engine_with(client.clone(), &clock);

        let _ = engine.enqueue(record("e1"));
        let _ = engine.enqueue(record("e2"));
        let _ = engine.enqueue(record("e3"));

        assert_eq!(
            engine.flush(false).await,
            FlushOutcome::Failed { requeued: 3 }
        );
        assert_eq!(engine.queue_len(), 3);

        // An event enqueued before the retry lands behind the failed batch.
        let _ = engine.enqueue(record("e4"));

        clock.advance(Duration::seconds(5));
        assert_eq!(engine.flush(false).await, FlushOutcome::Delivered(4));
        assert_eq!(client.delivered(), vec![vec!["e1", "e2", "e3", "e4"]]);
    }

    #[tokio::test]
    async fn backoff_defers_until_window_passes() {
        let clock = test_clock();
        let client = Arc::new(FakeClient::failing(1));
        let engine = engine_with(client.clone(), &clock);

        let _ = engine.enqueue(record("e1"));
        assert_matches::assert_matches!(engine.flush(false).await, FlushOutcome::Failed { .. });
        assert_eq!(engine.consecutive_failures(), 1);

        // Immediately after the failure, the window is still open
        // (first-failure delay is at most 1.2s).
        assert_eq!(engine.flush(false).await, FlushOutcome::Deferred);
        assert_eq!(engine.queue_len(), 1);

        clock.advance(Duration::seconds(2));
        assert_eq!(engine.flush(false).await, FlushOutcome::Delivered(1));
        assert_eq!(engine.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn forced_flush_bypasses_backoff() {
        let clock = test_clock();
        let client = Arc::new(FakeClient::failing(1));
        let engine = engine_with(client.clone(), &clock);

        let _ = engine.enqueue(record("e1"));
        assert_matches::assert_matches!(engine.flush(false).await, FlushOutcome::Failed { .. });
        assert_eq!(engine.flush(true).await, FlushOutcome::Delivered(1));
    }

    #[tokio::test]
    async fn success_resets_failure_streak() {
        let clock = test_clock();
        let client = Arc::new(FakeClient::failing(2));
        let engine = engine_with(client.clone(), &clock);

        let _ = engine.enqueue(record("e1"));
        assert_matches::assert_matches!(engine.flush(true).await, FlushOutcome::Failed { .. });
        assert_matches::assert_matches!(engine.flush(true).await, FlushOutcome::Failed { .. });
        assert_eq!(engine.consecutive_failures(), 2);

        assert_eq!(engine.flush(true).await, FlushOutcome::Delivered(1));
        assert_eq!(engine.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn enqueue_signals_at_threshold() {
        let clock = test_clock();
        let client = Arc::new(FakeClient::new());
        let engine = Arc::new(DeliveryEngine::new(
            client,
            Arc::new(clock.clone()),
            3,
            BackoffConfig::default(),
        ));

        for i in 0..2 {
            let _ = engine.enqueue(record(&format!("e{i}")));
        }

        // Below threshold: no signal pending.
        let waiter = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.wait_for_signal().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        let _ = engine.enqueue(record("e3"));
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn request_flush_force_sets_pending_flag() {
        let client = Arc::new(FakeClient::new());
        let engine = engine_with(client, &test_clock());

        assert!(!engine.take_force());
        engine.request_flush(true);
        assert!(engine.take_force());
        // Consumed.
        assert!(!engine.take_force());
    }

    #[tokio::test]
    async fn teardown_prefers_keepalive() {
        let client = Arc::new(FakeClient::with_keepalive());
        let engine = engine_with(client.clone(), &test_clock());

        let _ = engine.enqueue(record("e1"));
        engine.flush_teardown().await;

        assert_eq!(engine.queue_len(), 0);
        assert_eq!(client.keepalive_batches.lock().clone(), vec![vec!["e1"]]);
        assert!(client.delivered().is_empty());
    }

    #[tokio::test]
    async fn teardown_falls_back_to_ordinary_send() {
        let client = Arc::new(FakeClient::new());
        let engine = engine_with(client.clone(), &test_clock());

        let _ = engine.enqueue(record("e1"));
        engine.flush_teardown().await;

        assert_eq!(client.delivered(), vec![vec!["e1"]]);
    }

    #[tokio::test]
    async fn teardown_failure_loses_events_without_requeue() {
        let client = Arc::new(FakeClient::failing(1));
        let engine = engine_with(client.clone(), &test_clock());

        let _ = engine.enqueue(record("e1"));
        engine.flush_teardown().await;

        assert_eq!(engine.queue_len(), 0, "teardown never requeues");
        assert!(client.delivered().is_empty());
    }

    #[tokio::test]
    async fn set_client_swaps_transport() {
        let first = Arc::new(FakeClient::new());
        let second = Arc::new(FakeClient::new());
        let engine = engine_with(first.clone(), &test_clock());

        engine.set_client(second.clone());
        let _ = engine.enqueue(record("e1"));
        assert_eq!(engine.flush(false).await, FlushOutcome::Delivered(1));

        assert!(first.delivered().is_empty());
        assert_eq!(second.delivered(), vec![vec!["e1"]]);
    }
}
