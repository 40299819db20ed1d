//! The `Analytics` facade.
//!
//! One explicitly constructed instance per page load, injected into call
//! sites; no module-level singleton, no globals. [`Analytics::init`]
//! wires the injected storage, transport, and clock together and starts
//! the flush worker; [`Analytics::shutdown`] stops the worker and performs
//! the final teardown flush.
//!
//! Every tracker is non-blocking and infallible from the caller's
//! perspective: it validates/renews the session, attaches identity,
//! applies any dedup guard, enqueues, and returns a [`TrackStatus`] that
//! exists purely for diagnostics. Actual network delivery happens on the
//! worker task, off the caller's path.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use hearth_core::constants::{
    DEDUP_KIND_LISTING_IMPRESSION, DEDUP_KIND_LISTING_VIEW, EVENT_FILTER_APPLY,
    EVENT_LISTING_IMPRESSIONS, EVENT_LISTING_VIEW, EVENT_PAGE_VIEW, EVENT_POST_ABANDONED,
    EVENT_POST_STARTED, EVENT_POST_SUBMITTED, EVENT_POST_SUCCESS, EVENT_SEARCH_QUERY,
    EVENT_SESSION_END, EVENT_SESSION_START, FUNNEL_POST,
};
use hearth_core::{AttemptId, Clock, EventRecord, ListingId, SessionId, UserId};
use hearth_settings::TelemetrySettings;
use hearth_storage::KeyValueStorage;
use hearth_transport::DeliveryClient;

use crate::dedup::DedupStore;
use crate::delivery::{DeliveryEngine, FlushOutcome};
use crate::funnel::{FunnelTracker, FunnelTransition};
use crate::identity::IdentityStore;
use crate::session::{Session, SessionManager, SessionOutcome};
use crate::types::{ActivityKind, Diagnostics, TrackStatus};

struct PipelineInner {
    clock: Arc<dyn Clock>,
    identity: IdentityStore,
    sessions: Mutex<SessionManager>,
    dedup: DedupStore,
    funnel: Mutex<FunnelTracker>,
    delivery: DeliveryEngine,
}

/// The telemetry pipeline's public surface.
pub struct Analytics {
    inner: Arc<PipelineInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Analytics {
    /// Construct the pipeline and start its flush worker.
    ///
    /// Must be called from within a tokio runtime. `durable` holds the
    /// anonymous identifier across restarts; `ephemeral` holds per-tab
    /// session, dedup, and funnel state.
    pub fn init(
        settings: TelemetrySettings,
        durable: Arc<dyn KeyValueStorage>,
        ephemeral: Arc<dyn KeyValueStorage>,
        client: Arc<dyn DeliveryClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let inner = Arc::new(PipelineInner {
            clock: clock.clone(),
            identity: IdentityStore::new(durable),
            sessions: Mutex::new(SessionManager::new(
                ephemeral.clone(),
                clock.clone(),
                settings.session.idle_timeout_ms,
            )),
            dedup: DedupStore::new(ephemeral.clone()),
            funnel: Mutex::new(FunnelTracker::new(FUNNEL_POST, ephemeral)),
            delivery: DeliveryEngine::new(
                client,
                clock,
                settings.delivery.batch_size,
                settings.delivery.retry.clone(),
            ),
        });

        let worker = tokio::spawn(flush_worker(
            Arc::clone(&inner),
            settings.delivery.flush_interval_ms,
        ));

        Self {
            inner,
            worker: Mutex::new(Some(worker)),
        }
    }

    // ── Generic tracking ────────────────────────────────────────────────

    /// Track a named event with arbitrary props.
    ///
    /// Props must serialize to a JSON object (or null for none); anything
    /// else is dropped with a warning rather than failing the caller.
    pub fn track(&self, event_name: &str, props: impl Serialize) -> TrackStatus {
        let Some(props) = to_props(event_name, props) else {
            return TrackStatus::Skipped;
        };
        self.emit(event_name, props)
    }

    /// Track a page render.
    pub fn track_page_view(&self) -> TrackStatus {
        self.emit(EVENT_PAGE_VIEW, Map::new())
    }

    /// Track a listing detail view, at most once per session per listing.
    pub fn track_listing_view(&self, listing: &ListingId) -> TrackStatus {
        let session = self.touch_session();
        if !self.inner.dedup.check_and_set(
            &session.session_id,
            DEDUP_KIND_LISTING_VIEW,
            listing.as_str(),
        ) {
            return TrackStatus::Deduplicated;
        }

        let mut props = Map::new();
        let _ = props.insert("listing_id".to_owned(), json!(listing.as_str()));
        self.enqueue_record(
            session.session_id,
            EVENT_LISTING_VIEW,
            props,
            self.inner.clock.now(),
        );
        self.status()
    }

    /// Track listings that became visible, filtered to ids not yet seen
    /// this session. An empty filtered list enqueues nothing.
    pub fn track_listing_impression_batch(&self, listings: &[ListingId]) -> TrackStatus {
        let session = self.touch_session();

        let fresh: Vec<Value> = listings
            .iter()
            .filter(|listing| {
                self.inner.dedup.check_and_set(
                    &session.session_id,
                    DEDUP_KIND_LISTING_IMPRESSION,
                    listing.as_str(),
                )
            })
            .map(|listing| json!(listing.as_str()))
            .collect();

        if fresh.is_empty() {
            return TrackStatus::Skipped;
        }

        let mut props = Map::new();
        let _ = props.insert("listing_ids".to_owned(), Value::Array(fresh));
        self.enqueue_record(
            session.session_id,
            EVENT_LISTING_IMPRESSIONS,
            props,
            self.inner.clock.now(),
        );
        self.status()
    }

    /// Track applied search filters.
    pub fn track_filter_apply(&self, filters: impl Serialize) -> TrackStatus {
        let filters = match serde_json::to_value(filters) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "dropping filter_apply with unserializable filters");
                return TrackStatus::Skipped;
            }
        };
        let mut props = Map::new();
        let _ = props.insert("filters".to_owned(), filters);
        self.emit(EVENT_FILTER_APPLY, props)
    }

    /// Track a free-text search.
    pub fn track_search_query(&self, query: &str) -> TrackStatus {
        let mut props = Map::new();
        let _ = props.insert("query".to_owned(), json!(query));
        self.emit(EVENT_SEARCH_QUERY, props)
    }

    // ── Posting funnel ──────────────────────────────────────────────────

    /// Make sure a posting attempt exists for the current session.
    pub fn ensure_post_attempt(&self) -> AttemptId {
        let session = self.touch_session();
        self.inner.funnel.lock().ensure_attempt(&session.session_id)
    }

    /// Enter the posting funnel. Idempotent within an attempt.
    pub fn track_post_start(&self) -> TrackStatus {
        let session = self.touch_session();
        let transition = self.inner.funnel.lock().start(&session.session_id);
        match transition {
            FunnelTransition::Started { attempt_id } => {
                self.enqueue_funnel_event(session.session_id, EVENT_POST_STARTED, &attempt_id, None);
                self.status()
            }
            _ => TrackStatus::Skipped,
        }
    }

    /// Record the posting form submission. Idempotent within an attempt.
    pub fn track_post_submit(&self) -> TrackStatus {
        let session = self.touch_session();
        let transition = self.inner.funnel.lock().submit(&session.session_id);
        match transition {
            FunnelTransition::Submitted { attempt_id } => {
                self.enqueue_funnel_event(
                    session.session_id,
                    EVENT_POST_SUBMITTED,
                    &attempt_id,
                    None,
                );
                self.status()
            }
            _ => TrackStatus::Skipped,
        }
    }

    /// Record a confirmed submission and close the attempt.
    pub fn track_post_success(&self, result_id: &str) -> TrackStatus {
        let session = self.touch_session();
        let transition = self.inner.funnel.lock().success(&session.session_id);
        match transition {
            FunnelTransition::Succeeded { attempt_id } => {
                self.enqueue_funnel_event(
                    session.session_id,
                    EVENT_POST_SUCCESS,
                    &attempt_id,
                    Some(result_id),
                );
                self.status()
            }
            _ => TrackStatus::Skipped,
        }
    }

    /// Record abandonment from a page-teardown signal and close the
    /// attempt. Safe to call redundantly from multiple teardown signals.
    pub fn track_post_abandoned(&self) -> TrackStatus {
        let session = self.touch_session();
        let transition = self.inner.funnel.lock().abandon(&session.session_id);
        match transition {
            FunnelTransition::Abandoned { attempt_id } => {
                self.enqueue_funnel_event(
                    session.session_id,
                    EVENT_POST_ABANDONED,
                    &attempt_id,
                    None,
                );
                // Teardown context: do not wait for the periodic timer.
                self.inner.delivery.request_flush(true);
                self.status()
            }
            _ => TrackStatus::Skipped,
        }
    }

    // ── Identity & activity ─────────────────────────────────────────────

    /// Bind or clear the authenticated principal for subsequent events.
    pub fn set_user_id(&self, user: Option<UserId>) {
        self.inner.identity.set_user_id(user);
    }

    /// Passive activity observer entry point: renews the session, firing
    /// boundary events on rotation. Never blocks, never errors.
    pub fn on_activity(&self, kind: ActivityKind) {
        debug!(activity = kind.as_str(), "activity observed");
        let _ = self.touch_session();
    }

    // ── Delivery control ────────────────────────────────────────────────

    /// Swap the delivery transport (repeat-initialization analog).
    pub fn set_delivery_client(&self, client: Arc<dyn DeliveryClient>) {
        self.inner.delivery.set_client(client);
    }

    /// Flush immediately, bypassing the backoff gate.
    pub async fn flush_now(&self) -> FlushOutcome {
        self.inner.delivery.flush(true).await
    }

    /// Stop the flush worker and perform the final teardown flush.
    pub async fn shutdown(&self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
        self.inner.delivery.flush_teardown().await;
    }

    /// Snapshot of pipeline health.
    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            queue_depth: self.inner.delivery.queue_len(),
            consecutive_failures: self.inner.delivery.consecutive_failures(),
            storage_degraded: self.storage_degraded(),
            session_id: self.inner.sessions.lock().current_session_id(),
            user_bound: self.inner.identity.user_id().is_some(),
        }
    }

    // ── Internals ───────────────────────────────────────────────────────

    /// Validate/renew the session, emitting boundary events and clearing
    /// session-scoped state on rotation.
    fn touch_session(&self) -> Session {
        let outcome = self.inner.sessions.lock().ensure_session();
        match outcome {
            SessionOutcome::Started { session } => {
                self.enqueue_record(
                    session.session_id.clone(),
                    EVENT_SESSION_START,
                    Map::new(),
                    session.started_at,
                );
                session
            }
            SessionOutcome::Continued { session } => session,
            SessionOutcome::Rotated { ended, session } => {
                self.inner.dedup.clear_session(&ended.session_id);
                self.inner.funnel.lock().clear();
                self.enqueue_record(
                    ended.session_id,
                    EVENT_SESSION_END,
                    Map::new(),
                    ended.last_activity_at,
                );
                self.enqueue_record(
                    session.session_id.clone(),
                    EVENT_SESSION_START,
                    Map::new(),
                    session.started_at,
                );
                session
            }
        }
    }

    fn emit(&self, event_name: &str, props: Map<String, Value>) -> TrackStatus {
        let session = self.touch_session();
        self.enqueue_record(session.session_id, event_name, props, self.inner.clock.now());
        self.status()
    }

    fn enqueue_funnel_event(
        &self,
        session_id: SessionId,
        event_name: &str,
        attempt_id: &AttemptId,
        result_id: Option<&str>,
    ) {
        let mut props = Map::new();
        let _ = props.insert("attempt_id".to_owned(), json!(attempt_id.as_str()));
        if let Some(result_id) = result_id {
            let _ = props.insert("result_id".to_owned(), json!(result_id));
        }
        self.enqueue_record(session_id, event_name, props, self.inner.clock.now());
    }

    fn enqueue_record(
        &self,
        session_id: SessionId,
        event_name: &str,
        props: Map<String, Value>,
        occurred_at: DateTime<Utc>,
    ) {
        let record = EventRecord::new(
            session_id,
            self.inner.identity.anonymous_id(),
            self.inner.identity.user_id(),
            event_name,
            props,
            occurred_at,
        );
        let _ = self.inner.delivery.enqueue(record);
    }

    fn status(&self) -> TrackStatus {
        if self.storage_degraded() {
            TrackStatus::Degraded
        } else {
            TrackStatus::Tracked
        }
    }

    fn storage_degraded(&self) -> bool {
        self.inner.identity.is_degraded()
            || self.inner.sessions.lock().is_degraded()
            || self.inner.dedup.is_degraded()
            || self.inner.funnel.lock().is_degraded()
    }
}

impl Drop for Analytics {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
    }
}

/// Background task: flush on the periodic timer or on demand.
async fn flush_worker(inner: Arc<PipelineInner>, flush_interval_ms: u64) {
    let mut ticker =
        tokio::time::interval(std::time::Duration::from_millis(flush_interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of a tokio interval completes immediately; consume it
    // so the first real flush waits a full period or an explicit signal.
    let _ = ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            () = inner.delivery.wait_for_signal() => {}
        }
        let force = inner.delivery.take_force();
        let _ = inner.delivery.flush(force).await;
    }
}

/// Convert caller props into the open string-keyed map the wire expects.
fn to_props(event_name: &str, props: impl Serialize) -> Option<Map<String, Value>> {
    match serde_json::to_value(props) {
        Ok(Value::Object(map)) => Some(map),
        Ok(Value::Null) => Some(Map::new()),
        Ok(_) => {
            warn!(event = %event_name, "dropping event: props must be a string-keyed map");
            None
        }
        Err(e) => {
            warn!(event = %event_name, error = %e, "dropping event with unserializable props");
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use hearth_core::ManualClock;
    use hearth_storage::{MemoryStorage, UnavailableStorage};
    use hearth_transport::TransportError;

    /// Transport double recording every delivered batch.
    struct RecordingClient {
        batches: Mutex<Vec<Vec<EventRecord>>>,
    }

    impl RecordingClient {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(Vec::new()),
            })
        }

        fn event_names(&self) -> Vec<String> {
            self.batches
                .lock()
                .iter()
                .flatten()
                .map(|r| r.event_name.clone())
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl DeliveryClient for RecordingClient {
        async fn deliver(&self, batch: &[EventRecord]) -> Result<(), TransportError> {
            self.batches.lock().push(batch.to_vec());
            Ok(())
        }
    }

    fn test_clock() -> ManualClock {
        ManualClock::starting_at(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap())
    }

    fn quiet_settings() -> TelemetrySettings {
        let mut settings = TelemetrySettings::default();
        // Keep the timer out of the way; tests flush explicitly.
        settings.delivery.flush_interval_ms = 600_000;
        settings
    }

    fn pipeline(client: Arc<RecordingClient>, clock: &ManualClock) -> Analytics {
        Analytics::init(
            quiet_settings(),
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryStorage::new()),
            client,
            Arc::new(clock.clone()),
        )
    }

    #[tokio::test]
    async fn first_track_emits_session_start_then_event() {
        let client = RecordingClient::new();
        let clock = test_clock();
        let analytics = pipeline(client.clone(), &clock);

        assert_eq!(analytics.track_page_view(), TrackStatus::Tracked);
        let _ = analytics.flush_now().await;

        assert_eq!(client.event_names(), vec!["session_start", "page_view"]);
    }

    #[tokio::test]
    async fn track_attaches_identity() {
        let client = RecordingClient::new();
        let clock = test_clock();
        let analytics = pipeline(client.clone(), &clock);

        analytics.set_user_id(Some(UserId::from("user-7")));
        let _ = analytics.track_page_view();
        let _ = analytics.flush_now().await;

        let batches = client.batches.lock();
        let record = &batches[0][1];
        assert_eq!(record.user_id, Some(UserId::from("user-7")));
        assert!(!record.anon_id.as_str().is_empty());
        assert!(!record.session_id.as_str().is_empty());
    }

    #[tokio::test]
    async fn track_with_object_props_passes_them_through() {
        let client = RecordingClient::new();
        let clock = test_clock();
        let analytics = pipeline(client.clone(), &clock);

        let status = analytics.track("saved_search_created", json!({"region": "north"}));
        assert_eq!(status, TrackStatus::Tracked);
        let _ = analytics.flush_now().await;

        let batches = client.batches.lock();
        let record = &batches[0][1];
        assert_eq!(record.event_name, "saved_search_created");
        assert_eq!(record.event_props["region"], "north");
    }

    #[tokio::test]
    async fn track_with_non_object_props_is_skipped() {
        let client = RecordingClient::new();
        let clock = test_clock();
        let analytics = pipeline(client.clone(), &clock);

        assert_eq!(
            analytics.track("bad_event", json!([1, 2, 3])),
            TrackStatus::Skipped
        );
        let _ = analytics.flush_now().await;

        // Props are validated before any state changes, so not even a
        // session boundary was enqueued.
        assert!(client.event_names().is_empty());
    }

    #[tokio::test]
    async fn degraded_storage_reports_degraded_status() {
        let client = RecordingClient::new();
        let clock = test_clock();
        let analytics = Analytics::init(
            quiet_settings(),
            Arc::new(UnavailableStorage::new()),
            Arc::new(UnavailableStorage::new()),
            client.clone(),
            Arc::new(clock.clone()),
        );

        assert_eq!(analytics.track_page_view(), TrackStatus::Degraded);
        let _ = analytics.flush_now().await;

        // Degraded mode still tracks and delivers.
        assert_eq!(client.event_names(), vec!["session_start", "page_view"]);
        assert!(analytics.diagnostics().storage_degraded);
    }

    #[tokio::test]
    async fn diagnostics_reflects_queue_and_session() {
        let client = RecordingClient::new();
        let clock = test_clock();
        let analytics = pipeline(client.clone(), &clock);

        assert_eq!(analytics.diagnostics().queue_depth, 0);
        assert!(analytics.diagnostics().session_id.is_none());

        let _ = analytics.track_page_view();
        let diag = analytics.diagnostics();
        assert_eq!(diag.queue_depth, 2, "session_start + page_view");
        assert!(diag.session_id.is_some());
        assert!(!diag.user_bound);

        let _ = analytics.flush_now().await;
        assert_eq!(analytics.diagnostics().queue_depth, 0);
    }

    #[tokio::test]
    async fn shutdown_tears_down_remaining_events() {
        let client = RecordingClient::new();
        let clock = test_clock();
        let analytics = pipeline(client.clone(), &clock);

        let _ = analytics.track_page_view();
        analytics.shutdown().await;

        assert_eq!(client.event_names(), vec!["session_start", "page_view"]);
    }

    #[tokio::test]
    async fn set_delivery_client_swaps_transport() {
        let first = RecordingClient::new();
        let second = RecordingClient::new();
        let clock = test_clock();
        let analytics = pipeline(first.clone(), &clock);

        analytics.set_delivery_client(second.clone());
        let _ = analytics.track_page_view();
        let _ = analytics.flush_now().await;

        assert!(first.event_names().is_empty());
        assert_eq!(second.event_names(), vec!["session_start", "page_view"]);
    }
}
