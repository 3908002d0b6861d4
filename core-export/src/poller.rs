//! # Status Poller
//!
//! Adaptive background polling of export job status.
//!
//! ## Overview
//!
//! The service offers no push channel for export progress, so the poller
//! periodically calls `get_export_status` for every tracked export and feeds
//! each report through [`Export::apply_status`]. A single dispatcher task owns
//! the schedule:
//!
//! - Checks live in a min-heap ordered by due time; equal due times run in
//!   the order they were scheduled.
//! - The first check for an export runs after `initial_delay`. Each follow-up
//!   delay is the previous one multiplied by `backoff_factor`, capped at
//!   `max_delay`, plus a random jitter so many exports submitted together do
//!   not poll in lockstep.
//! - A semaphore caps the number of status checks in flight at once across
//!   all exports.
//!
//! ## Tracking Lifetime
//!
//! Tracking ends when the export reaches a terminal status, when the caller
//! withdraws it, or when `max_total_wait` elapses. A timed-out export is NOT
//! failed: the remote job may well still be running, only the local polling
//! gives up. Withdrawal is cooperative: a check already in flight runs to
//! completion but its result is discarded.
//!
//! [`Export::apply_status`]: crate::export::Export::apply_status

use crate::error::{ExportError, Result};
use crate::events::{EventBus, ExportEvent, TranslationEvent};
use crate::export::{ExportId, ExportOutcome, StatusApplied};
use crate::retry::RetryPolicy;
use crate::store::EntityStore;
use rand::Rng;
use service_traits::{ExportStatusResponse, RemoteService};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

// ============================================================================
// Configuration
// ============================================================================

/// Scheduling parameters for the status poller.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Delay before the first status check of a newly tracked export.
    pub initial_delay: Duration,
    /// Upper bound for the backed-off delay between checks.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after every check.
    pub backoff_factor: f64,
    /// Maximum random addition to each backed-off delay.
    pub jitter: Duration,
    /// Total tracking time after which polling gives up on an export.
    pub max_total_wait: Duration,
    /// Maximum number of status checks in flight at once.
    pub max_in_flight: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            jitter: Duration::from_secs(1),
            max_total_wait: Duration::from_secs(30 * 60),
            max_in_flight: 4,
        }
    }
}

/// Why an export is, or is no longer, being polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingDisposition {
    /// The export is being polled.
    Tracked,
    /// Polling gave up after `max_total_wait`; the export stayed non-terminal.
    TimedOut,
    /// The export is not tracked: never tracked, finished, or withdrawn.
    Untracked,
}

/// Point-in-time counters for observing poller behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollerStats {
    /// Exports currently tracked.
    pub tracked: usize,
    /// Status checks currently in flight.
    pub in_flight: usize,
    /// Status checks dispatched since startup.
    pub checks_issued: u64,
    /// Check results discarded because tracking was withdrawn mid-flight.
    pub results_discarded: u64,
}

// ============================================================================
// Scheduling Queue
// ============================================================================

/// A pending status check for one export.
#[derive(Debug, Clone)]
struct ScheduledCheck {
    due_at: Instant,
    seq: u64,
    export_id: ExportId,
    /// Pre-jitter delay that produced `due_at`; input for the next backoff step.
    delay: Duration,
    tracked_since: Instant,
}

impl PartialEq for ScheduledCheck {
    fn eq(&self, other: &Self) -> bool {
        self.due_at == other.due_at && self.seq == other.seq
    }
}

impl Eq for ScheduledCheck {}

impl PartialOrd for ScheduledCheck {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledCheck {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.due_at
            .cmp(&other.due_at)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

#[derive(Debug, Default)]
struct CheckQueue {
    heap: BinaryHeap<Reverse<ScheduledCheck>>,
    next_seq: u64,
}

struct TrackedExport {
    cancel: CancellationToken,
    /// Stamp of the tracking session. Checks scheduled by an earlier
    /// session of the same export carry a different stamp and are dropped
    /// at dispatch.
    tracked_since: Instant,
}

// ============================================================================
// Status Poller
// ============================================================================

/// Background poller driving tracked exports to a terminal status.
///
/// Cloning is cheap; all clones share the same dispatcher task and schedule.
/// The dispatcher keeps running until [`StatusPoller::shutdown`] is called,
/// even if every handle is dropped.
#[derive(Clone)]
pub struct StatusPoller {
    inner: Arc<PollerInner>,
}

struct PollerInner {
    config: PollerConfig,
    retry: RetryPolicy,
    service: Arc<dyn RemoteService>,
    store: Arc<EntityStore>,
    events: EventBus,
    queue: Mutex<CheckQueue>,
    tracked: Mutex<HashMap<ExportId, TrackedExport>>,
    timed_out: Mutex<HashSet<ExportId>>,
    permits: Arc<Semaphore>,
    checks_issued: AtomicU64,
    results_discarded: AtomicU64,
    wake: Notify,
    shutdown: CancellationToken,
}

impl StatusPoller {
    /// Create a poller and spawn its dispatcher task.
    pub fn new(
        service: Arc<dyn RemoteService>,
        store: Arc<EntityStore>,
        events: EventBus,
        config: PollerConfig,
        retry: RetryPolicy,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
        let inner = Arc::new(PollerInner {
            config,
            retry,
            service,
            store,
            events,
            queue: Mutex::new(CheckQueue::default()),
            tracked: Mutex::new(HashMap::new()),
            timed_out: Mutex::new(HashSet::new()),
            permits,
            checks_issued: AtomicU64::new(0),
            results_discarded: AtomicU64::new(0),
            wake: Notify::new(),
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(Arc::clone(&inner).dispatch());

        Self { inner }
    }

    /// Start polling an export. The first check runs after `initial_delay`.
    ///
    /// Tracking an already tracked export is a no-op. Tracking one that
    /// previously timed out starts it over with a fresh time budget.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Shutdown`] once the poller has been shut down.
    #[instrument(skip(self))]
    pub async fn track(&self, export_id: ExportId) -> Result<()> {
        let now = Instant::now();

        {
            let mut tracked = self.inner.tracked.lock().await;
            // Checked under the tracked lock so a concurrent shutdown either
            // sees this entry while draining or rejects the call here.
            if self.inner.shutdown.is_cancelled() {
                return Err(ExportError::Shutdown);
            }
            if tracked.contains_key(&export_id) {
                debug!(export_id = %export_id, "Export already tracked");
                return Ok(());
            }
            tracked.insert(
                export_id.clone(),
                TrackedExport {
                    cancel: self.inner.shutdown.child_token(),
                    tracked_since: now,
                },
            );
        }
        self.inner.timed_out.lock().await.remove(&export_id);

        let delay = self.inner.config.initial_delay;
        debug!(
            export_id = %export_id,
            delay_ms = delay.as_millis() as u64,
            "Tracking export"
        );
        self.inner
            .push_check(export_id, now + delay, delay, now)
            .await;
        Ok(())
    }

    /// Withdraw tracking for an export without contacting the service.
    ///
    /// Returns `true` if the export was being polled (or sat in the timed-out
    /// set) and is now withdrawn, `false` if there was nothing to withdraw.
    /// A check already in flight will have its result discarded.
    #[instrument(skip(self))]
    pub async fn cancel(&self, export_id: &ExportId) -> bool {
        if !self.inner.withdraw(export_id).await {
            return false;
        }

        info!(export_id = %export_id, "Export tracking withdrawn");
        self.inner
            .events
            .emit(TranslationEvent::Export(ExportEvent::TrackingCancelled {
                export_id: export_id.to_string(),
            }))
            .ok();
        true
    }

    /// Whether and why an export is (not) being polled.
    pub async fn disposition(&self, export_id: &ExportId) -> TrackingDisposition {
        if self.inner.tracked.lock().await.contains_key(export_id) {
            return TrackingDisposition::Tracked;
        }
        if self.inner.timed_out.lock().await.contains(export_id) {
            return TrackingDisposition::TimedOut;
        }
        TrackingDisposition::Untracked
    }

    /// Current scheduling counters.
    pub async fn stats(&self) -> PollerStats {
        let tracked = self.inner.tracked.lock().await.len();
        PollerStats {
            tracked,
            in_flight: self
                .inner
                .config
                .max_in_flight
                .saturating_sub(self.inner.permits.available_permits()),
            checks_issued: self.inner.checks_issued.load(Ordering::Relaxed),
            results_discarded: self.inner.results_discarded.load(Ordering::Relaxed),
        }
    }

    /// Whether [`StatusPoller::shutdown`] has been called.
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Stop the dispatcher and withdraw every tracked export.
    ///
    /// Each tracked export gets a `TrackingCancelled` event so completion
    /// awaiters are released. In-flight check results are discarded. Calling
    /// this more than once is harmless.
    pub async fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        info!("Shutting down status poller");
        self.inner.shutdown.cancel();

        let drained: Vec<ExportId> = {
            let mut tracked = self.inner.tracked.lock().await;
            tracked.drain().map(|(export_id, _)| export_id).collect()
        };
        self.inner.queue.lock().await.heap.clear();

        for export_id in drained {
            self.inner
                .events
                .emit(TranslationEvent::Export(ExportEvent::TrackingCancelled {
                    export_id: export_id.to_string(),
                }))
                .ok();
        }
    }
}

impl fmt::Debug for StatusPoller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusPoller")
            .field("shutdown", &self.inner.shutdown.is_cancelled())
            .finish()
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

impl PollerInner {
    /// Dispatcher loop: sleep until the next check is due, pop everything
    /// due, and spawn a check task per export under the concurrency cap.
    async fn dispatch(self: Arc<Self>) {
        debug!("Status poll dispatcher started");
        'dispatch: loop {
            let next_due = {
                let queue = self.queue.lock().await;
                queue.heap.peek().map(|Reverse(check)| check.due_at)
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => break 'dispatch,
                // A schedule change may have moved the next due time forward
                _ = self.wake.notified() => continue 'dispatch,
                _ = wait_until(next_due) => {}
            }

            while let Some(check) = self.pop_due().await {
                let Some(token) = self.token_for(&check).await else {
                    // Withdrawn or re-tracked while queued
                    continue;
                };

                let permit = tokio::select! {
                    _ = self.shutdown.cancelled() => break 'dispatch,
                    permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break 'dispatch,
                    },
                };

                self.checks_issued.fetch_add(1, Ordering::Relaxed);
                tokio::spawn(Arc::clone(&self).run_check(check, token, permit));
            }
        }
        debug!("Status poll dispatcher stopped");
    }

    async fn pop_due(&self) -> Option<ScheduledCheck> {
        let mut queue = self.queue.lock().await;
        let now = Instant::now();
        match queue.heap.peek() {
            Some(Reverse(check)) if check.due_at <= now => {
                queue.heap.pop().map(|Reverse(check)| check)
            }
            _ => None,
        }
    }

    async fn token_for(&self, check: &ScheduledCheck) -> Option<CancellationToken> {
        let tracked = self.tracked.lock().await;
        tracked
            .get(&check.export_id)
            .filter(|entry| entry.tracked_since == check.tracked_since)
            .map(|entry| entry.cancel.clone())
    }

    /// One status check against the service, then application of the report.
    async fn run_check(
        self: Arc<Self>,
        check: ScheduledCheck,
        token: CancellationToken,
        permit: OwnedSemaphorePermit,
    ) {
        let export_id = check.export_id.clone();
        let result = {
            let service = Arc::clone(&self.service);
            let id = export_id.clone();
            self.retry
                .execute_read("get_export_status", move || {
                    let service = Arc::clone(&service);
                    let id = id.clone();
                    async move { service.get_export_status(id.as_str()).await }
                })
                .await
        };
        drop(permit);

        if token.is_cancelled() {
            self.results_discarded.fetch_add(1, Ordering::Relaxed);
            debug!(export_id = %export_id, "Discarding check result for withdrawn export");
            return;
        }

        match result {
            Ok(report) => self.apply_report(check, &report).await,
            Err(error @ ExportError::RemoteUnavailable { .. }) => {
                warn!(
                    export_id = %export_id,
                    error = %error,
                    "Status check exhausted retries, keeping export tracked"
                );
                self.reschedule(check).await;
            }
            Err(error) => {
                warn!(export_id = %export_id, error = %error, "Status check failed permanently");
                self.fail_locally(&export_id, error.to_string()).await;
            }
        }
    }

    async fn apply_report(&self, check: ScheduledCheck, report: &ExportStatusResponse) {
        let export_id = check.export_id.clone();
        let applied = self
            .store
            .update_export(&export_id, |export| export.apply_status(report))
            .await;

        match applied {
            Err(error) => {
                warn!(
                    export_id = %export_id,
                    error = %error,
                    "Tracked export missing from store, dropping it"
                );
                self.forget(&export_id).await;
            }
            Ok(StatusApplied::Terminal { outcome }) => {
                self.forget(&export_id).await;
                self.emit_outcome(outcome);
            }
            Ok(StatusApplied::Advanced { from, to }) => {
                debug!(export_id = %export_id, %from, %to, "Export status advanced");
                self.events
                    .emit(TranslationEvent::Export(ExportEvent::StatusChanged {
                        export_id: export_id.to_string(),
                        from,
                        to,
                    }))
                    .ok();
                self.reschedule(check).await;
            }
            Ok(StatusApplied::Unchanged) => {
                self.reschedule(check).await;
            }
            Ok(StatusApplied::Ignored { current }) if current.is_terminal() => {
                self.forget(&export_id).await;
            }
            Ok(StatusApplied::Ignored { current }) => {
                warn!(export_id = %export_id, %current, "Discarded stale status report");
                self.reschedule(check).await;
            }
        }
    }

    /// Fail the export with a local diagnostic and stop polling it.
    async fn fail_locally(&self, export_id: &ExportId, detail: String) {
        let applied = self
            .store
            .update_export(export_id, |export| export.mark_failed(detail))
            .await;
        self.forget(export_id).await;

        match applied {
            Ok(StatusApplied::Terminal { outcome }) => self.emit_outcome(outcome),
            Ok(_) => {}
            Err(error) => {
                warn!(export_id = %export_id, error = %error, "Could not record export failure");
            }
        }
    }

    fn emit_outcome(&self, outcome: ExportOutcome) {
        let event = match outcome {
            ExportOutcome::Completed {
                export_id,
                artifacts,
            } => {
                info!(export_id = %export_id, "Export completed");
                ExportEvent::Completed {
                    export_id: export_id.to_string(),
                    artifacts,
                }
            }
            ExportOutcome::Failed { export_id, detail } => {
                error!(export_id = %export_id, detail = %detail, "Export failed");
                ExportEvent::Failed {
                    export_id: export_id.to_string(),
                    detail,
                }
            }
        };
        self.events.emit(TranslationEvent::Export(event)).ok();
    }

    /// Queue the next check for an export, or give up once the total
    /// tracking time is spent.
    async fn reschedule(&self, check: ScheduledCheck) {
        let waited = check.tracked_since.elapsed();
        if waited >= self.config.max_total_wait {
            info!(
                export_id = %check.export_id,
                waited_secs = waited.as_secs(),
                "Export exceeded maximum tracking time, giving up polling"
            );
            self.forget(&check.export_id).await;
            self.timed_out
                .lock()
                .await
                .insert(check.export_id.clone());
            self.events
                .emit(TranslationEvent::Export(ExportEvent::TimedOut {
                    export_id: check.export_id.to_string(),
                    waited_secs: waited.as_secs(),
                }))
                .ok();
            return;
        }

        let delay = check
            .delay
            .mul_f64(self.config.backoff_factor.max(1.0))
            .min(self.config.max_delay);
        let due_at = Instant::now() + delay + self.sample_jitter();
        self.push_check(check.export_id, due_at, delay, check.tracked_since)
            .await;
    }

    fn sample_jitter(&self) -> Duration {
        let max_jitter = self.config.jitter.as_secs_f64();
        if max_jitter <= 0.0 {
            return Duration::ZERO;
        }
        let mut rng = rand::thread_rng();
        Duration::from_secs_f64(rng.gen_range(0.0..=max_jitter))
    }

    async fn push_check(
        &self,
        export_id: ExportId,
        due_at: Instant,
        delay: Duration,
        tracked_since: Instant,
    ) {
        {
            let mut queue = self.queue.lock().await;
            let seq = queue.next_seq;
            queue.next_seq += 1;
            queue.heap.push(Reverse(ScheduledCheck {
                due_at,
                seq,
                export_id,
                delay,
                tracked_since,
            }));
        }
        self.wake.notify_one();
    }

    async fn forget(&self, export_id: &ExportId) {
        self.tracked.lock().await.remove(export_id);
    }

    /// Remove an export from tracking, drop its queued checks, and clear it
    /// from the timed-out set. Returns whether anything was removed.
    async fn withdraw(&self, export_id: &ExportId) -> bool {
        let removed = {
            let mut tracked = self.tracked.lock().await;
            tracked.remove(export_id)
        };
        self.queue
            .lock()
            .await
            .heap
            .retain(|Reverse(check)| check.export_id != *export_id);
        let tombstoned = self.timed_out.lock().await.remove(export_id);

        match removed {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => tombstoned,
        }
    }
}

async fn wait_until(due: Option<Instant>) {
    match due {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportRequest;
    use crate::project::ProjectId;
    use async_trait::async_trait;
    use service_traits::{
        CreateExportRequest, CreateExportResponse, CreateProjectRequest, CreateProjectResponse,
        ExportArtifacts, ExportKind, ExportStatus, ServiceError,
    };
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use tokio::time::timeout;

    const RECV_BUDGET: Duration = Duration::from_secs(3600);

    /// Serves a scripted sequence of status responses, then repeats the last
    /// configured fallback. Records call concurrency for cap assertions.
    struct ScriptedStatus {
        responses: StdMutex<VecDeque<service_traits::Result<ExportStatusResponse>>>,
        fallback: ExportStatusResponse,
        delay: Duration,
        calls: AtomicU64,
        active: AtomicU64,
        peak_active: AtomicU64,
    }

    impl ScriptedStatus {
        fn new(responses: Vec<service_traits::Result<ExportStatusResponse>>) -> Arc<Self> {
            Self::with_delay(responses, Duration::ZERO)
        }

        fn with_delay(
            responses: Vec<service_traits::Result<ExportStatusResponse>>,
            delay: Duration,
        ) -> Arc<Self> {
            Arc::new(Self {
                responses: StdMutex::new(responses.into()),
                fallback: report("PROCESSING"),
                delay,
                calls: AtomicU64::new(0),
                active: AtomicU64::new(0),
                peak_active: AtomicU64::new(0),
            })
        }
    }

    #[async_trait]
    impl RemoteService for ScriptedStatus {
        async fn create_project(
            &self,
            _request: CreateProjectRequest,
        ) -> service_traits::Result<CreateProjectResponse> {
            unreachable!("poller tests never create projects")
        }

        async fn create_export(
            &self,
            _request: CreateExportRequest,
        ) -> service_traits::Result<CreateExportResponse> {
            unreachable!("poller tests never create exports")
        }

        async fn get_export_status(
            &self,
            _export_id: &str,
        ) -> service_traits::Result<ExportStatusResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_active.fetch_max(active, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);

            let next = self.responses.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(self.fallback.clone()))
        }

        async fn update_script_text(
            &self,
            _script_id: &str,
            _text: &str,
        ) -> service_traits::Result<()> {
            unreachable!("poller tests never touch scripts")
        }

        async fn regenerate_script_audio(&self, _script_id: &str) -> service_traits::Result<()> {
            unreachable!("poller tests never touch scripts")
        }
    }

    fn report(status: &str) -> ExportStatusResponse {
        ExportStatusResponse {
            status: status.to_string(),
            status_detail: None,
            artifacts: None,
            failure_reason: None,
        }
    }

    fn completed_with_video() -> ExportStatusResponse {
        ExportStatusResponse {
            artifacts: Some(ExportArtifacts {
                video_no_lipsync: Some("https://cdn.example.com/out.mp4".to_string()),
                ..Default::default()
            }),
            ..report("COMPLETED")
        }
    }

    fn test_config() -> PollerConfig {
        PollerConfig {
            jitter: Duration::ZERO,
            ..PollerConfig::default()
        }
    }

    fn pending_export(export_id: &str) -> crate::export::Export {
        ExportRequest::new(ProjectId::new("proj-1"), "en", ExportKind::InitialExport)
            .acknowledge(ExportId::new(export_id))
    }

    async fn fixture(
        service: Arc<ScriptedStatus>,
        config: PollerConfig,
        retry: RetryPolicy,
    ) -> (StatusPoller, Arc<EntityStore>, EventBus, ExportId) {
        let store = Arc::new(EntityStore::new());
        store.put_export(pending_export("exp-1")).await;
        let events = EventBus::new(100);
        let poller = StatusPoller::new(service, Arc::clone(&store), events.clone(), config, retry);
        (poller, store, events, ExportId::new("exp-1"))
    }

    async fn next_event(
        subscriber: &mut crate::events::Receiver<TranslationEvent>,
    ) -> TranslationEvent {
        timeout(RECV_BUDGET, subscriber.recv())
            .await
            .expect("no event within budget")
            .expect("event bus closed")
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_lifecycle_to_completion() {
        let service = ScriptedStatus::new(vec![Ok(report("PROCESSING")), Ok(completed_with_video())]);
        let (poller, store, events, export_id) =
            fixture(Arc::clone(&service), test_config(), RetryPolicy::default()).await;
        let mut subscriber = events.subscribe();

        poller.track(export_id.clone()).await.unwrap();

        assert_eq!(
            next_event(&mut subscriber).await,
            TranslationEvent::Export(ExportEvent::StatusChanged {
                export_id: "exp-1".to_string(),
                from: ExportStatus::Pending,
                to: ExportStatus::Processing,
            })
        );

        match next_event(&mut subscriber).await {
            TranslationEvent::Export(ExportEvent::Completed {
                export_id,
                artifacts,
            }) => {
                assert_eq!(export_id, "exp-1");
                assert_eq!(
                    artifacts.video_no_lipsync.as_deref(),
                    Some("https://cdn.example.com/out.mp4")
                );
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let export = store.get_export(&export_id).await.unwrap();
        assert_eq!(export.status, ExportStatus::Completed);
        assert!(export.completed_at.is_some());

        assert_eq!(
            poller.disposition(&export_id).await,
            TrackingDisposition::Untracked
        );
        let stats = poller.stats().await;
        assert_eq!(stats.checks_issued, 2);
        assert_eq!(stats.tracked, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_without_video_becomes_failure() {
        let service = ScriptedStatus::new(vec![Ok(report("COMPLETED"))]);
        let (poller, store, events, export_id) =
            fixture(service, test_config(), RetryPolicy::default()).await;
        let mut subscriber = events.subscribe();

        poller.track(export_id.clone()).await.unwrap();

        match next_event(&mut subscriber).await {
            TranslationEvent::Export(ExportEvent::Failed { detail, .. }) => {
                assert!(detail.contains("without a translated video"), "{detail}");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        let export = store.get_export(&export_id).await.unwrap();
        assert_eq!(export.status, ExportStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrecognized_status_token_becomes_failure() {
        let service = ScriptedStatus::new(vec![Ok(report("ARCHIVED"))]);
        let (poller, store, events, export_id) =
            fixture(service, test_config(), RetryPolicy::default()).await;
        let mut subscriber = events.subscribe();

        poller.track(export_id.clone()).await.unwrap();

        match next_event(&mut subscriber).await {
            TranslationEvent::Export(ExportEvent::Failed { detail, .. }) => {
                assert!(detail.contains("ARCHIVED"), "{detail}");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        let export = store.get_export(&export_id).await.unwrap();
        assert_eq!(export.status, ExportStatus::Failed);
        assert_eq!(
            poller.disposition(&export_id).await,
            TrackingDisposition::Untracked
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_regressing_report_is_discarded() {
        let service = ScriptedStatus::new(vec![
            Ok(report("PROCESSING")),
            Ok(report("PENDING")),
            Ok(completed_with_video()),
        ]);
        let (poller, store, events, export_id) =
            fixture(Arc::clone(&service), test_config(), RetryPolicy::default()).await;
        let mut subscriber = events.subscribe();

        poller.track(export_id.clone()).await.unwrap();

        assert!(matches!(
            next_event(&mut subscriber).await,
            TranslationEvent::Export(ExportEvent::StatusChanged {
                to: ExportStatus::Processing,
                ..
            })
        ));
        // The PENDING report produces no event; the next one is completion
        assert!(matches!(
            next_event(&mut subscriber).await,
            TranslationEvent::Export(ExportEvent::Completed { .. })
        ));

        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
        let export = store.get_export(&export_id).await.unwrap();
        assert_eq!(export.status, ExportStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_failure_carries_reason() {
        let service = ScriptedStatus::new(vec![Ok(ExportStatusResponse {
            failure_reason: Some("render pipeline crashed".to_string()),
            ..report("FAILED")
        })]);
        let (poller, store, events, export_id) =
            fixture(service, test_config(), RetryPolicy::default()).await;
        let mut subscriber = events.subscribe();

        poller.track(export_id.clone()).await.unwrap();

        match next_event(&mut subscriber).await {
            TranslationEvent::Export(ExportEvent::Failed { detail, .. }) => {
                assert_eq!(detail, "render pipeline crashed");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        let export = store.get_export(&export_id).await.unwrap();
        assert_eq!(export.failure_reason.as_deref(), Some("render pipeline crashed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_exhaustion_keeps_export_tracked() {
        let service = ScriptedStatus::new(vec![
            Err(ServiceError::Http {
                status: 503,
                message: "overloaded".to_string(),
            }),
            Ok(report("PROCESSING")),
        ]);
        let retry = RetryPolicy {
            max_retry_attempts: 0,
            ..RetryPolicy::default()
        };
        let (poller, _store, events, export_id) =
            fixture(Arc::clone(&service), test_config(), retry).await;
        let mut subscriber = events.subscribe();

        poller.track(export_id.clone()).await.unwrap();

        // The failed check reschedules instead of failing the export
        assert!(matches!(
            next_event(&mut subscriber).await,
            TranslationEvent::Export(ExportEvent::StatusChanged { .. })
        ));
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            poller.disposition(&export_id).await,
            TrackingDisposition::Tracked
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_marks_export_failed() {
        let service = ScriptedStatus::new(vec![Err(ServiceError::Http {
            status: 401,
            message: "token expired".to_string(),
        })]);
        let (poller, store, events, export_id) =
            fixture(service, test_config(), RetryPolicy::default()).await;
        let mut subscriber = events.subscribe();

        poller.track(export_id.clone()).await.unwrap();

        match next_event(&mut subscriber).await {
            TranslationEvent::Export(ExportEvent::Failed { detail, .. }) => {
                assert!(detail.contains("401"), "{detail}");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        let export = store.get_export(&export_id).await.unwrap();
        assert_eq!(export.status, ExportStatus::Failed);
        assert_eq!(
            poller.disposition(&export_id).await,
            TrackingDisposition::Untracked
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_first_check_skips_it() {
        let service = ScriptedStatus::new(vec![Ok(completed_with_video())]);
        let (poller, store, events, export_id) =
            fixture(Arc::clone(&service), test_config(), RetryPolicy::default()).await;
        let mut subscriber = events.subscribe();

        poller.track(export_id.clone()).await.unwrap();
        assert!(poller.cancel(&export_id).await);

        assert!(matches!(
            next_event(&mut subscriber).await,
            TranslationEvent::Export(ExportEvent::TrackingCancelled { .. })
        ));

        // Let the scheduled due time pass; the check must not run
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
        let export = store.get_export(&export_id).await.unwrap();
        assert_eq!(export.status, ExportStatus::Pending);

        // Nothing left to withdraw
        assert!(!poller.cancel(&export_id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_in_flight_result() {
        let service = ScriptedStatus::with_delay(
            vec![Ok(completed_with_video())],
            Duration::from_secs(10),
        );
        let (poller, store, events, export_id) =
            fixture(Arc::clone(&service), test_config(), RetryPolicy::default()).await;
        let _subscriber = events.subscribe();

        poller.track(export_id.clone()).await.unwrap();

        // First check starts at t=5s and sits in the slow service call
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
        assert!(poller.cancel(&export_id).await);

        // Check finishes at t=15s; its result must be thrown away
        tokio::time::sleep(Duration::from_secs(20)).await;
        let export = store.get_export(&export_id).await.unwrap();
        assert_eq!(export.status, ExportStatus::Pending);
        assert_eq!(poller.stats().await.results_discarded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrack_after_cancel_polls_on_a_single_schedule() {
        let service = ScriptedStatus::new(vec![]);
        let (poller, _store, _events, export_id) =
            fixture(Arc::clone(&service), test_config(), RetryPolicy::default()).await;

        poller.track(export_id.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(poller.cancel(&export_id).await);
        poller.track(export_id.clone()).await.unwrap();

        // Only the fresh schedule may poll: checks 5s, 15s and 35s after the
        // re-track. A check left queued by the first session would double
        // the rate.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
        assert_eq!(poller.stats().await.checks_issued, 3);
        assert_eq!(
            poller.disposition(&export_id).await,
            TrackingDisposition::Tracked
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_wait_exceeded_stops_polling_without_failing() {
        let service = ScriptedStatus::new(vec![]);
        let config = PollerConfig {
            max_total_wait: Duration::from_secs(12),
            ..test_config()
        };
        let (poller, store, events, export_id) =
            fixture(Arc::clone(&service), config, RetryPolicy::default()).await;
        let mut subscriber = events.subscribe();

        poller.track(export_id.clone()).await.unwrap();

        assert!(matches!(
            next_event(&mut subscriber).await,
            TranslationEvent::Export(ExportEvent::StatusChanged {
                to: ExportStatus::Processing,
                ..
            })
        ));
        match next_event(&mut subscriber).await {
            TranslationEvent::Export(ExportEvent::TimedOut { waited_secs, .. }) => {
                assert!(waited_secs >= 12, "waited only {waited_secs}s");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // Gave up polling, but the export is NOT failed
        let export = store.get_export(&export_id).await.unwrap();
        assert_eq!(export.status, ExportStatus::Processing);
        assert_eq!(
            poller.disposition(&export_id).await,
            TrackingDisposition::TimedOut
        );
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_withdraws_all_tracking() {
        let service = ScriptedStatus::new(vec![]);
        let (poller, store, events, export_id) =
            fixture(Arc::clone(&service), test_config(), RetryPolicy::default()).await;
        store.put_export(pending_export("exp-2")).await;
        let mut subscriber = events.subscribe();

        poller.track(export_id.clone()).await.unwrap();
        poller.track(ExportId::new("exp-2")).await.unwrap();

        poller.shutdown().await;
        assert!(poller.is_shutdown());

        let mut withdrawn = HashSet::new();
        for _ in 0..2 {
            match next_event(&mut subscriber).await {
                TranslationEvent::Export(ExportEvent::TrackingCancelled { export_id }) => {
                    withdrawn.insert(export_id);
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(
            withdrawn,
            HashSet::from(["exp-1".to_string(), "exp-2".to_string()])
        );

        assert!(matches!(
            poller.track(ExportId::new("exp-3")).await,
            Err(ExportError::Shutdown)
        ));
        // Second shutdown is a no-op
        poller.shutdown().await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_checks_respect_cap() {
        let service = ScriptedStatus::with_delay(
            vec![Ok(completed_with_video()); 6],
            Duration::from_secs(10),
        );
        let store = Arc::new(EntityStore::new());
        let events = EventBus::new(100);
        let config = PollerConfig {
            max_in_flight: 2,
            ..test_config()
        };
        let poller = StatusPoller::new(
            Arc::clone(&service) as Arc<dyn RemoteService>,
            Arc::clone(&store),
            events.clone(),
            config,
            RetryPolicy::default(),
        );
        let mut subscriber = events.subscribe();

        for i in 0..6 {
            let export_id = format!("exp-{i}");
            store.put_export(pending_export(&export_id)).await;
            poller.track(ExportId::new(export_id)).await.unwrap();
        }

        for _ in 0..6 {
            assert!(matches!(
                next_event(&mut subscriber).await,
                TranslationEvent::Export(ExportEvent::Completed { .. })
            ));
        }

        assert_eq!(service.calls.load(Ordering::SeqCst), 6);
        assert_eq!(service.peak_active.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_is_idempotent() {
        let service = ScriptedStatus::new(vec![]);
        let (poller, _store, events, export_id) =
            fixture(Arc::clone(&service), test_config(), RetryPolicy::default()).await;
        let _subscriber = events.subscribe();

        poller.track(export_id.clone()).await.unwrap();
        poller.track(export_id.clone()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
        assert_eq!(poller.stats().await.tracked, 1);
    }

    #[tokio::test]
    async fn test_check_queue_orders_by_due_time_then_seq() {
        let now = Instant::now();
        let mut heap = BinaryHeap::new();
        let check = |due_at: Instant, seq: u64| ScheduledCheck {
            due_at,
            seq,
            export_id: ExportId::new(format!("exp-{seq}")),
            delay: Duration::from_secs(5),
            tracked_since: now,
        };

        heap.push(Reverse(check(now + Duration::from_secs(10), 2)));
        heap.push(Reverse(check(now + Duration::from_secs(5), 1)));
        heap.push(Reverse(check(now + Duration::from_secs(5), 0)));
        heap.push(Reverse(check(now + Duration::from_secs(1), 3)));

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|Reverse(c)| c.seq)).collect();
        assert_eq!(order, vec![3, 0, 1, 2]);
    }
}
