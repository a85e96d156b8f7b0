//! Outbound sync queue.
//!
//! Forwards local mutations to the [`SyncAdapter`] with debouncing,
//! last-write-wins coalescing and bounded retries.
//!
//! # Architecture
//!
//! The queue uses the pure [`JobTable`] / [`JobPhase`] machine from
//! sync-core and interprets its actions to perform the actual I/O:
//!
//! ```text
//! enqueue() → JobTable (one job per id) → DurableQueueStore
//!     ↓
//! per-id timer task ──sleep──▶ process() ──▶ SyncAdapter (with timeout)
//!                                  ↓
//!                        SyncStatusSink / NotificationSink
//! ```
//!
//! # Concurrency
//!
//! - Each id has at most one timer task (debounce or backoff). A timer is
//!   cancelled by removing its map entry; the task checks its generation
//!   after waking and does nothing if it was replaced.
//! - The processing set allows one delivery per id at a time. A second
//!   `process()` for the same id is a no-op.
//! - Suspension points: the timer sleep, the adapter call and persistence.
//!   None of them hold the table lock.
//! - If a job is replaced while its previous revision is in flight, the
//!   old outcome is dropped (revision mismatch) and the new revision is
//!   delivered once the old delivery returns.

use crate::adapter::{AdapterError, SyncAdapter, SyncRequest};
use crate::notify::{Notification, NotificationKind, NotificationSink};
use crate::queue_store::DurableQueueStore;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use hearth_sync_core::{JobAction, JobEvent, JobPhase, JobTable, RetryPolicy, Transition};
use hearth_sync_types::{Record, RecordId, RecordKind, SyncJob, SyncOperation, SyncOptions};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};

/// Queue errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The record kind is never forwarded to the provider.
    #[error("{kind:?} records are not synced to the provider ({id})")]
    NotSyncable {
        /// Record id.
        id: RecordId,
        /// Record kind.
        kind: RecordKind,
    },

    /// The options do not match the record kind.
    #[error("options for {options} do not match record {id}")]
    KindMismatch {
        /// Record id.
        id: RecordId,
        /// Resource kind named by the options.
        options: String,
    },
}

/// Receives the outcome of each job so it can be mirrored onto records.
#[async_trait]
pub trait SyncStatusSink: Send + Sync {
    /// The job was delivered.
    async fn synced(&self, job: &SyncJob, external_id: Option<String>);

    /// A replaced job was delivered; only its provider id is still useful.
    async fn external_id_assigned(&self, id: &RecordId, external_id: &str);

    /// The job ran out of retries.
    async fn exhausted(&self, job: &SyncJob, error: &str);
}

/// Timing knobs for the queue.
#[derive(Debug, Clone, Copy)]
pub struct QueueTiming {
    /// Quiet period before a job is delivered.
    pub debounce: Duration,
    /// Timeout for one adapter call.
    pub adapter_timeout: Duration,
    /// Retry bound and backoff.
    pub retry: RetryPolicy,
}

struct Timer {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

/// Outbound sync queue. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct OutboundQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    table: Mutex<JobTable>,
    store: DurableQueueStore,
    adapter: Arc<dyn SyncAdapter>,
    status: Arc<dyn SyncStatusSink>,
    notifier: Arc<dyn NotificationSink>,
    timers: DashMap<RecordId, Timer>,
    timer_generation: AtomicU64,
    processing: DashSet<RecordId>,
    persist_lock: Mutex<()>,
    debounce: Duration,
    adapter_timeout: Duration,
}

/// Holds an id in the processing set until dropped.
struct ProcessingGuard<'a> {
    set: &'a DashSet<RecordId>,
    id: RecordId,
}

impl<'a> ProcessingGuard<'a> {
    fn acquire(set: &'a DashSet<RecordId>, id: &RecordId) -> Option<Self> {
        set.insert(id.clone()).then(|| Self {
            set,
            id: id.clone(),
        })
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}

impl OutboundQueue {
    /// Create a queue.
    pub fn new(
        timing: QueueTiming,
        store: DurableQueueStore,
        adapter: Arc<dyn SyncAdapter>,
        status: Arc<dyn SyncStatusSink>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                table: Mutex::new(JobTable::new(timing.retry)),
                store,
                adapter,
                status,
                notifier,
                timers: DashMap::new(),
                timer_generation: AtomicU64::new(0),
                processing: DashSet::new(),
                persist_lock: Mutex::new(()),
                debounce: timing.debounce,
                adapter_timeout: timing.adapter_timeout,
            }),
        }
    }

    /// Queue a record for outbound sync.
    ///
    /// Replaces any job already queued for the same id (its retry count is
    /// reset), persists, and restarts the debounce timer.
    pub async fn enqueue(
        &self,
        payload: Record,
        operation: SyncOperation,
        options: SyncOptions,
    ) -> Result<(), QueueError> {
        let Some(kind) = payload.kind.resource_kind() else {
            return Err(QueueError::NotSyncable {
                id: payload.id.clone(),
                kind: payload.kind,
            });
        };
        if options.kind() != kind {
            return Err(QueueError::KindMismatch {
                id: payload.id.clone(),
                options: options.kind().to_string(),
            });
        }

        let job = SyncJob::new(payload, operation, options);
        let id = job.id.clone();
        self.inner.cancel_timer(&id);
        let revision = self.inner.table.lock().await.upsert(job);
        tracing::debug!(
            "Queued {:?} for {} (revision {}, debounce {:?})",
            operation,
            id,
            revision,
            self.inner.debounce
        );

        self.inner
            .schedule(id, revision, self.inner.debounce, JobEvent::TimerFired);
        self.inner.persist().await;
        Ok(())
    }

    /// Deliver the job for `id` now, skipping any pending timer.
    ///
    /// A no-op if the id is already being processed or has no job.
    pub async fn process_item(&self, id: &RecordId) {
        self.inner.cancel_timer(id);
        self.inner
            .process(id.clone(), None, JobEvent::TimerFired)
            .await;
    }

    /// Drop the job for `id` without sending it.
    ///
    /// Returns `true` if a job was removed.
    pub async fn cancel(&self, id: &RecordId) -> bool {
        self.inner.cancel_timer(id);
        let cancelled = self
            .inner
            .table
            .lock()
            .await
            .transition(id, None, JobEvent::Cancelled)
            .is_some();
        if cancelled {
            tracing::debug!("Cancelled queued sync for {}", id);
            self.inner.persist().await;
        }
        cancelled
    }

    /// Load persisted jobs and start delivering them.
    ///
    /// Jobs already queued since startup are newer and are kept. Returns
    /// the number of jobs restored.
    pub async fn restore(&self) -> usize {
        let persisted = self.inner.store.load().await;
        let mut restored = Vec::new();
        {
            let mut table = self.inner.table.lock().await;
            for (id, job) in persisted {
                if let Some(revision) = table.restore(job) {
                    restored.push((id, revision));
                }
            }
        }

        tracing::info!("Restored {} queued sync jobs", restored.len());
        let count = restored.len();
        for (id, revision) in restored {
            self.inner
                .schedule(id, revision, Duration::ZERO, JobEvent::TimerFired);
        }
        count
    }

    /// Deliver every parked or backing-off job now.
    ///
    /// Jobs still inside their debounce window or already in flight are
    /// left alone. Waits for the deliveries and returns how many were
    /// attempted.
    pub async fn drain(&self) -> usize {
        let due = self.inner.table.lock().await.drainable();
        let mut deliveries = JoinSet::new();
        for (id, revision) in due {
            self.inner.cancel_timer(&id);
            let inner = Arc::clone(&self.inner);
            deliveries.spawn(async move {
                inner
                    .process(id, Some(revision), JobEvent::DrainRequested)
                    .await
            });
        }

        let count = deliveries.len();
        if count > 0 {
            tracing::debug!("Draining {} queued sync jobs", count);
        }
        while deliveries.join_next().await.is_some() {}
        count
    }

    /// All queued jobs in id order.
    pub async fn pending_jobs(&self) -> Vec<SyncJob> {
        self.inner.table.lock().await.jobs().cloned().collect()
    }

    /// The job queued for `id`, if any.
    pub async fn job(&self, id: &RecordId) -> Option<SyncJob> {
        self.inner
            .table
            .lock()
            .await
            .get(id)
            .map(|entry| entry.job.clone())
    }

    /// Phase of the job queued for `id`, if any.
    pub async fn phase(&self, id: &RecordId) -> Option<JobPhase> {
        self.inner
            .table
            .lock()
            .await
            .get(id)
            .map(|entry| entry.phase.clone())
    }

    /// Ids with a delete job queued but not confirmed.
    pub async fn pending_delete_ids(&self) -> BTreeSet<RecordId> {
        self.inner.table.lock().await.pending_delete_ids()
    }

    /// Check whether a delivery for `id` is in flight.
    pub fn is_processing(&self, id: &RecordId) -> bool {
        self.inner.processing.contains(id)
    }

    /// Number of queued jobs.
    pub async fn len(&self) -> usize {
        self.inner.table.lock().await.len()
    }

    /// Check if the queue is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.table.lock().await.is_empty()
    }

    /// Abort every timer. Persisted jobs resume on the next `restore()`.
    pub fn shutdown(&self) {
        let ids: Vec<RecordId> = self
            .inner
            .timers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for id in &ids {
            self.inner.cancel_timer(id);
        }
        tracing::info!("Outbound queue stopped ({} timers aborted)", ids.len());
    }
}

impl std::fmt::Debug for OutboundQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundQueue")
            .field("timers", &self.inner.timers.len())
            .field("processing", &self.inner.processing.len())
            .finish()
    }
}

impl QueueInner {
    /// Start a timer that feeds `event` to the job after `delay`.
    fn schedule(self: &Arc<Self>, id: RecordId, revision: u64, delay: Duration, event: JobEvent) {
        let generation = self.timer_generation.fetch_add(1, Ordering::Relaxed) + 1;
        // Register before spawning so the task always finds its entry.
        if let Some(previous) = self.timers.insert(
            id.clone(),
            Timer {
                generation,
                handle: None,
            },
        ) {
            if let Some(handle) = previous.handle {
                handle.abort();
            }
        }

        let inner = Arc::clone(self);
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !inner.clear_timer(&task_id, generation) {
                return;
            }
            inner.process(task_id, Some(revision), event).await;
        });

        if let Some(mut timer) = self.timers.get_mut(&id) {
            if timer.generation == generation {
                timer.handle = Some(handle);
            }
        }
    }

    /// Remove this task's own timer entry. `false` if it was cancelled or replaced.
    fn clear_timer(&self, id: &RecordId, generation: u64) -> bool {
        self.timers
            .remove_if(id, |_, timer| timer.generation == generation)
            .is_some()
    }

    fn cancel_timer(&self, id: &RecordId) {
        if let Some((_, timer)) = self.timers.remove(id) {
            if let Some(handle) = timer.handle {
                handle.abort();
            }
        }
    }

    async fn process(self: &Arc<Self>, id: RecordId, revision: Option<u64>, event: JobEvent) {
        {
            let Some(_guard) = ProcessingGuard::acquire(&self.processing, &id) else {
                tracing::debug!("Sync for {} already in flight; skipping", id);
                return;
            };
            self.deliver(&id, revision, event).await;
        }
        self.kick_if_stranded(&id).await;
    }

    async fn deliver(self: &Arc<Self>, id: &RecordId, revision: Option<u64>, event: JobEvent) {
        let (request, revision, attempt) = {
            let mut table = self.table.lock().await;
            let Some(start) = table.transition(id, revision, event) else {
                return;
            };
            if !start.should_deliver() {
                return;
            }
            if !self.adapter.is_available() {
                table.transition(id, Some(start.revision), JobEvent::Unavailable);
                tracing::debug!("Sync adapter unavailable; parked job for {}", id);
                return;
            }
            (SyncRequest::from_job(&start.job), start.revision, start.job.retry_count + 1)
        };

        tracing::debug!(
            "Delivering {:?} {} {} (attempt {})",
            request.operation,
            request.kind,
            id,
            attempt
        );
        let result =
            match tokio::time::timeout(self.adapter_timeout, self.adapter.sync_resource(&request))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(AdapterError::Timeout),
            };

        let (outcome, external_id) = match result {
            Ok(receipt) => (JobEvent::DeliverySucceeded, receipt.external_id),
            Err(e) => (
                JobEvent::DeliveryFailed {
                    error: e.to_string(),
                    retryable: e.is_retryable(),
                },
                None,
            ),
        };

        let transition = {
            let mut table = self.table.lock().await;
            let transition = table.transition(id, Some(revision), outcome);
            if transition.is_none() {
                if let Some(external_id) = &external_id {
                    table.patch_external_id(id, external_id);
                }
            }
            transition
        };

        match transition {
            Some(transition) => self.apply(id, transition, external_id).await,
            None => {
                tracing::debug!("Outcome for replaced or cancelled job {} dropped", id);
                if let Some(external_id) = external_id {
                    self.status.external_id_assigned(id, &external_id).await;
                }
            }
        }
    }

    async fn apply(self: &Arc<Self>, id: &RecordId, transition: Transition, external_id: Option<String>) {
        match &transition.phase {
            JobPhase::Done => tracing::debug!("Synced {}", id),
            JobPhase::Retrying { retry_count } => {
                tracing::warn!("Sync attempt for {} failed; retry {} scheduled", id, retry_count)
            }
            JobPhase::Parked => {
                tracing::warn!("Sync for {} parked until the provider is ready", id)
            }
            JobPhase::Exhausted => {
                tracing::error!("Sync for {} failed permanently; job removed", id)
            }
            _ => {}
        }

        let mut external_id = external_id;
        for action in &transition.actions {
            match action {
                JobAction::Persist => self.persist().await,
                JobAction::MarkSynced => {
                    self.status
                        .synced(&transition.job, external_id.take())
                        .await
                }
                JobAction::ScheduleRetry { delay } => self.schedule(
                    id.clone(),
                    transition.revision,
                    *delay,
                    JobEvent::TimerFired,
                ),
                JobAction::RecordError { message } => {
                    self.status.exhausted(&transition.job, message).await
                }
                JobAction::NotifyExhausted { attempts, error } => {
                    let name = transition
                        .job
                        .payload
                        .title()
                        .map(str::to_owned)
                        .unwrap_or_else(|| id.to_string());
                    self.notifier.notify(Notification::new(
                        NotificationKind::Error,
                        format!("Could not sync {}", transition.job.kind),
                        format!("\"{}\" failed after {} attempts: {}", name, attempts, error),
                    ));
                }
                JobAction::Deliver | JobAction::RemoveJob | JobAction::IncrementRetry => {}
            }
        }
    }

    /// Deliver a job whose timer fired while an older revision was in flight.
    async fn kick_if_stranded(self: &Arc<Self>, id: &RecordId) {
        let stranded = self.table.lock().await.get(id).and_then(|entry| {
            matches!(entry.phase, JobPhase::Debouncing | JobPhase::Retrying { .. })
                .then_some(entry.revision)
        });
        if let Some(revision) = stranded {
            if !self.timers.contains_key(id) {
                tracing::debug!("Delivering newer revision of {} now", id);
                self.schedule(id.clone(), revision, Duration::ZERO, JobEvent::TimerFired);
            }
        }
    }

    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let jobs: Vec<SyncJob> = self.table.lock().await.jobs().cloned().collect();
        if let Err(e) = self.store.save(&jobs).await {
            tracing::warn!("Failed to persist outbound queue: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MockAdapter;
    use crate::notify::RecordingSink;
    use crate::storage::{MemoryStore, StateStore};
    use hearth_sync_types::persisted::QUEUE_STORAGE_KEY;
    use hearth_sync_types::{OwnerId, ResourceKind};
    use serde_json::json;

    #[derive(Default)]
    struct RecordingStatus {
        synced: std::sync::Mutex<Vec<(RecordId, Option<String>)>>,
        assigned: std::sync::Mutex<Vec<(RecordId, String)>>,
        exhausted: std::sync::Mutex<Vec<(RecordId, String)>>,
    }

    #[async_trait]
    impl SyncStatusSink for RecordingStatus {
        async fn synced(&self, job: &SyncJob, external_id: Option<String>) {
            self.synced.lock().unwrap().push((job.id.clone(), external_id));
        }

        async fn external_id_assigned(&self, id: &RecordId, external_id: &str) {
            self.assigned
                .lock()
                .unwrap()
                .push((id.clone(), external_id.to_string()));
        }

        async fn exhausted(&self, job: &SyncJob, error: &str) {
            self.exhausted
                .lock()
                .unwrap()
                .push((job.id.clone(), error.to_string()));
        }
    }

    struct Harness {
        queue: OutboundQueue,
        adapter: MockAdapter,
        status: Arc<RecordingStatus>,
        sink: RecordingSink,
        backend: MemoryStore,
    }

    fn timing() -> QueueTiming {
        QueueTiming {
            debounce: Duration::from_secs(3),
            adapter_timeout: Duration::from_secs(30),
            retry: RetryPolicy::new(3, Duration::from_secs(5), Duration::from_secs(60)),
        }
    }

    fn harness_with(backend: MemoryStore) -> Harness {
        let adapter = MockAdapter::new();
        let status = Arc::new(RecordingStatus::default());
        let sink = RecordingSink::new();
        let queue = OutboundQueue::new(
            timing(),
            DurableQueueStore::new(Arc::new(backend.clone())),
            Arc::new(adapter.clone()),
            status.clone(),
            Arc::new(sink.clone()),
        );
        Harness {
            queue,
            adapter,
            status,
            sink,
            backend,
        }
    }

    fn harness() -> Harness {
        harness_with(MemoryStore::new())
    }

    fn task(id: &str, title: &str) -> Record {
        let mut record = Record::new(OwnerId::new("u1"), RecordKind::Task, json!({ "title": title }));
        record.id = RecordId::from(id);
        record
    }

    fn task_options() -> SyncOptions {
        SyncOptions::default_for(ResourceKind::Task)
    }

    async fn enqueue(h: &Harness, id: &str, title: &str) {
        h.queue
            .enqueue(task(id, title), SyncOperation::Upsert, task_options())
            .await
            .unwrap();
    }

    async fn advance(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    // ===========================================
    // Debounce and coalescing
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn five_rapid_edits_produce_one_call_with_last_payload() {
        let h = harness();

        for n in 1..=5 {
            enqueue(&h, "t1", &format!("edit {n}")).await;
            tokio::time::sleep(Duration::from_millis(400)).await;
        }
        assert_eq!(h.adapter.call_count(), 0, "still inside the debounce window");

        advance(10).await;

        let requests = h.adapter.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].payload.title(), Some("edit 5"));
        assert!(h.queue.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_window_is_respected() {
        let h = harness();
        enqueue(&h, "t1", "a").await;

        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert_eq!(h.adapter.call_count(), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(h.adapter.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_ids_are_delivered_independently() {
        let h = harness();
        enqueue(&h, "a", "a").await;
        enqueue(&h, "b", "b").await;

        advance(5).await;

        assert_eq!(h.adapter.calls_for(&RecordId::from("a")), 1);
        assert_eq!(h.adapter.calls_for(&RecordId::from("b")), 1);
    }

    #[tokio::test]
    async fn notes_are_rejected() {
        let h = harness();
        let mut note = task("n1", "note");
        note.kind = RecordKind::Note;

        let err = h
            .queue
            .enqueue(note, SyncOperation::Upsert, task_options())
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::NotSyncable { .. }));
    }

    #[tokio::test]
    async fn mismatched_options_are_rejected() {
        let h = harness();

        let err = h
            .queue
            .enqueue(
                task("t1", "t"),
                SyncOperation::Upsert,
                SyncOptions::default_for(ResourceKind::Event),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::KindMismatch { .. }));
    }

    // ===========================================
    // Success, retries and exhaustion
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn success_removes_job_and_reports_external_id() {
        let h = harness();
        enqueue(&h, "t1", "a").await;

        advance(5).await;

        assert!(h.queue.is_empty().await);
        let synced = h.status.synced.lock().unwrap().clone();
        assert_eq!(
            synced,
            vec![(RecordId::from("t1"), Some("ext-1".to_string()))]
        );
        let persisted = h.backend.get_raw(QUEUE_STORAGE_KEY).unwrap();
        assert!(persisted.contains(r#""jobs":[]"#));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_retries_after_linear_backoff() {
        let h = harness();
        h.adapter.fail_next(AdapterError::Transient("503".into()));
        enqueue(&h, "t1", "a").await;

        advance(4).await;
        assert_eq!(h.adapter.call_count(), 1);
        let job = h.queue.job(&RecordId::from("t1")).await.unwrap();
        assert_eq!(job.retry_count, 1);

        advance(3).await;
        assert_eq!(h.adapter.call_count(), 1, "backoff is 5s");

        advance(2).await;
        assert_eq!(h.adapter.call_count(), 2);
        assert!(h.queue.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_job_is_attempted_max_retries_plus_one_times() {
        let h = harness();
        h.adapter
            .fail_always(Some(AdapterError::Transient("provider down".into())));
        enqueue(&h, "t1", "standup").await;

        advance(120).await;

        assert_eq!(h.adapter.call_count(), 4);
        assert!(h.queue.is_empty().await);
        let exhausted = h.status.exhausted.lock().unwrap().clone();
        assert_eq!(exhausted.len(), 1);
        assert!(exhausted[0].1.contains("provider down"));
        let errors = h.sink.of_kind(NotificationKind::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("4 attempts"));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_count_never_decreases_until_removal() {
        let h = harness();
        h.adapter.fail_always(Some(AdapterError::Timeout));
        enqueue(&h, "t1", "a").await;
        let id = RecordId::from("t1");

        let mut last = 0;
        for _ in 0..40 {
            advance(1).await;
            match h.queue.job(&id).await {
                Some(job) => {
                    assert!(job.retry_count >= last);
                    last = job.retry_count;
                }
                None => break,
            }
        }
        assert_eq!(last, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_adapter_times_out_as_transient_failure() {
        let h = harness();
        h.adapter.set_delay(Some(Duration::from_secs(60)));
        enqueue(&h, "t1", "a").await;

        advance(3 + 30 + 1).await;

        let job = h.queue.job(&RecordId::from("t1")).await.unwrap();
        assert_eq!(job.retry_count, 1);
    }

    // ===========================================
    // Parking (unavailable / precondition)
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn unavailable_adapter_parks_without_consuming_retry() {
        let h = harness();
        h.adapter.set_available(false);
        enqueue(&h, "t1", "a").await;

        advance(30).await;

        let id = RecordId::from("t1");
        assert_eq!(h.adapter.call_count(), 0);
        assert_eq!(h.queue.phase(&id).await, Some(JobPhase::Parked));
        assert_eq!(h.queue.job(&id).await.unwrap().retry_count, 0);

        h.adapter.set_available(true);
        assert_eq!(h.queue.drain().await, 1);

        assert_eq!(h.adapter.call_count(), 1);
        assert!(h.queue.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn precondition_failure_parks_without_notification() {
        let h = harness();
        h.adapter
            .fail_next(AdapterError::Precondition("calendar revoked".into()));
        enqueue(&h, "t1", "a").await;

        advance(30).await;

        let id = RecordId::from("t1");
        assert_eq!(h.adapter.call_count(), 1);
        assert_eq!(h.queue.phase(&id).await, Some(JobPhase::Parked));
        assert_eq!(h.queue.job(&id).await.unwrap().retry_count, 0);
        assert!(h.sink.notifications().is_empty());
    }

    // ===========================================
    // Drain, cancel, restore
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn drain_preempts_backoff_but_skips_debouncing() {
        let h = harness();
        h.adapter.fail_next(AdapterError::Transient("503".into()));
        enqueue(&h, "retrying", "a").await;
        advance(4).await;
        enqueue(&h, "debouncing", "b").await;

        let drained = h.queue.drain().await;

        assert_eq!(drained, 1);
        assert_eq!(h.adapter.calls_for(&RecordId::from("retrying")), 2);
        assert_eq!(h.adapter.calls_for(&RecordId::from("debouncing")), 0);
        assert!(h.queue.job(&RecordId::from("retrying")).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff_drops_job() {
        let h = harness();
        h.adapter.fail_next(AdapterError::Transient("503".into()));
        enqueue(&h, "t1", "a").await;
        advance(4).await;

        assert!(h.queue.cancel(&RecordId::from("t1")).await);
        advance(60).await;

        assert_eq!(h.adapter.call_count(), 1);
        assert!(h.queue.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_debounce_sends_nothing() {
        let h = harness();
        enqueue(&h, "t1", "a").await;

        h.queue.cancel(&RecordId::from("t1")).await;
        advance(10).await;

        assert_eq!(h.adapter.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restored_jobs_are_processed_immediately() {
        let backend = MemoryStore::new();
        {
            let h = harness_with(backend.clone());
            h.adapter.set_available(false);
            enqueue(&h, "t1", "offline edit").await;
            advance(5).await;
            h.queue.shutdown();
        }

        let h = harness_with(backend);
        assert_eq!(h.queue.restore().await, 1);
        tokio::task::yield_now().await;
        advance(1).await;

        let requests = h.adapter.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].payload.title(), Some("offline edit"));
    }

    #[tokio::test]
    async fn corrupt_persisted_queue_restores_nothing() {
        let h = harness();
        h.backend
            .write(QUEUE_STORAGE_KEY, "definitely not json")
            .await
            .unwrap();

        assert_eq!(h.queue.restore().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_delete_ids_track_delete_jobs() {
        let h = harness();
        h.queue
            .enqueue(task("gone", "x"), SyncOperation::Delete, task_options())
            .await
            .unwrap();
        enqueue(&h, "kept", "y").await;

        let ids = h.queue.pending_delete_ids().await;

        assert_eq!(ids.len(), 1);
        assert!(ids.contains(&RecordId::from("gone")));
    }

    // ===========================================
    // Mutual exclusion and newer revisions
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn one_delivery_per_id_even_when_edited_mid_flight() {
        let h = harness();
        h.adapter.set_delay(Some(Duration::from_secs(10)));
        let id = RecordId::from("t1");

        enqueue(&h, "t1", "first").await;
        advance(4).await;
        assert!(h.queue.is_processing(&id));

        enqueue(&h, "t1", "second").await;
        advance(40).await;

        assert_eq!(h.adapter.max_in_flight_per_id(), 1);
        let requests = h.adapter.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].payload.title(), Some("second"));
        assert_eq!(
            requests[1].external_id(),
            Some("ext-1"),
            "newer revision reuses the provider id"
        );
        assert!(h.queue.is_empty().await);
        assert_eq!(h.status.assigned.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_process_item_calls_deliver_once() {
        let h = harness();
        h.adapter.set_delay(Some(Duration::from_secs(1)));
        enqueue(&h, "t1", "a").await;
        let id = RecordId::from("t1");

        tokio::join!(h.queue.process_item(&id), h.queue.process_item(&id));

        assert_eq!(h.adapter.call_count(), 1);
        assert_eq!(h.adapter.max_in_flight_per_id(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_pending_timers() {
        let h = harness();
        enqueue(&h, "t1", "a").await;

        h.queue.shutdown();
        advance(10).await;

        assert_eq!(h.adapter.call_count(), 0);
        assert_eq!(h.queue.len().await, 1, "job stays persisted for next start");
    }
}
