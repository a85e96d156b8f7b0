//! Sync engine facade.
//!
//! [`SyncEngine`] is the single entry point an application uses. It owns one
//! instance of every service and wires them together:
//!
//! ```text
//! save/delete ─▶ TombstoneLedger ─▶ LocalStore ─▶ OutboundQueue ─▶ SyncAdapter
//!                                        ▲               │
//! refresh ─▶ ReconciliationTrigger ─▶ MergeEngine   StatusPropagator
//!                    │                                   │
//!                    └──────────── RemoteStore ◀─────────┘
//! ```
//!
//! A record stays `unsynced` until the remote store holds a copy of it.
//! Writes the remote missed while offline are replayed at the start of every
//! refresh.
//!
//! Only [`SyncEngine::refresh`] and [`SyncEngine::on_reconnect`] return an
//! error. Every other failure is logged, recorded on the record's
//! `sync_error`, or reported through the [`NotificationSink`].

use crate::adapter::SyncAdapter;
use crate::config::SyncConfig;
use crate::local::LocalStore;
use crate::merge::MergeEngine;
use crate::notify::{Notification, NotificationKind, NotificationSink};
use crate::queue::{OutboundQueue, QueueTiming, SyncStatusSink};
use crate::queue_store::DurableQueueStore;
use crate::refresh::{spawn_refresh_task, FetchError, ReconciliationTrigger, Refresh, RefreshOutcome};
use crate::remote::{RemoteStore, SyncStatus};
use crate::storage::StateStore;
use crate::tombstones::TombstoneLedger;
use async_trait::async_trait;
use hearth_sync_core::{DueReminder, ReminderGate};
use hearth_sync_types::{now_millis, Record, RecordId, SyncJob, SyncOperation, SyncOptions};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

const FLUSH_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Mirrors queue outcomes onto the local and remote copies of a record.
struct StatusPropagator {
    local: Arc<LocalStore>,
    remote: Arc<dyn RemoteStore>,
}

impl StatusPropagator {
    async fn push_remote(&self, id: &RecordId, status: SyncStatus) {
        if let Err(e) = self.remote.update_sync_status(id, &status).await {
            tracing::warn!("Failed to update remote sync status for {}: {}", id, e);
        }
    }
}

#[async_trait]
impl SyncStatusSink for StatusPropagator {
    async fn synced(&self, job: &SyncJob, external_id: Option<String>) {
        if job.is_delete() {
            tracing::debug!("Provider resource for {} removed", job.id);
            return;
        }
        let status = SyncStatus::Synced {
            external_id: external_id.clone(),
        };
        let persisted = match self.remote.update_sync_status(&job.id, &status).await {
            Ok(()) => self.local.mark_synced(&job.id, external_id).await,
            Err(e) => {
                tracing::debug!("Remote has not confirmed {}, keeping it unsynced: {}", job.id, e);
                self.local.record_delivery(&job.id, external_id).await
            }
        };
        match persisted {
            Ok(true) => {}
            Ok(false) => tracing::debug!("Synced record {} no longer exists locally", job.id),
            Err(e) => tracing::warn!("Failed to persist sync success for {}: {}", job.id, e),
        }
    }

    async fn external_id_assigned(&self, id: &RecordId, external_id: &str) {
        if let Err(e) = self.local.set_external_id(id, external_id.to_string()).await {
            tracing::warn!("Failed to persist external id for {}: {}", id, e);
        }
    }

    async fn exhausted(&self, job: &SyncJob, error: &str) {
        if job.is_delete() {
            return;
        }
        match self.local.mark_sync_error(&job.id, error).await {
            Ok(true) => {
                self.push_remote(
                    &job.id,
                    SyncStatus::Failed {
                        error: error.to_string(),
                    },
                )
                .await
            }
            Ok(false) => {}
            Err(e) => tracing::warn!("Failed to persist sync error for {}: {}", job.id, e),
        }
    }
}

/// The local-first sync engine.
pub struct SyncEngine {
    config: SyncConfig,
    local: Arc<LocalStore>,
    ledger: Arc<TombstoneLedger>,
    queue: OutboundQueue,
    trigger: ReconciliationTrigger,
    remote: Arc<dyn RemoteStore>,
    notifier: Arc<dyn NotificationSink>,
    reminders: Mutex<ReminderGate>,
    refreshing: tokio::sync::Mutex<()>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Create an engine. Nothing is loaded until [`Self::start`].
    pub fn new(
        config: SyncConfig,
        state: Arc<dyn StateStore>,
        remote: Arc<dyn RemoteStore>,
        adapter: Arc<dyn SyncAdapter>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let local = Arc::new(LocalStore::new(state.clone()));
        let ledger = Arc::new(TombstoneLedger::new(state.clone()));
        let status = Arc::new(StatusPropagator {
            local: local.clone(),
            remote: remote.clone(),
        });
        let queue = OutboundQueue::new(
            QueueTiming {
                debounce: config.debounce,
                adapter_timeout: config.adapter_timeout,
                retry: config.retry_policy(),
            },
            DurableQueueStore::new(state),
            adapter,
            status,
            notifier.clone(),
        );
        let trigger = ReconciliationTrigger::new(
            remote.clone(),
            MergeEngine::new(local.clone(), ledger.clone()),
            queue.clone(),
            config.owner.clone(),
            config.page_size,
            config.max_pages,
        );
        let reminders = ReminderGate::new(config.reminder_horizon, config.reminder_capacity);

        Self {
            config,
            local,
            ledger,
            queue,
            trigger,
            remote,
            notifier,
            reminders: Mutex::new(reminders),
            refreshing: tokio::sync::Mutex::new(()),
            refresh_task: Mutex::new(None),
        }
    }

    /// Load persisted state, run the cold-start refresh, resume queued jobs
    /// and start the periodic refresh.
    ///
    /// A failed cold-start refresh is logged; the engine keeps serving the
    /// persisted view. Queued jobs resume after the refresh so their status
    /// updates land on replayed remote copies.
    pub async fn start(self: &Arc<Self>) {
        let tombstones = self.ledger.load().await;
        let records = self.local.load().await;
        tracing::info!(
            "Sync engine starting for {} ({} records, {} tombstones)",
            self.config.owner,
            records,
            tombstones
        );

        if let Err(e) = self.refresh().await {
            tracing::warn!("Cold-start refresh failed: {}", e);
        }
        self.queue.restore().await;

        let handle = spawn_refresh_task(self.clone(), self.config.refresh_interval);
        if let Some(previous) = self.task_slot().replace(handle) {
            previous.abort();
        }
    }

    /// Save a record with the default sync options for its kind.
    pub async fn save(&self, record: Record) -> Record {
        let options = record.kind.resource_kind().map(SyncOptions::default_for);
        self.save_inner(record, options).await
    }

    /// Save a record with explicit sync options.
    pub async fn save_with_options(&self, record: Record, options: SyncOptions) -> Record {
        self.save_inner(record, Some(options)).await
    }

    async fn save_inner(&self, mut record: Record, options: Option<SyncOptions>) -> Record {
        record.unsynced = true;
        record.updated_at = now_millis();

        // Saving a deleted id recreates it.
        if let Err(e) = self.ledger.remove(&record.id).await {
            tracing::warn!("Failed to persist lifted tombstone for {}: {}", record.id, e);
        }
        if let Err(e) = self.local.upsert_local(record.clone()).await {
            tracing::warn!("Failed to persist local save of {}: {}", record.id, e);
        }
        if let Err(e) = self.remote.upsert(&record).await {
            tracing::debug!("Remote upsert of {} deferred: {}", record.id, e);
        }
        if let Some(options) = options {
            if let Err(e) = self
                .queue
                .enqueue(record.clone(), SyncOperation::Upsert, options)
                .await
            {
                tracing::warn!("Not queued for provider sync: {}", e);
            }
        }
        record
    }

    /// Delete a record.
    ///
    /// The id is tombstoned before anything else so no concurrent refresh
    /// can bring it back. Returns `false` if no such record existed locally.
    pub async fn delete(&self, id: &RecordId) -> bool {
        if let Err(e) = self.ledger.add(id.clone()).await {
            tracing::warn!("Failed to persist tombstone for {}: {}", id, e);
        }

        let removed = match self.local.remove(id).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!("Failed to persist local delete of {}: {}", id, e);
                None
            }
        };
        let queued = self.queue.job(id).await;

        let known_to_provider = removed
            .as_ref()
            .and_then(|r| r.external_id.as_ref())
            .or_else(|| queued.as_ref().and_then(|j| j.payload.external_id.as_ref()))
            .is_some();
        let payload = removed.clone().or_else(|| queued.as_ref().map(|j| j.payload.clone()));

        match payload {
            Some(payload) if known_to_provider || self.queue.is_processing(id) => {
                self.enqueue_delete(payload, queued).await
            }
            _ => {
                self.queue.cancel(id).await;
            }
        }

        if let Err(e) = self.remote.delete(id).await {
            tracing::debug!("Remote delete of {} deferred: {}", id, e);
        }
        removed.is_some()
    }

    async fn enqueue_delete(&self, payload: Record, queued: Option<SyncJob>) {
        let Some(kind) = payload.kind.resource_kind() else {
            return;
        };
        let options = queued
            .map(|job| job.options)
            .filter(|options| options.kind() == kind)
            .unwrap_or_else(|| SyncOptions::default_for(kind));
        if let Err(e) = self
            .queue
            .enqueue(payload, SyncOperation::Delete, options)
            .await
        {
            tracing::warn!("Delete not queued for provider sync: {}", e);
        }
    }

    /// Queue a fresh sync for a record and deliver it now.
    ///
    /// Returns `false` if the record does not exist or is never synced to
    /// the provider.
    pub async fn retry(&self, id: &RecordId) -> bool {
        let Some(record) = self.local.get(id) else {
            return false;
        };
        let Some(kind) = record.kind.resource_kind() else {
            return false;
        };
        let options = self
            .queue
            .job(id)
            .await
            .map(|job| job.options)
            .filter(|options| options.kind() == kind)
            .unwrap_or_else(|| SyncOptions::default_for(kind));

        tracing::info!("Retrying sync for {}", id);
        if let Err(e) = self
            .queue
            .enqueue(record, SyncOperation::Upsert, options)
            .await
        {
            tracing::warn!("Retry not queued: {}", e);
            return false;
        }
        self.queue.process_item(id).await;
        true
    }

    /// Deliver every queued job now, ignoring debounce and backoff.
    ///
    /// Also waits for deliveries already in flight (for example ones
    /// started by [`Self::start`]). Returns the number of jobs that were
    /// queued.
    pub async fn flush(&self) -> usize {
        let ids: Vec<RecordId> = self
            .queue
            .pending_jobs()
            .await
            .into_iter()
            .map(|job| job.id)
            .collect();
        for id in &ids {
            self.queue.process_item(id).await;
        }
        while ids.iter().any(|id| self.queue.is_processing(id)) {
            tokio::time::sleep(FLUSH_POLL_INTERVAL).await;
        }
        ids.len()
    }

    /// Replay unconfirmed writes, pull the remote snapshot, merge it, and
    /// fire due reminders.
    ///
    /// A refresh already in flight makes this return
    /// [`RefreshOutcome::AlreadyRunning`] before any remote call.
    pub async fn refresh(&self) -> Result<RefreshOutcome, FetchError> {
        let Ok(_refreshing) = self.refreshing.try_lock() else {
            tracing::debug!("Refresh already running; skipping replay and fetch");
            return Ok(RefreshOutcome::AlreadyRunning);
        };
        self.replay_unconfirmed().await;
        let outcome = self.trigger.refresh().await?;
        if matches!(outcome, RefreshOutcome::Completed(_)) {
            self.check_reminders_at(now_millis());
        }
        Ok(outcome)
    }

    /// Send the remote the deletes and saves it has not acknowledged.
    ///
    /// Stops at the first failure; the rest waits for the next refresh.
    async fn replay_unconfirmed(&self) {
        for id in self.ledger.all() {
            if let Err(e) = self.remote.delete(&id).await {
                tracing::debug!("Replay stopped at delete of {}: {}", id, e);
                return;
            }
        }
        let pending = self.local.unsynced();
        for record in &pending {
            if let Err(e) = self.remote.upsert(record).await {
                tracing::debug!("Replay stopped at save of {}: {}", record.id, e);
                return;
            }
        }
        if !pending.is_empty() {
            tracing::info!("Replayed {} unconfirmed saves to the remote", pending.len());
        }
    }

    /// Connectivity came back: deliver parked jobs, then refresh.
    pub async fn on_reconnect(&self) -> Result<RefreshOutcome, FetchError> {
        let drained = self.queue.drain().await;
        tracing::info!("Reconnected; drained {} queued sync jobs", drained);
        self.refresh().await
    }

    /// Notify every reminder due at `now_ms` that has not fired yet.
    pub fn check_reminders_at(&self, now_ms: i64) -> Vec<DueReminder> {
        let records = self.local.list();
        let due = self
            .reminders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .collect_due(&records, now_ms);

        for reminder in &due {
            let message = reminder
                .title
                .clone()
                .unwrap_or_else(|| reminder.id.to_string());
            self.notifier
                .notify(Notification::new(NotificationKind::Info, "Reminder", message));
        }
        due
    }

    /// Every record in the local view, in id order.
    pub fn records(&self) -> Vec<Record> {
        self.local.list()
    }

    /// One record from the local view.
    pub fn record(&self, id: &RecordId) -> Option<Record> {
        self.local.get(id)
    }

    /// The outbound queue, for introspection.
    pub fn queue(&self) -> &OutboundQueue {
        &self.queue
    }

    /// Ids deleted locally and not yet confirmed gone remotely.
    pub fn tombstones(&self) -> std::collections::BTreeSet<RecordId> {
        self.ledger.all()
    }

    /// Stop the periodic refresh and every queue timer.
    pub fn shutdown(&self) {
        if let Some(handle) = self.task_slot().take() {
            handle.abort();
        }
        self.queue.shutdown();
        tracing::info!("Sync engine stopped");
    }

    fn task_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.refresh_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Refresh for SyncEngine {
    async fn refresh(&self) -> Result<RefreshOutcome, FetchError> {
        SyncEngine::refresh(self).await
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("owner", &self.config.owner)
            .field("local", &self.local)
            .field("queue", &self.queue)
            .finish()
    }
}
