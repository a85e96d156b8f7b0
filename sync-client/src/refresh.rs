//! Reconciliation trigger and background refresh task.
//!
//! A refresh pulls the owner's full snapshot from the remote store page by
//! page and only then hands it to the [`MergeEngine`]. A fetch error aborts
//! the refresh without touching local state; a partial snapshot is never
//! merged.

use crate::merge::MergeEngine;
use crate::queue::OutboundQueue;
use crate::remote::{RemoteError, RemoteStore};
use async_trait::async_trait;
use hearth_sync_core::{MergeReport, SnapshotAccumulator, SnapshotError};
use hearth_sync_types::{OwnerId, Record};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Refresh errors. Local state is unchanged when one is returned.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The remote store failed.
    #[error("remote fetch failed: {0}")]
    Remote(#[from] RemoteError),

    /// The remote's pages did not form a complete snapshot.
    #[error("incomplete snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Summary of a completed refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Pages fetched.
    pub pages: usize,
    /// Distinct remote records seen.
    pub remote_records: usize,
    /// What the merge did.
    pub report: MergeReport,
}

/// Outcome of [`ReconciliationTrigger::refresh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The snapshot was fetched and merged.
    Completed(RefreshSummary),
    /// Another refresh was already running; nothing was done.
    AlreadyRunning,
}

/// Anything that can run a refresh (the trigger itself or the engine).
#[async_trait]
pub trait Refresh: Send + Sync {
    /// Run one refresh.
    async fn refresh(&self) -> Result<RefreshOutcome, FetchError>;
}

/// Decides when the merge runs and feeds it remote data.
pub struct ReconciliationTrigger {
    remote: Arc<dyn RemoteStore>,
    merge: MergeEngine,
    queue: OutboundQueue,
    owner: OwnerId,
    page_size: usize,
    max_pages: usize,
    running: Mutex<()>,
}

impl ReconciliationTrigger {
    /// Create a trigger.
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        merge: MergeEngine,
        queue: OutboundQueue,
        owner: OwnerId,
        page_size: usize,
        max_pages: usize,
    ) -> Self {
        Self {
            remote,
            merge,
            queue,
            owner,
            page_size: page_size.max(1),
            max_pages: max_pages.max(1),
            running: Mutex::new(()),
        }
    }

    /// Fetch a complete snapshot and merge it.
    ///
    /// A refresh already in flight makes this return
    /// [`RefreshOutcome::AlreadyRunning`] immediately.
    pub async fn refresh(&self) -> Result<RefreshOutcome, FetchError> {
        let Ok(_running) = self.running.try_lock() else {
            tracing::debug!("Refresh already running; skipping");
            return Ok(RefreshOutcome::AlreadyRunning);
        };

        let (records, pages) = match self.fetch_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Refresh aborted, local state untouched: {}", e);
                return Err(e);
            }
        };

        let pending_deletes = self.queue.pending_delete_ids().await;
        let report = self.merge.apply(&records, pending_deletes).await;
        tracing::info!(
            "Refresh complete: {} remote records in {} pages",
            records.len(),
            pages
        );

        Ok(RefreshOutcome::Completed(RefreshSummary {
            pages,
            remote_records: records.len(),
            report,
        }))
    }

    async fn fetch_snapshot(&self) -> Result<(Vec<Record>, usize), FetchError> {
        let mut snapshot = SnapshotAccumulator::new(self.max_pages);
        while !snapshot.is_complete() {
            let page = self
                .remote
                .fetch_page(&self.owner, snapshot.next_cursor(), self.page_size)
                .await?;
            tracing::debug!(
                "Fetched page at {} ({} records, more: {})",
                snapshot.next_cursor(),
                page.records.len(),
                page.has_more
            );
            snapshot.push_page(page.records, page.has_more)?;
        }

        let pages = snapshot.pages();
        let records = snapshot.into_records().unwrap_or_default();
        Ok((records, pages))
    }
}

#[async_trait]
impl Refresh for ReconciliationTrigger {
    async fn refresh(&self) -> Result<RefreshOutcome, FetchError> {
        ReconciliationTrigger::refresh(self).await
    }
}

impl std::fmt::Debug for ReconciliationTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationTrigger")
            .field("owner", &self.owner)
            .field("page_size", &self.page_size)
            .field("max_pages", &self.max_pages)
            .finish()
    }
}

/// Spawn a background task that refreshes every `interval`.
///
/// The first refresh runs one interval after spawning (startup runs its
/// own). With `None` the task exits immediately. Returns a handle that can
/// be used to abort the task.
pub fn spawn_refresh_task(
    target: Arc<dyn Refresh>,
    interval: Option<Duration>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let Some(period) = interval.filter(|p| !p.is_zero()) else {
            tracing::info!("Periodic refresh disabled");
            return;
        };

        tracing::info!("Periodic refresh started (interval: {}s)", period.as_secs());
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            timer.tick().await;

            match target.refresh().await {
                Ok(RefreshOutcome::Completed(summary)) => {
                    tracing::debug!("Periodic refresh: {} records", summary.remote_records)
                }
                Ok(RefreshOutcome::AlreadyRunning) => {
                    tracing::debug!("Periodic refresh skipped: already running")
                }
                Err(e) => tracing::warn!("Periodic refresh failed: {}", e),
            }
        }
    })
}
