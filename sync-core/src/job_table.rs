//! Coalescing job table for the outbound sync queue.
//!
//! This module holds at most one [`SyncJob`] per record id with:
//! - Last-write-wins coalescing (a newer enqueue replaces the job)
//! - A revision number per enqueue so late outcomes of a replaced job are
//!   recognised and dropped
//! - The job's [`JobPhase`], driven through [`JobPhase::on_event`]
//!
//! The table is used by sync-client, which owns the timers and the adapter
//! calls and feeds their outcomes back as events.

use crate::job_state::{JobAction, JobEvent, JobPhase, RetryPolicy};
use hearth_sync_types::{RecordId, SyncJob};
use std::collections::{BTreeMap, BTreeSet};

/// A job plus its bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedJob {
    /// The job as it would be persisted.
    pub job: SyncJob,
    /// Revision assigned when this job was stored.
    pub revision: u64,
    /// Current lifecycle phase.
    pub phase: JobPhase,
}

/// Result of feeding an event to a job.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// The job after the transition (retry count already bumped).
    pub job: SyncJob,
    /// Revision the event applied to.
    pub revision: u64,
    /// Phase after the transition.
    pub phase: JobPhase,
    /// Actions the caller must still perform. `IncrementRetry` and
    /// `RemoveJob` have already been applied to the table.
    pub actions: Vec<JobAction>,
}

impl Transition {
    /// Check whether the caller should call the adapter.
    pub fn should_deliver(&self) -> bool {
        self.actions.contains(&JobAction::Deliver)
    }

    /// Check whether the caller should persist the queue.
    pub fn should_persist(&self) -> bool {
        self.actions.contains(&JobAction::Persist)
    }
}

/// One-job-per-id table.
#[derive(Debug)]
pub struct JobTable {
    jobs: BTreeMap<RecordId, QueuedJob>,
    next_revision: u64,
    policy: RetryPolicy,
}

impl JobTable {
    /// Create an empty table with the given retry policy.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            jobs: BTreeMap::new(),
            next_revision: 1,
            policy,
        }
    }

    /// The retry policy in use.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Store a job, replacing any job for the same id.
    ///
    /// The new job starts in [`JobPhase::Debouncing`] with a fresh revision.
    /// Returns that revision.
    pub fn upsert(&mut self, job: SyncJob) -> u64 {
        let revision = self.bump_revision();
        self.jobs.insert(
            job.id.clone(),
            QueuedJob {
                job,
                revision,
                phase: JobPhase::Debouncing,
            },
        );
        revision
    }

    /// Insert a job loaded from durable storage.
    ///
    /// Restored jobs start [`JobPhase::Parked`]. A job already in the table
    /// is newer than the persisted copy and is kept; returns `None` then.
    pub fn restore(&mut self, job: SyncJob) -> Option<u64> {
        if self.jobs.contains_key(&job.id) {
            return None;
        }
        let revision = self.bump_revision();
        self.jobs.insert(
            job.id.clone(),
            QueuedJob {
                job,
                revision,
                phase: JobPhase::Parked,
            },
        );
        Some(revision)
    }

    /// Feed an event to the job for `id`.
    ///
    /// With `Some(revision)` the event only applies if the stored job still
    /// has that revision; an outcome for a replaced job returns `None`.
    /// Returns `None` if there is no job for `id`.
    pub fn transition(
        &mut self,
        id: &RecordId,
        revision: Option<u64>,
        event: JobEvent,
    ) -> Option<Transition> {
        let entry = self.jobs.get_mut(id)?;
        if revision.is_some_and(|r| r != entry.revision) {
            return None;
        }

        let (phase, actions) = entry
            .phase
            .clone()
            .on_event(event, entry.job.retry_count, &self.policy);

        if actions.contains(&JobAction::IncrementRetry) {
            entry.job.retry_count = entry.job.retry_count.saturating_add(1);
        }
        entry.phase = phase.clone();

        let transition = Transition {
            job: entry.job.clone(),
            revision: entry.revision,
            phase,
            actions,
        };

        if transition.actions.contains(&JobAction::RemoveJob) {
            self.jobs.remove(id);
        }

        Some(transition)
    }

    /// Record a provider id on the queued job's payload if it has none.
    ///
    /// Used when a replaced job's delivery succeeded: the newer job must
    /// update the provider resource rather than create a second one.
    pub fn patch_external_id(&mut self, id: &RecordId, external_id: &str) -> bool {
        match self.jobs.get_mut(id) {
            Some(entry) if entry.job.payload.external_id.is_none() => {
                entry.job.payload.external_id = Some(external_id.to_string());
                true
            }
            _ => false,
        }
    }

    /// Look up the job for `id`.
    pub fn get(&self, id: &RecordId) -> Option<&QueuedJob> {
        self.jobs.get(id)
    }

    /// Check whether a job is queued for `id`.
    pub fn contains(&self, id: &RecordId) -> bool {
        self.jobs.contains_key(id)
    }

    /// All queued jobs in id order.
    pub fn jobs(&self) -> impl Iterator<Item = &SyncJob> {
        self.jobs.values().map(|entry| &entry.job)
    }

    /// Ids with a delete job queued but not confirmed.
    pub fn pending_delete_ids(&self) -> BTreeSet<RecordId> {
        self.jobs
            .values()
            .filter(|entry| entry.job.is_delete())
            .map(|entry| entry.job.id.clone())
            .collect()
    }

    /// Jobs that a drain should deliver now: parked or waiting on backoff.
    ///
    /// Returns `(id, revision)` pairs.
    pub fn drainable(&self) -> Vec<(RecordId, u64)> {
        self.jobs
            .values()
            .filter(|entry| matches!(entry.phase, JobPhase::Parked | JobPhase::Retrying { .. }))
            .map(|entry| (entry.job.id.clone(), entry.revision))
            .collect()
    }

    /// Number of queued jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn bump_revision(&mut self) -> u64 {
        let revision = self.next_revision;
        self.next_revision = self.next_revision.wrapping_add(1);
        revision
    }
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
