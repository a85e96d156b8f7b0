//! Per-job outbound sync state machine.
//!
//! This module provides a pure, side-effect-free state machine for the
//! lifecycle of one queued sync job. The state machine takes events as input
//! and produces a new phase plus a list of actions to execute.
//!
//! Timers, adapter calls and persistence are performed by sync-client, not by
//! this module.
//!
//! ```text
//! Debouncing ──TimerFired──▶ Processing ──Succeeded──▶ Done
//!                               │  ▲
//!             retryable failure │  │ TimerFired / DrainRequested
//!                               ▼  │
//!                             Retrying
//!                               │
//!              retries used up  └──────────────────▶ Exhausted
//!
//! Processing ──Unavailable / precondition failure──▶ Parked
//! any non-terminal ──Cancelled──▶ Cancelled
//! ```

use std::time::Duration;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default linear backoff step.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(5);

/// Default backoff ceiling.
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(60);

/// Lifecycle phase of a queued job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPhase {
    /// Waiting for the debounce window to close.
    Debouncing,
    /// Delivery in progress.
    Processing,
    /// Waiting for a backoff timer after a transient failure.
    Retrying {
        /// Retries consumed so far.
        retry_count: u32,
    },
    /// Held until the next drain or restart (capability unavailable or
    /// precondition failure). No retry is consumed.
    Parked,
    /// Delivered and removed.
    Done,
    /// Retries used up; removed with a terminal error.
    Exhausted,
    /// Dropped without delivery.
    Cancelled,
}

impl JobPhase {
    /// Phase of a freshly enqueued job.
    pub fn new() -> Self {
        Self::Debouncing
    }

    /// Process an event and return the new phase plus actions to execute.
    ///
    /// `retry_count` is the job's current retry count; `policy` decides
    /// whether a transient failure is retried. Events that make no sense in
    /// the current phase leave it unchanged with no actions.
    pub fn on_event(
        self,
        event: JobEvent,
        retry_count: u32,
        policy: &RetryPolicy,
    ) -> (Self, Vec<JobAction>) {
        match (self, event) {
            // Terminal phases ignore everything
            (phase @ (Self::Done | Self::Exhausted | Self::Cancelled), _) => (phase, vec![]),

            // Cancel wins from any live phase
            (_, JobEvent::Cancelled) => (
                Self::Cancelled,
                vec![JobAction::RemoveJob, JobAction::Persist],
            ),

            // Start a delivery
            (Self::Debouncing | Self::Retrying { .. } | Self::Parked, JobEvent::TimerFired) => {
                (Self::Processing, vec![JobAction::Deliver])
            }
            (Self::Retrying { .. } | Self::Parked, JobEvent::DrainRequested) => {
                (Self::Processing, vec![JobAction::Deliver])
            }

            // Outcomes of a delivery
            (Self::Processing, JobEvent::Unavailable) => (Self::Parked, vec![]),
            (Self::Processing, JobEvent::DeliverySucceeded) => (
                Self::Done,
                vec![
                    JobAction::RemoveJob,
                    JobAction::Persist,
                    JobAction::MarkSynced,
                ],
            ),
            (
                Self::Processing,
                JobEvent::DeliveryFailed {
                    retryable: false, ..
                },
            ) => (Self::Parked, vec![]),
            (
                Self::Processing,
                JobEvent::DeliveryFailed {
                    error,
                    retryable: true,
                },
            ) => match policy.on_failure(retry_count) {
                RetryDecision::Retry { delay } => (
                    Self::Retrying {
                        retry_count: retry_count.saturating_add(1),
                    },
                    vec![
                        JobAction::IncrementRetry,
                        JobAction::Persist,
                        JobAction::ScheduleRetry { delay },
                    ],
                ),
                RetryDecision::Exhaust => {
                    let attempts = retry_count.saturating_add(1);
                    (
                        Self::Exhausted,
                        vec![
                            JobAction::RemoveJob,
                            JobAction::Persist,
                            JobAction::RecordError {
                                message: error.clone(),
                            },
                            JobAction::NotifyExhausted { attempts, error },
                        ],
                    )
                }
            },

            // Invalid transitions - stay in current phase
            (phase, _) => (phase, vec![]),
        }
    }

    /// Check if the phase is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Exhausted | Self::Cancelled)
    }

    /// Check if a delivery is in flight.
    pub fn is_processing(&self) -> bool {
        matches!(self, Self::Processing)
    }

    /// Check if the job is still inside its debounce window.
    pub fn is_debouncing(&self) -> bool {
        matches!(self, Self::Debouncing)
    }
}

impl Default for JobPhase {
    fn default() -> Self {
        Self::new()
    }
}

/// Events that can occur in a job's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// Debounce or backoff timer fired, or a restored job is due.
    TimerFired,
    /// The adapter reported its capability unavailable.
    Unavailable,
    /// The adapter accepted the job.
    DeliverySucceeded,
    /// The adapter rejected the job.
    DeliveryFailed {
        /// Error message describing the failure.
        error: String,
        /// Whether the failure consumes a retry (transient) or parks the job.
        retryable: bool,
    },
    /// Connectivity came back; deliver without waiting for timers.
    DrainRequested,
    /// The job was dropped before delivery.
    Cancelled,
}

/// Actions to be executed by the sync-client.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobAction {
    /// Call the external sync adapter.
    Deliver,
    /// Remove the job from the queue.
    RemoveJob,
    /// Write the queue to durable storage.
    Persist,
    /// Bump the job's retry count.
    IncrementRetry,
    /// Start a backoff timer.
    ScheduleRetry {
        /// Delay before the next attempt.
        delay: Duration,
    },
    /// Clear `unsynced` and `sync_error` on the record.
    MarkSynced,
    /// Set the record's `sync_error`.
    RecordError {
        /// Error shown to the user.
        message: String,
    },
    /// Emit one error notification.
    NotifyExhausted {
        /// Total attempts made.
        attempts: u32,
        /// Last error seen.
        error: String,
    },
}

/// Outcome of [`RetryPolicy::on_failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after `delay`.
    Retry {
        /// Backoff before the next attempt.
        delay: Duration,
    },
    /// Give up.
    Exhaust,
}

/// Bounded linear retry policy.
///
/// A job is attempted at most `max_retries + 1` times. The delay before
/// retry `n` (1-based) is `base_delay * n`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Linear backoff step.
    pub base_delay: Duration,
    /// Backoff ceiling.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy.
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Decide what to do after a transient failure at `retry_count`.
    pub fn on_failure(&self, retry_count: u32) -> RetryDecision {
        if retry_count < self.max_retries {
            RetryDecision::Retry {
                delay: self.backoff(retry_count.saturating_add(1)),
            }
        } else {
            RetryDecision::Exhaust
        }
    }

    /// Backoff before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        self.base_delay
            .checked_mul(retry)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_RETRIES,
            DEFAULT_RETRY_BASE_DELAY,
            DEFAULT_RETRY_MAX_DELAY,
        )
    }
}
