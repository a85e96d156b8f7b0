//! Engine configuration.

use hearth_sync_core::RetryPolicy;
use hearth_sync_types::OwnerId;
use std::time::Duration;

/// Configuration for the sync engine and its services.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Owner whose records are synced.
    pub owner: OwnerId,
    /// Quiet period after the last enqueue before a job is delivered.
    pub debounce: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Linear backoff step.
    pub retry_base_delay: Duration,
    /// Backoff ceiling.
    pub retry_max_delay: Duration,
    /// Timeout for one adapter call.
    pub adapter_timeout: Duration,
    /// Records per remote page.
    pub page_size: usize,
    /// Page budget for one snapshot.
    pub max_pages: usize,
    /// Period of the background refresh (`None` disables it).
    pub refresh_interval: Option<Duration>,
    /// How long after `remind_at` a reminder still fires.
    pub reminder_horizon: Duration,
    /// Maximum remembered reminders.
    pub reminder_capacity: usize,
}

impl SyncConfig {
    /// Create a configuration with defaults for the given owner.
    pub fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            debounce: Duration::from_secs(3),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(5),
            retry_max_delay: Duration::from_secs(60),
            adapter_timeout: Duration::from_secs(30),
            page_size: 100,
            max_pages: 1000,
            refresh_interval: Some(Duration::from_secs(5 * 60)),
            reminder_horizon: Duration::from_secs(15 * 60),
            reminder_capacity: 1024,
        }
    }

    /// Set the debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set the retry bound and backoff.
    pub fn with_retries(mut self, max_retries: u32, base: Duration, max: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base;
        self.retry_max_delay = max;
        self
    }

    /// Set the adapter call timeout.
    pub fn with_adapter_timeout(mut self, timeout: Duration) -> Self {
        self.adapter_timeout = timeout;
        self
    }

    /// Set remote paging.
    pub fn with_paging(mut self, page_size: usize, max_pages: usize) -> Self {
        self.page_size = page_size.max(1);
        self.max_pages = max_pages.max(1);
        self
    }

    /// Set or disable the background refresh.
    pub fn with_refresh_interval(mut self, interval: Option<Duration>) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Set the reminder window and memory bound.
    pub fn with_reminders(mut self, horizon: Duration, capacity: usize) -> Self {
        self.reminder_horizon = horizon;
        self.reminder_capacity = capacity;
        self
    }

    /// Retry policy derived from this configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_base_delay, self.retry_max_delay)
    }
}
