//! External sync adapter abstraction.
//!
//! The adapter forwards confirmed local mutations to a third-party
//! calendar/task provider. The queue only needs two things from it:
//! - `is_available()` - whether the prerequisite capability (credentials,
//!   provider configured) is present right now
//! - `sync_resource()` - deliver one job, returning the provider's id
//!
//! Errors are classified so the queue knows whether a failure consumes a
//! retry ([`AdapterError::is_retryable`]) or parks the job.

mod mock;

pub use mock::MockAdapter;

use async_trait::async_trait;
use hearth_sync_types::{Record, RecordId, ResourceKind, SyncJob, SyncOperation, SyncOptions};
use thiserror::Error;

/// Adapter errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// Temporary provider or network failure.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The provider throttled the request.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The call did not finish in time.
    #[error("adapter call timed out")]
    Timeout,

    /// A prerequisite is missing (revoked credential, provider not configured).
    #[error("precondition failed: {0}")]
    Precondition(String),
}

impl AdapterError {
    /// Whether this failure consumes a retry.
    ///
    /// Precondition failures park the job instead.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Precondition(_))
    }
}

/// One delivery handed to the adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRequest {
    /// Record id.
    pub id: RecordId,
    /// Upsert or delete.
    pub operation: SyncOperation,
    /// Target resource kind.
    pub kind: ResourceKind,
    /// Record snapshot taken at enqueue time.
    pub payload: Record,
    /// Kind-specific options.
    pub options: SyncOptions,
}

impl SyncRequest {
    /// Build the request for a queued job.
    pub fn from_job(job: &SyncJob) -> Self {
        Self {
            id: job.id.clone(),
            operation: job.operation,
            kind: job.kind,
            payload: job.payload.clone(),
            options: job.options.clone(),
        }
    }

    /// Provider id from an earlier successful sync, if any.
    pub fn external_id(&self) -> Option<&str> {
        self.payload.external_id.as_deref()
    }
}

/// What the provider returned for a successful delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReceipt {
    /// Provider-side identifier to store on the record.
    pub external_id: Option<String>,
}

/// Adapter trait for delivering jobs to an external provider.
///
/// Implementations must be safe to call concurrently for different ids.
#[async_trait]
pub trait SyncAdapter: Send + Sync {
    /// Check whether the prerequisite capability is present.
    ///
    /// When this returns `false` the job is parked without consuming a retry.
    fn is_available(&self) -> bool;

    /// Deliver one job.
    async fn sync_resource(&self, request: &SyncRequest) -> Result<SyncReceipt, AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_precondition_failures_park() {
        assert!(AdapterError::Transient("503".into()).is_retryable());
        assert!(AdapterError::RateLimited("slow down".into()).is_retryable());
        assert!(AdapterError::Timeout.is_retryable());
        assert!(!AdapterError::Precondition("revoked".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        assert_eq!(AdapterError::Timeout.to_string(), "adapter call timed out");
        assert_eq!(
            AdapterError::Precondition("no calendar".into()).to_string(),
            "precondition failed: no calendar"
        );
    }
}
