//! Dry-run provider adapter.
//!
//! Logs what would be sent to the external task/calendar provider and
//! answers with a deterministic provider id.

use async_trait::async_trait;
use hearth_sync_client::{AdapterError, SyncAdapter, SyncReceipt, SyncRequest};

/// Adapter that never talks to a real provider.
#[derive(Debug, Clone)]
pub struct DryRunAdapter {
    available: bool,
}

impl DryRunAdapter {
    /// Create an adapter. An unavailable adapter parks every job.
    pub fn new(available: bool) -> Self {
        Self { available }
    }
}

#[async_trait]
impl SyncAdapter for DryRunAdapter {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn sync_resource(&self, request: &SyncRequest) -> Result<SyncReceipt, AdapterError> {
        let title = request.payload.title().unwrap_or("(untitled)");
        tracing::info!(
            "Would {:?} {} \"{}\" ({})",
            request.operation,
            request.kind,
            title,
            request.id
        );

        let external_id = request
            .external_id()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("dry-{}", request.id));
        Ok(SyncReceipt {
            external_id: Some(external_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_sync_types::{
        OwnerId, Record, RecordId, RecordKind, ResourceKind, SyncJob, SyncOperation, SyncOptions,
    };
    use serde_json::json;

    fn request(external_id: Option<&str>) -> SyncRequest {
        let mut record = Record::new(OwnerId::new("me"), RecordKind::Task, json!({ "title": "t" }));
        record.id = RecordId::from("r1");
        record.external_id = external_id.map(str::to_owned);
        let job = SyncJob::new(
            record,
            SyncOperation::Upsert,
            SyncOptions::default_for(ResourceKind::Task),
        );
        SyncRequest::from_job(&job)
    }

    #[tokio::test]
    async fn assigns_provider_id_from_record_id() {
        let receipt = DryRunAdapter::new(true)
            .sync_resource(&request(None))
            .await
            .unwrap();

        assert_eq!(receipt.external_id.as_deref(), Some("dry-r1"));
    }

    #[tokio::test]
    async fn keeps_existing_provider_id() {
        let receipt = DryRunAdapter::new(true)
            .sync_resource(&request(Some("cal-9")))
            .await
            .unwrap();

        assert_eq!(receipt.external_id.as_deref(), Some("cal-9"));
    }
}
