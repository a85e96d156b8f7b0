//! Versioned on-disk formats for queue, tombstone and record state.
//!
//! Every document is a JSON object carrying a `version` field. Decoding
//! is lenient at the entry level: an entry that fails validation is
//! skipped and reported, the rest of the document still loads. A document
//! that is not valid JSON, has the wrong shape, or an unknown version is
//! rejected as a whole; callers treat that as empty state.

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::ids::RecordId;
use crate::job::{ResourceKind, SyncJob, SyncOperation, SyncOptions};
use crate::record::Record;

/// Current schema version of every persisted document.
pub const SCHEMA_VERSION: u32 = 1;

/// Storage key of the outbound queue document.
pub const QUEUE_STORAGE_KEY: &str = "outbound_sync_queue";

/// Storage key of the tombstone ledger document.
pub const TOMBSTONE_STORAGE_KEY: &str = "deleted_record_ids";

/// Storage key of the local record cache document.
pub const RECORDS_STORAGE_KEY: &str = "local_records";

/// Result of a lenient decode.
#[derive(Debug)]
pub struct Decoded<T> {
    /// Entries that passed validation, in document order.
    pub items: Vec<T>,
    /// One human-readable reason per skipped entry.
    pub skipped: Vec<String>,
}

/// Persisted shape of one [`SyncJob`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedJob {
    id: RecordId,
    kind: ResourceKind,
    #[serde(default)]
    operation: SyncOperation,
    payload: serde_json::Value,
    options: serde_json::Value,
    enqueued_at_epoch_ms: i64,
    retry_count: u32,
}

impl PersistedJob {
    fn from_job(job: &SyncJob) -> Result<Self, SyncError> {
        Ok(Self {
            id: job.id.clone(),
            kind: job.kind,
            operation: job.operation,
            payload: serde_json::to_value(&job.payload).map_err(SyncError::Serialization)?,
            options: serde_json::to_value(&job.options).map_err(SyncError::Serialization)?,
            enqueued_at_epoch_ms: job.enqueued_at,
            retry_count: job.retry_count,
        })
    }
}

impl TryFrom<PersistedJob> for SyncJob {
    type Error = SyncError;

    fn try_from(raw: PersistedJob) -> Result<Self, Self::Error> {
        let payload: Record = serde_json::from_value(raw.payload)
            .map_err(|e| SyncError::InvalidData(format!("job {}: bad payload: {e}", raw.id)))?;
        let options: SyncOptions = serde_json::from_value(raw.options)
            .map_err(|e| SyncError::InvalidData(format!("job {}: bad options: {e}", raw.id)))?;

        if options.kind() != raw.kind {
            return Err(SyncError::InvalidData(format!(
                "job {}: options are for {} but job kind is {}",
                raw.id,
                options.kind(),
                raw.kind
            )));
        }
        if payload.id != raw.id {
            return Err(SyncError::InvalidData(format!(
                "job {}: payload belongs to {}",
                raw.id, payload.id
            )));
        }

        Ok(SyncJob {
            id: raw.id,
            kind: raw.kind,
            operation: raw.operation,
            payload,
            options,
            enqueued_at: raw.enqueued_at_epoch_ms,
            retry_count: raw.retry_count,
        })
    }
}

/// Encode queue jobs as a versioned document.
pub fn encode_queue<'a>(jobs: impl IntoIterator<Item = &'a SyncJob>) -> Result<String, SyncError> {
    let jobs = jobs
        .into_iter()
        .map(PersistedJob::from_job)
        .collect::<Result<Vec<_>, _>>()?;
    serde_json::to_string(&serde_json::json!({
        "version": SCHEMA_VERSION,
        "jobs": jobs,
    }))
    .map_err(SyncError::Serialization)
}

/// Decode a queue document.
pub fn decode_queue(raw: &str) -> Result<Decoded<SyncJob>, SyncError> {
    decode_entries(raw, "jobs", |value| {
        let job: PersistedJob = serde_json::from_value(value)
            .map_err(|e| SyncError::InvalidData(format!("malformed job: {e}")))?;
        SyncJob::try_from(job)
    })
}

/// Encode tombstoned ids as a versioned document.
pub fn encode_tombstones<'a>(
    ids: impl IntoIterator<Item = &'a RecordId>,
) -> Result<String, SyncError> {
    let ids: Vec<&RecordId> = ids.into_iter().collect();
    serde_json::to_string(&serde_json::json!({
        "version": SCHEMA_VERSION,
        "ids": ids,
    }))
    .map_err(SyncError::Serialization)
}

/// Decode a tombstone document.
pub fn decode_tombstones(raw: &str) -> Result<Decoded<RecordId>, SyncError> {
    decode_entries(raw, "ids", |value| {
        value
            .as_str()
            .and_then(RecordId::parse)
            .ok_or_else(|| SyncError::InvalidData(format!("not a record id: {value}")))
    })
}

/// Encode cached records as a versioned document.
pub fn encode_records<'a>(
    records: impl IntoIterator<Item = &'a Record>,
) -> Result<String, SyncError> {
    let records: Vec<&Record> = records.into_iter().collect();
    serde_json::to_string(&serde_json::json!({
        "version": SCHEMA_VERSION,
        "records": records,
    }))
    .map_err(SyncError::Serialization)
}

/// Decode a record cache document.
pub fn decode_records(raw: &str) -> Result<Decoded<Record>, SyncError> {
    decode_entries(raw, "records", |value| {
        serde_json::from_value::<Record>(value)
            .map_err(|e| SyncError::InvalidData(format!("malformed record: {e}")))
    })
}

fn decode_entries<T>(
    raw: &str,
    field: &str,
    mut parse: impl FnMut(serde_json::Value) -> Result<T, SyncError>,
) -> Result<Decoded<T>, SyncError> {
    let document: serde_json::Value =
        serde_json::from_str(raw).map_err(SyncError::Deserialization)?;

    let version = document
        .get("version")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| SyncError::InvalidData("document has no version".into()))?;
    if version != u64::from(SCHEMA_VERSION) {
        return Err(SyncError::UnsupportedVersion(version));
    }

    let entries = match document.get(field) {
        Some(serde_json::Value::Array(entries)) => entries.clone(),
        _ => {
            return Err(SyncError::InvalidData(format!(
                "document has no `{field}` array"
            )))
        }
    };

    let mut decoded = Decoded {
        items: Vec::with_capacity(entries.len()),
        skipped: Vec::new(),
    };
    for entry in entries {
        match parse(entry) {
            Ok(item) => decoded.items.push(item),
            Err(e) => decoded.skipped.push(e.to_string()),
        }
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::OwnerId;
    use crate::job::TaskSyncOptions;
    use crate::record::RecordKind;
    use serde_json::json;

    fn task_job(title: &str) -> SyncJob {
        let record = Record::new(OwnerId::new("u1"), RecordKind::Task, json!({ "title": title }));
        SyncJob::new(
            record,
            SyncOperation::Upsert,
            SyncOptions::Task(TaskSyncOptions::default()),
        )
    }

    #[test]
    fn queue_document_restores_jobs() {
        let mut job = task_job("buy milk");
        job.retry_count = 2;
        let raw = encode_queue([&job]).unwrap();

        let decoded = decode_queue(&raw).unwrap();

        assert!(decoded.skipped.is_empty());
        assert_eq!(decoded.items, vec![job]);
    }

    #[test]
    fn queue_document_uses_documented_field_names() {
        let job = task_job("x");
        let raw = encode_queue([&job]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(value["version"], 1);
        let entry = &value["jobs"][0];
        assert!(entry.get("enqueuedAtEpochMs").is_some());
        assert!(entry.get("retryCount").is_some());
        assert_eq!(entry["kind"], "task");
        assert_eq!(entry["operation"], "upsert");
    }

    #[test]
    fn malformed_document_is_rejected() {
        assert!(decode_queue("not json").is_err());
        assert!(decode_queue("[]").is_err());
        assert!(decode_queue(r#"{"version": 1}"#).is_err());
    }

    #[test]
    fn older_version_is_rejected() {
        let result = decode_queue(r#"{"version": 0, "jobs": []}"#);
        assert!(matches!(result, Err(SyncError::UnsupportedVersion(0))));
    }

    #[test]
    fn malformed_job_is_skipped_not_fatal() {
        let good = task_job("good");
        let raw = encode_queue([&good]).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        value["jobs"]
            .as_array_mut()
            .unwrap()
            .push(json!({ "id": "broken", "retryCount": -1 }));

        let decoded = decode_queue(&value.to_string()).unwrap();

        assert_eq!(decoded.items.len(), 1);
        assert_eq!(decoded.items[0].id, good.id);
        assert_eq!(decoded.skipped.len(), 1);
    }

    #[test]
    fn job_with_mismatched_options_is_skipped() {
        let job = task_job("x");
        let raw = encode_queue([&job]).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        value["jobs"][0]["options"] = json!({ "kind": "event" });

        let decoded = decode_queue(&value.to_string()).unwrap();

        assert!(decoded.items.is_empty());
        assert!(decoded.skipped[0].contains("options are for event"));
    }

    #[test]
    fn tombstones_skip_blank_ids() {
        let decoded = decode_tombstones(r#"{"version": 1, "ids": ["a", "", 7, "b"]}"#).unwrap();
        let ids: Vec<&str> = decoded.items.iter().map(RecordId::as_str).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(decoded.skipped.len(), 2);
    }

    #[test]
    fn records_document_preserves_unsynced_flag() {
        let record = Record::new(OwnerId::new("u1"), RecordKind::Note, json!({"body": "hi"}));
        let raw = encode_records([&record]).unwrap();

        let decoded = decode_records(&raw).unwrap();

        assert_eq!(decoded.items, vec![record]);
        assert!(decoded.items[0].unsynced);
    }
}
