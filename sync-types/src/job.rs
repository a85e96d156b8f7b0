//! Outbound sync jobs and their resource-kind-specific options.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::RecordId;
use crate::record::{now_millis, Record};

/// The provider resource a job targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    /// Provider task.
    Task,
    /// Provider calendar event.
    Event,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Task => f.write_str("task"),
            Self::Event => f.write_str("event"),
        }
    }
}

/// What the job asks the provider to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum SyncOperation {
    /// Create or update the provider resource.
    #[default]
    Upsert,
    /// Remove the provider resource.
    Delete,
}

/// Options for syncing a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskSyncOptions {
    /// Provider task list to write into (provider default when `None`).
    pub list_id: Option<String>,
    /// Copy the record body into the provider's notes field.
    pub include_notes: bool,
}

/// Options for syncing a calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventSyncOptions {
    /// Provider calendar to write into (primary calendar when `None`).
    pub calendar_id: Option<String>,
    /// Ask the provider to notify attendees.
    pub send_updates: bool,
    /// Duration used when the record carries no explicit end.
    pub default_duration_minutes: u32,
}

impl Default for EventSyncOptions {
    fn default() -> Self {
        Self {
            calendar_id: None,
            send_updates: false,
            default_duration_minutes: 30,
        }
    }
}

/// Resource-kind-specific sync options.
///
/// A tagged union rather than a loose map so that every adapter handles
/// every kind exhaustively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SyncOptions {
    /// Task options.
    Task(TaskSyncOptions),
    /// Event options.
    Event(EventSyncOptions),
}

impl SyncOptions {
    /// Default options for a resource kind.
    pub fn default_for(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Task => Self::Task(TaskSyncOptions::default()),
            ResourceKind::Event => Self::Event(EventSyncOptions::default()),
        }
    }

    /// The resource kind these options belong to.
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Task(_) => ResourceKind::Task,
            Self::Event(_) => ResourceKind::Event,
        }
    }
}

/// One pending outbound sync for a record id.
///
/// At most one job exists per id; a newer enqueue replaces the job.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncJob {
    /// The record this job syncs.
    pub id: RecordId,
    /// Target resource kind.
    pub kind: ResourceKind,
    /// Upsert or delete.
    pub operation: SyncOperation,
    /// Record snapshot taken at enqueue time.
    pub payload: Record,
    /// Kind-specific options.
    pub options: SyncOptions,
    /// Enqueue time (Unix ms).
    pub enqueued_at: i64,
    /// Failed attempts so far.
    pub retry_count: u32,
}

impl SyncJob {
    /// Create a fresh job (retry count 0) for a record snapshot.
    pub fn new(payload: Record, operation: SyncOperation, options: SyncOptions) -> Self {
        Self {
            id: payload.id.clone(),
            kind: options.kind(),
            operation,
            payload,
            options,
            enqueued_at: now_millis(),
            retry_count: 0,
        }
    }

    /// Whether this job removes the provider resource.
    pub fn is_delete(&self) -> bool {
        self.operation == SyncOperation::Delete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::OwnerId;
    use crate::record::RecordKind;
    use serde_json::json;

    #[test]
    fn options_are_tagged_by_kind() {
        let options = SyncOptions::Event(EventSyncOptions {
            calendar_id: Some("work".into()),
            ..EventSyncOptions::default()
        });
        let value = serde_json::to_value(&options).unwrap();
        assert_eq!(value["kind"], "event");
        assert_eq!(value["calendarId"], "work");
        assert_eq!(value["defaultDurationMinutes"], 30);
    }

    #[test]
    fn options_missing_fields_use_defaults() {
        let options: SyncOptions = serde_json::from_value(json!({"kind": "task"})).unwrap();
        assert_eq!(options, SyncOptions::Task(TaskSyncOptions::default()));
    }

    #[test]
    fn new_job_takes_kind_from_options() {
        let record = Record::new(OwnerId::new("u1"), RecordKind::Event, json!({}));
        let job = SyncJob::new(
            record.clone(),
            SyncOperation::Upsert,
            SyncOptions::default_for(ResourceKind::Event),
        );
        assert_eq!(job.id, record.id);
        assert_eq!(job.kind, ResourceKind::Event);
        assert_eq!(job.retry_count, 0);
        assert!(!job.is_delete());
    }
}
