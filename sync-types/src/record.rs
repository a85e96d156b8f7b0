//! The user record model shared by every hearth-sync crate.

use serde::{Deserialize, Serialize};

use crate::ids::{OwnerId, RecordId};
use crate::job::ResourceKind;

/// What kind of user entity a record is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordKind {
    /// Free-form note. Never forwarded to the external provider.
    Note,
    /// A task (maps to a provider task).
    Task,
    /// A schedulable calendar item (maps to a provider event).
    Event,
}

impl RecordKind {
    /// The provider resource kind for this record kind, if it is synced
    /// to the external provider at all.
    pub fn resource_kind(&self) -> Option<ResourceKind> {
        match self {
            Self::Note => None,
            Self::Task => Some(ResourceKind::Task),
            Self::Event => Some(ResourceKind::Event),
        }
    }
}

/// A user record (note, task or calendar item).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Stable, globally unique identifier.
    pub id: RecordId,
    /// Owning user.
    pub owner: OwnerId,
    /// Entity kind.
    pub kind: RecordKind,
    /// Last modification time (Unix ms).
    pub updated_at: i64,
    /// Soft-delete time (Unix ms), if deleted.
    #[serde(default)]
    pub deleted_at: Option<i64>,
    /// True while a local write has not been confirmed by the remote store.
    #[serde(default)]
    pub unsynced: bool,
    /// Terminal sync failure shown to the user, cleared on the next success.
    #[serde(default)]
    pub sync_error: Option<String>,
    /// Identifier assigned by the external provider after a successful sync.
    #[serde(default)]
    pub external_id: Option<String>,
    /// When a reminder for this record is due (Unix ms).
    #[serde(default)]
    pub remind_at: Option<i64>,
    /// Arbitrary user fields.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Record {
    /// Create a new, locally-created record with a fresh client id.
    ///
    /// New records start unsynced: nothing has confirmed them yet.
    pub fn new(owner: OwnerId, kind: RecordKind, payload: serde_json::Value) -> Self {
        Self {
            id: RecordId::new(),
            owner,
            kind,
            updated_at: now_millis(),
            deleted_at: None,
            unsynced: true,
            sync_error: None,
            external_id: None,
            remind_at: None,
            payload,
        }
    }

    /// Set the reminder time.
    pub fn with_remind_at(mut self, remind_at: i64) -> Self {
        self.remind_at = Some(remind_at);
        self
    }

    /// Whether the record is soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Human-readable title taken from the payload, if any.
    pub fn title(&self) -> Option<&str> {
        self.payload.get("title").and_then(|v| v.as_str())
    }
}

/// Current Unix time in milliseconds.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_record_is_unsynced() {
        let record = Record::new(OwnerId::new("u1"), RecordKind::Task, json!({"title": "milk"}));
        assert!(record.unsynced);
        assert!(!record.is_deleted());
        assert!(record.updated_at > 0);
        assert_eq!(record.title(), Some("milk"));
    }

    #[test]
    fn notes_are_not_provider_resources() {
        assert_eq!(RecordKind::Note.resource_kind(), None);
        assert_eq!(RecordKind::Task.resource_kind(), Some(ResourceKind::Task));
        assert_eq!(RecordKind::Event.resource_kind(), Some(ResourceKind::Event));
    }

    #[test]
    fn record_uses_camel_case_fields() {
        let record = Record::new(OwnerId::new("u1"), RecordKind::Event, json!({}));
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("updatedAt").is_some());
        assert!(value.get("syncError").is_some());
        assert_eq!(value["kind"], "event");
    }

    #[test]
    fn optional_fields_default_when_missing() {
        let record: Record = serde_json::from_value(json!({
            "id": "srv-1",
            "owner": "u1",
            "kind": "task",
            "updatedAt": 10
        }))
        .unwrap();
        assert!(!record.unsynced);
        assert_eq!(record.deleted_at, None);
        assert_eq!(record.payload, serde_json::Value::Null);
    }
}
