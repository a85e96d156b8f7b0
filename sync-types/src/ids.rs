//! Identity and paging types for hearth-sync.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable, globally unique record identifier.
///
/// Ids may be assigned by the client (UUID v4, see [`RecordId::new`]) or by
/// the remote store (any non-empty string), so the inner value is opaque.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Create a new client-assigned RecordId (UUID v4).
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an existing id (e.g. one assigned by the remote store).
    ///
    /// Returns `None` for empty or whitespace-only input.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Get the string form of this id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The owner of a record (the signed-in user).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Create an OwnerId from any string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the string form of this id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerId({})", self.0)
    }
}

/// A page cursor for paginated remote reads.
///
/// The value is the offset of the next page. Cursors only ever move
/// forward within one snapshot fetch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Cursor(u64);

impl Cursor {
    /// Create a new Cursor with the given value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the numeric value of this Cursor.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The cursor of the first page.
    pub fn zero() -> Self {
        Self(0)
    }

    /// Advance the cursor by `count` items.
    pub fn advance(&self, count: u64) -> Self {
        Self(self.0.saturating_add(count))
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cursor({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_is_uuid_v4() {
        let id = RecordId::new();
        let parsed = uuid::Uuid::parse_str(id.as_str()).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
    }

    #[test]
    fn record_ids_are_unique() {
        assert_ne!(RecordId::new(), RecordId::new());
    }

    #[test]
    fn record_id_parse_rejects_blank() {
        assert!(RecordId::parse("").is_none());
        assert!(RecordId::parse("   ").is_none());
        assert_eq!(RecordId::parse(" srv-42 ").unwrap().as_str(), "srv-42");
    }

    #[test]
    fn record_id_serializes_as_plain_string() {
        let id = RecordId::from("task-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"task-1\"");
    }

    #[test]
    fn cursor_ordering() {
        let c1 = Cursor::new(100);
        let c2 = Cursor::new(200);
        assert!(c1 < c2);
    }

    #[test]
    fn cursor_advance_saturates() {
        assert_eq!(Cursor::zero().advance(25), Cursor::new(25));
        assert_eq!(Cursor::new(u64::MAX).advance(1), Cursor::new(u64::MAX));
    }
}
