//! Paginated remote snapshot accumulation.
//!
//! The remote store returns its records in pages. This module collects the
//! pages into one snapshot and tracks:
//! - The cursor to request the next page from
//! - Whether the last page has been seen (only a complete snapshot may be
//!   merged; a partial one would look like mass deletion)
//! - A page budget so a remote that always reports `has_more` cannot keep
//!   the client fetching forever
//!
//! Cursors are offsets: each page advances the cursor by its record count.

use crate::merge::prefer_newer;
use hearth_sync_types::{Cursor, Record, RecordId};
use std::collections::BTreeMap;
use thiserror::Error;

/// Error type for snapshot accumulation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    /// The remote kept reporting more pages past the budget.
    #[error("snapshot exceeded {max_pages} pages")]
    TooManyPages {
        /// Configured page budget.
        max_pages: usize,
    },
    /// The remote returned an empty page but claimed more were coming.
    #[error("remote returned an empty page {page} with has_more set")]
    StalledPage {
        /// 1-based page number.
        page: usize,
    },
    /// A page arrived after the last page.
    #[error("snapshot already complete")]
    AlreadyComplete,
}

/// Collects remote pages into a complete snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotAccumulator {
    max_pages: usize,
    pages: usize,
    cursor: Cursor,
    complete: bool,
    records: BTreeMap<RecordId, Record>,
}

impl SnapshotAccumulator {
    /// Create an accumulator that accepts at most `max_pages` pages.
    pub fn new(max_pages: usize) -> Self {
        Self {
            max_pages,
            pages: 0,
            cursor: Cursor::zero(),
            complete: false,
            records: BTreeMap::new(),
        }
    }

    /// Add one page.
    ///
    /// Records read twice (the remote shifted under us) collapse to the
    /// newer copy.
    pub fn push_page(&mut self, records: Vec<Record>, has_more: bool) -> Result<(), SnapshotError> {
        if self.complete {
            return Err(SnapshotError::AlreadyComplete);
        }
        self.pages += 1;
        if records.is_empty() && has_more {
            return Err(SnapshotError::StalledPage { page: self.pages });
        }

        self.cursor = self.cursor.advance(records.len() as u64);
        for record in records {
            let keep = match self.records.get(&record.id) {
                Some(existing) => prefer_newer(existing, &record).clone(),
                None => record,
            };
            self.records.insert(keep.id.clone(), keep);
        }

        if !has_more {
            self.complete = true;
        } else if self.pages >= self.max_pages {
            return Err(SnapshotError::TooManyPages {
                max_pages: self.max_pages,
            });
        }
        Ok(())
    }

    /// Cursor to request the next page from.
    pub fn next_cursor(&self) -> Cursor {
        self.cursor
    }

    /// Check whether the last page has been seen.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Pages accepted so far.
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Distinct records collected so far.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if no records have been collected.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Take the collected records, ordered by id.
    ///
    /// Returns `None` unless the snapshot is complete.
    pub fn into_records(self) -> Option<Vec<Record>> {
        if !self.complete {
            return None;
        }
        Some(self.records.into_values().collect())
    }
}
