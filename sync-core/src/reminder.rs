//! Bounded dedupe for due-reminder notifications.
//!
//! A reminder is due when `remind_at <= now < remind_at + horizon`. Each
//! `(record id, remind_at)` pair fires once. The gate remembers what it has
//! fired, bounded two ways:
//! - entries whose window has closed are evicted on every scan (they can
//!   never be due again)
//! - past `capacity` entries, the oldest-fired are evicted first
//!
//! Moving a reminder to a new `remind_at` makes it a new pair, so it fires
//! again.

use hearth_sync_types::{Record, RecordId};
use std::collections::BTreeMap;
use std::time::Duration;

/// A reminder that just became due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueReminder {
    /// Record the reminder belongs to.
    pub id: RecordId,
    /// Reminder instant (Unix ms).
    pub remind_at: i64,
    /// Record title, if any.
    pub title: Option<String>,
}

/// Fires each reminder once, with bounded memory.
#[derive(Debug, Clone)]
pub struct ReminderGate {
    horizon_ms: i64,
    capacity: usize,
    fired: BTreeMap<(RecordId, i64), i64>,
}

impl ReminderGate {
    /// Create a gate.
    ///
    /// `horizon` is how long after `remind_at` a reminder still counts as
    /// due; `capacity` bounds the number of remembered reminders.
    pub fn new(horizon: Duration, capacity: usize) -> Self {
        Self {
            horizon_ms: i64::try_from(horizon.as_millis()).unwrap_or(i64::MAX),
            capacity,
            fired: BTreeMap::new(),
        }
    }

    /// Return the reminders in `records` that are due at `now_ms` and have
    /// not fired yet, and remember them as fired.
    ///
    /// Soft-deleted records never fire.
    pub fn collect_due(&mut self, records: &[Record], now_ms: i64) -> Vec<DueReminder> {
        self.evict_expired(now_ms);

        let mut due = Vec::new();
        for record in records {
            if record.is_deleted() {
                continue;
            }
            let Some(remind_at) = record.remind_at else {
                continue;
            };
            if !self.in_window(remind_at, now_ms) {
                continue;
            }
            let key = (record.id.clone(), remind_at);
            if self.fired.contains_key(&key) {
                continue;
            }
            self.fired.insert(key, now_ms);
            due.push(DueReminder {
                id: record.id.clone(),
                remind_at,
                title: record.title().map(str::to_owned),
            });
        }

        self.evict_over_capacity();
        due
    }

    /// Number of remembered reminders.
    pub fn len(&self) -> usize {
        self.fired.len()
    }

    /// Check if nothing is remembered.
    pub fn is_empty(&self) -> bool {
        self.fired.is_empty()
    }

    fn in_window(&self, remind_at: i64, now_ms: i64) -> bool {
        remind_at <= now_ms && now_ms < remind_at.saturating_add(self.horizon_ms)
    }

    fn evict_expired(&mut self, now_ms: i64) {
        let horizon_ms = self.horizon_ms;
        self.fired
            .retain(|(_, remind_at), _| now_ms < remind_at.saturating_add(horizon_ms));
    }

    fn evict_over_capacity(&mut self) {
        if self.fired.len() <= self.capacity {
            return;
        }
        let mut by_age: Vec<((RecordId, i64), i64)> = self
            .fired
            .iter()
            .map(|(key, fired_at)| (key.clone(), *fired_at))
            .collect();
        by_age.sort_by_key(|(_, fired_at)| *fired_at);

        let excess = self.fired.len() - self.capacity;
        for (key, _) in by_age.into_iter().take(excess) {
            self.fired.remove(&key);
        }
    }
}
