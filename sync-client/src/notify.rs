//! User-facing notifications.
//!
//! Exhausted sync jobs and due reminders are surfaced through a
//! [`NotificationSink`]. The engine never returns those as errors.

use std::sync::{Arc, Mutex};

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// Informational (due reminders).
    Info,
    /// Something needs attention but nothing was lost.
    Warning,
    /// A mutation could not be synced.
    Error,
}

/// One notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Severity.
    pub kind: NotificationKind,
    /// Short title.
    pub title: String,
    /// Body text.
    pub message: String,
}

impl Notification {
    /// Create a notification.
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Destination for notifications.
pub trait NotificationSink: Send + Sync {
    /// Deliver one notification. Must not block.
    fn notify(&self, notification: Notification);
}

/// Sink that writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notification: Notification) {
        match notification.kind {
            NotificationKind::Info => {
                tracing::info!("{}: {}", notification.title, notification.message)
            }
            NotificationKind::Warning => {
                tracing::warn!("{}: {}", notification.title, notification.message)
            }
            NotificationKind::Error => {
                tracing::error!("{}: {}", notification.title, notification.message)
            }
        }
    }
}

/// Sink that keeps every notification, for tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    notifications: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything received so far.
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    /// Notifications of one kind.
    pub fn of_kind(&self, kind: NotificationKind) -> Vec<Notification> {
        self.notifications()
            .into_iter()
            .filter(|n| n.kind == kind)
            .collect()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_filters_by_kind() {
        let sink = RecordingSink::new();
        sink.notify(Notification::new(NotificationKind::Info, "a", "b"));
        sink.notify(Notification::new(NotificationKind::Error, "c", "d"));

        assert_eq!(sink.notifications().len(), 2);
        assert_eq!(sink.of_kind(NotificationKind::Error)[0].title, "c");
    }
}
