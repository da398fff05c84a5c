use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

/// How long a notification stays visible after it was posted.
pub const NOTIFICATION_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
    pub posted_at: Instant,
    /// Wall-clock post time, for display only.
    pub posted_local: DateTime<Local>,
}

impl Notification {
    pub fn is_visible_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.posted_at) < NOTIFICATION_TTL
    }
}

/// Single-slot status line. A new post replaces whatever is showing; there is
/// no queue.
#[derive(Debug, Default)]
pub struct NotificationChannel {
    slot: Option<Notification>,
}

impl NotificationChannel {
    pub fn post(&mut self, message: impl Into<String>, severity: Severity) {
        self.post_at(message, severity, Instant::now());
    }

    pub fn post_at(&mut self, message: impl Into<String>, severity: Severity, now: Instant) {
        self.slot = Some(Notification {
            message: message.into(),
            severity,
            posted_at: now,
            posted_local: Local::now(),
        });
    }

    pub fn current(&self) -> Option<&Notification> {
        self.current_at(Instant::now())
    }

    pub fn current_at(&self, now: Instant) -> Option<&Notification> {
        self.slot.as_ref().filter(|n| n.is_visible_at(now))
    }

    /// Drops the slot once its message has expired.
    pub fn prune_at(&mut self, now: Instant) {
        if self.slot.as_ref().is_some_and(|n| !n.is_visible_at(now)) {
            self.slot = None;
        }
    }
}
