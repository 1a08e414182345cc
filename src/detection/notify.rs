//! User-visible notices (camera failures, service errors)

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// How long a notice stays on screen
pub const DEFAULT_NOTICE_TTL: Duration = Duration::from_secs(5);
/// Oldest notices are dropped beyond this
pub const MAX_NOTICES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub expires_at: Instant,
    /// Times this message was raised while still visible
    pub repeats: u32,
}

/// Bounded, expiring list of notices, newest last
#[derive(Debug, Clone)]
pub struct Notices {
    items: VecDeque<Notice>,
    ttl: Duration,
    capacity: usize,
}

impl Default for Notices {
    fn default() -> Self {
        Self::new(DEFAULT_NOTICE_TTL, MAX_NOTICES)
    }
}

impl Notices {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Raise a notice. A message identical to one still showing refreshes it
    /// instead of stacking a duplicate.
    pub fn push(&mut self, level: NoticeLevel, message: impl Into<String>, now: Instant) {
        let message = message.into();
        match level {
            NoticeLevel::Info => tracing::info!(notice = %message, "Notice raised"),
            NoticeLevel::Warning => tracing::warn!(notice = %message, "Notice raised"),
            NoticeLevel::Error => tracing::error!(notice = %message, "Notice raised"),
        }

        if let Some(existing) = self
            .items
            .iter_mut()
            .find(|n| n.level == level && n.message == message && n.expires_at > now)
        {
            existing.expires_at = now + self.ttl;
            existing.repeats += 1;
            return;
        }

        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(Notice {
            level,
            message,
            expires_at: now + self.ttl,
            repeats: 1,
        });
    }

    pub fn info(&mut self, message: impl Into<String>, now: Instant) {
        self.push(NoticeLevel::Info, message, now);
    }

    pub fn warn(&mut self, message: impl Into<String>, now: Instant) {
        self.push(NoticeLevel::Warning, message, now);
    }

    pub fn error(&mut self, message: impl Into<String>, now: Instant) {
        self.push(NoticeLevel::Error, message, now);
    }

    /// Drop expired notices
    pub fn prune(&mut self, now: Instant) {
        self.items.retain(|n| n.expires_at > now);
    }

    pub fn dismiss(&mut self, index: usize) {
        self.items.remove(index);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notice> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn latest(&self) -> Option<&Notice> {
        self.items.back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notices_expire() {
        let now = Instant::now();
        let mut notices = Notices::new(Duration::from_secs(2), 4);
        notices.error("Camera denied", now);
        notices.prune(now + Duration::from_secs(1));
        assert_eq!(notices.len(), 1);
        notices.prune(now + Duration::from_secs(3));
        assert!(notices.is_empty());
    }

    #[test]
    fn test_duplicate_refreshes() {
        let now = Instant::now();
        let mut notices = Notices::new(Duration::from_secs(2), 4);
        notices.error("service down", now);
        notices.error("service down", now + Duration::from_secs(1));
        assert_eq!(notices.len(), 1);
        let notice = notices.latest().unwrap();
        assert_eq!(notice.repeats, 2);
        assert_eq!(notice.expires_at, now + Duration::from_secs(3));

        // Same text at another level is a separate notice
        notices.info("service down", now);
        assert_eq!(notices.len(), 2);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let now = Instant::now();
        let mut notices = Notices::new(Duration::from_secs(5), 2);
        notices.info("one", now);
        notices.info("two", now);
        notices.info("three", now);
        let messages: Vec<_> = notices.iter().map(|n| n.message.as_str()).collect();
        assert_eq!(messages, ["two", "three"]);

        notices.dismiss(0);
        assert_eq!(notices.latest().unwrap().message, "three");
        assert_eq!(notices.len(), 1);
    }
}
