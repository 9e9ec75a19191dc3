//! User-facing notices raised by the engine (warnings, errors, info).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Pending notices, drained by whoever renders them.
#[derive(Debug, Clone, Default)]
pub struct Notices {
    pending: Vec<Notice>,
}

impl Notices {
    pub fn push(&mut self, level: NoticeLevel, message: impl Into<String>) {
        self.pending.push(Notice {
            level,
            message: message.into(),
            at: Utc::now(),
        });
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(NoticeLevel::Info, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(NoticeLevel::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(NoticeLevel::Error, message);
    }

    pub fn pending(&self) -> &[Notice] {
        &self.pending
    }

    pub fn drain(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.pending)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_empties_queue() {
        let mut notices = Notices::default();
        notices.warning("renumbered");
        notices.error("dispatch failed");
        let drained = notices.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].level, NoticeLevel::Warning);
        assert!(notices.is_empty());
    }
}
