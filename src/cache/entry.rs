//! Cached edit records.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::phase::DataKey;

/// One locally cached edit, scoped to the session it was made in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub session_id: String,
    pub key: DataKey,
    /// Committed phase body at the time of the edit.
    pub payload: String,
    pub timestamp: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(session_id: &str, key: DataKey, payload: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.to_string(),
            key,
            payload: payload.to_string(),
            timestamp,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
        now - self.timestamp
    }

    pub fn is_expired(&self, now: DateTime<Utc>, window: TimeDelta) -> bool {
        self.age(now) > window
    }

    /// Eligible for restore: same session and inside the restore window.
    pub fn is_restorable(&self, session_id: &str, now: DateTime<Utc>, window: TimeDelta) -> bool {
        self.session_id == session_id && !self.is_expired(now, window)
    }
}
