//! Session-scoped, time-bounded cache of unsaved edits.
//!
//! Entries live under `<prefix>:<data_key>:<session_id>`. The last active
//! session id lives under `<prefix>.last_session`, outside the content
//! namespace, so purging content never forgets it.
//!
//! Storage failures are logged and swallowed: the cache is best effort and
//! must never break an edit.

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};

use super::entry::CacheEntry;
use super::storage::{KvStorage, MemoryStorage};
use crate::phase::{DataKey, Phase};

pub const DEFAULT_KEY_PREFIX: &str = "toonflow";
pub const DEFAULT_RESTORE_WINDOW_SECS: i64 = 3600;

pub struct PersistenceCache {
    storage: Box<dyn KvStorage>,
    prefix: String,
    session_id: Option<String>,
    window: TimeDelta,
}

impl PersistenceCache {
    pub fn new(storage: Box<dyn KvStorage>, prefix: &str, window: TimeDelta) -> Self {
        Self {
            storage,
            prefix: prefix.to_string(),
            session_id: None,
            window,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(
            Box::new(MemoryStorage::new()),
            DEFAULT_KEY_PREFIX,
            TimeDelta::seconds(DEFAULT_RESTORE_WINDOW_SECS),
        )
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn set_session(&mut self, session_id: &str) {
        self.session_id = Some(session_id.to_string());
    }

    pub fn window(&self) -> TimeDelta {
        self.window
    }

    fn content_prefix(&self) -> String {
        format!("{}:", self.prefix)
    }

    fn last_session_key(&self) -> String {
        format!("{}.last_session", self.prefix)
    }

    pub fn entry_key(&self, key: DataKey) -> Option<String> {
        self.session_id
            .as_ref()
            .map(|session| format!("{}:{}:{}", self.prefix, key.as_str(), session))
    }

    pub fn save(&mut self, key: DataKey, payload: &str) -> bool {
        self.save_at(key, payload, Utc::now())
    }

    /// Record an edit. Returns false when nothing was written.
    pub fn save_at(&mut self, key: DataKey, payload: &str, now: DateTime<Utc>) -> bool {
        let (Some(session), Some(storage_key)) = (self.session_id.clone(), self.entry_key(key))
        else {
            warn!(key = %key, "No active session; edit not cached");
            return false;
        };
        let entry = CacheEntry::new(&session, key, payload, now);
        let encoded = match serde_json::to_string(&entry) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to encode cache entry");
                return false;
            }
        };
        match self.storage.set(&storage_key, &encoded) {
            Ok(()) => {
                debug!(key = %storage_key, "Cached edit");
                true
            }
            Err(e) => {
                warn!(key = %storage_key, error = %e, "Failed to cache edit");
                false
            }
        }
    }

    pub fn restore(&self, key: DataKey) -> Option<CacheEntry> {
        self.restore_at(key, Utc::now())
    }

    /// Cached entry for `key` if it belongs to the active session and is inside the window.
    pub fn restore_at(&self, key: DataKey, now: DateTime<Utc>) -> Option<CacheEntry> {
        let session = self.session_id.as_deref()?;
        let entry = self.read_entry(&self.entry_key(key)?)?;
        entry
            .is_restorable(session, now, self.window)
            .then_some(entry)
    }

    fn read_entry(&self, storage_key: &str) -> Option<CacheEntry> {
        let raw = match self.storage.get(storage_key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key = %storage_key, error = %e, "Failed to read cache entry");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(key = %storage_key, error = %e, "Ignoring unreadable cache entry");
                None
            }
        }
    }

    fn content_keys(&self) -> Vec<String> {
        let prefix = self.content_prefix();
        match self.storage.keys() {
            Ok(keys) => keys.into_iter().filter(|k| k.starts_with(&prefix)).collect(),
            Err(e) => {
                warn!(error = %e, "Failed to list cache keys");
                Vec::new()
            }
        }
    }

    /// Every readable cached entry, any session.
    pub fn entries(&self) -> Vec<CacheEntry> {
        self.content_keys()
            .iter()
            .filter_map(|k| self.read_entry(k))
            .collect()
    }

    /// Restorable entries for the active session, in pipeline order.
    pub fn restorable_at(&self, now: DateTime<Utc>) -> Vec<CacheEntry> {
        Phase::ALL
            .into_iter()
            .filter_map(|p| self.restore_at(p.data_key(), now))
            .collect()
    }

    pub fn forget(&mut self, key: DataKey) {
        if let Some(storage_key) = self.entry_key(key) {
            if let Err(e) = self.storage.remove(&storage_key) {
                warn!(key = %storage_key, error = %e, "Failed to remove cache entry");
            }
        }
    }

    /// Remove every cached content entry. Returns how many were removed.
    pub fn purge_content(&mut self) -> usize {
        let keys = self.content_keys();
        self.remove_all(&keys)
    }

    /// Remove expired or unreadable entries.
    pub fn purge_expired_at(&mut self, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self
            .content_keys()
            .into_iter()
            .filter(|k| {
                self.read_entry(k)
                    .is_none_or(|entry| entry.is_expired(now, self.window))
            })
            .collect();
        self.remove_all(&expired)
    }

    fn remove_all(&mut self, keys: &[String]) -> usize {
        let mut removed = 0;
        for key in keys {
            match self.storage.remove(key) {
                Ok(()) => removed += 1,
                Err(e) => warn!(key = %key, error = %e, "Failed to purge cache entry"),
            }
        }
        if removed > 0 {
            debug!(removed, "Purged cache entries");
        }
        removed
    }

    pub fn last_session(&self) -> Option<String> {
        match self.storage.get(&self.last_session_key()) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Failed to read last session id");
                None
            }
        }
    }

    pub fn record_last_session(&mut self, session_id: &str) {
        let key = self.last_session_key();
        if let Err(e) = self.storage.set(&key, session_id) {
            warn!(error = %e, "Failed to record last session id");
        }
    }
}
