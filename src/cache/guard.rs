//! Session guard: decides when cached edits are restored and when they are purged.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::persistence::PersistenceCache;
use super::similarity;
use crate::phase::Phase;
use crate::revision::RevisionController;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountOutcome {
    /// The active session differs from the last one; all cached content and
    /// stale flags were dropped.
    NewSession {
        previous: Option<String>,
        purged: usize,
    },
    /// Same session; these phases had cached edits re-applied.
    Resumed { restored: Vec<Phase>, expired: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct SessionGuard {
    threshold: f64,
}

impl Default for SessionGuard {
    fn default() -> Self {
        Self::new(similarity::DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl SessionGuard {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn on_mount(
        &self,
        session_id: &str,
        cache: &mut PersistenceCache,
        controller: &mut RevisionController,
    ) -> MountOutcome {
        self.on_mount_at(session_id, cache, controller, Utc::now())
    }

    /// Bind the cache to `session_id`, then purge or restore.
    pub fn on_mount_at(
        &self,
        session_id: &str,
        cache: &mut PersistenceCache,
        controller: &mut RevisionController,
        now: DateTime<Utc>,
    ) -> MountOutcome {
        cache.set_session(session_id);
        let previous = cache.last_session();
        if previous.as_deref() != Some(session_id) {
            let purged = cache.purge_content();
            cache.record_last_session(session_id);
            controller.reset_stale();
            info!(session = session_id, purged, "New session; cleared cached edits");
            return MountOutcome::NewSession { previous, purged };
        }

        let expired = cache.purge_expired_at(now);
        let mut restored = Vec::new();
        for entry in cache.restorable_at(now) {
            let phase = entry.key.phase();
            match controller.restore_edit(phase, &entry.payload) {
                Ok(Some(_)) => restored.push(phase),
                Ok(None) => {}
                Err(e) => {
                    warn!(%phase, error = %e, "Dropping cached edit that no longer validates");
                    cache.forget(entry.key);
                }
            }
        }
        if !restored.is_empty() {
            info!(session = session_id, ?restored, "Restored cached edits");
        }
        MountOutcome::Resumed { restored, expired }
    }

    /// Compare freshly streamed content with the cached edit for `phase`.
    ///
    /// When they share too few significant tokens the cache belongs to other
    /// content and everything cached is purged. Returns true on purge.
    pub fn check_stream(&self, phase: Phase, fresh: &str, cache: &mut PersistenceCache) -> bool {
        let Some(entry) = cache.restore(phase.data_key()) else {
            return false;
        };
        let ratio = similarity::overlap_ratio(&entry.payload, fresh);
        if ratio >= self.threshold {
            return false;
        }
        let purged = cache.purge_content();
        info!(%phase, ratio, purged, "Streamed content diverged from cached edit; cache cleared");
        true
    }
}
