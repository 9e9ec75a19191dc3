//! On-disk snapshot of one creative session: content, bundle, stale flags,
//! pending regenerations and sequencer progress.
//!
//! The CLI is a series of short processes; each one loads the snapshot,
//! runs one command against it and saves it back.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

use crate::revision::ControllerState;
use crate::sequencer::PhaseProgress;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub state: ControllerState,
    #[serde(default)]
    pub progress: PhaseProgress,
}

impl SessionSnapshot {
    /// Fresh snapshot with a new random session id.
    pub fn new(auto_next: bool) -> Self {
        Self::with_id(&Uuid::new_v4().to_string(), auto_next)
    }

    pub fn with_id(session_id: &str, auto_next: bool) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            created_at: now,
            updated_at: now,
            state: ControllerState::default(),
            progress: PhaseProgress {
                auto_next,
                ..PhaseProgress::default()
            },
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {}", path.display()))
    }

    /// Load the snapshot at `path`, if there is one.
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        if path.exists() {
            Self::load(path).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Write atomically: temp file, then rename.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.updated_at = Utc::now();
        let json = serde_json::to_string_pretty(self).context("Failed to serialize session")?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write session file: {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace session file: {}", path.display()))?;
        debug!(session = %self.session_id, path = %path.display(), "Saved session");
        Ok(())
    }

    /// Structural problems in the snapshot, empty when consistent.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !self.state.store.is_consistent() {
            problems.push("a message's current version is missing from its history".to_string());
        }
        for key in self.state.bundle_mismatches() {
            problems.push(format!(
                "bundle entry '{}' does not match the current content",
                key
            ));
        }
        problems
    }
}
