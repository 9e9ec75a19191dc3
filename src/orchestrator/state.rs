//! Append-only journal of pipeline events, one line per event:
//! `phase|version|status|timestamp`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use crate::phase::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalStatus {
    Started,
    Completed,
    Failed,
    Discarded,
    Edited,
    Regenerated,
}

impl JournalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JournalStatus::Started => "started",
            JournalStatus::Completed => "completed",
            JournalStatus::Failed => "failed",
            JournalStatus::Discarded => "discarded",
            JournalStatus::Edited => "edited",
            JournalStatus::Regenerated => "regenerated",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        [
            JournalStatus::Started,
            JournalStatus::Completed,
            JournalStatus::Failed,
            JournalStatus::Discarded,
            JournalStatus::Edited,
            JournalStatus::Regenerated,
        ]
        .into_iter()
        .find(|status| status.as_str() == s)
    }
}

impl fmt::Display for JournalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    pub phase: Phase,
    /// Message version the event produced; 0 when none.
    pub version: u32,
    pub status: JournalStatus,
    pub timestamp: DateTime<Utc>,
}

pub struct StateManager {
    state_file: PathBuf,
}

impl StateManager {
    pub fn new(state_file: PathBuf) -> Self {
        Self { state_file }
    }

    pub fn save(&self, phase: Phase, version: u32, status: JournalStatus) -> Result<()> {
        let entry = format!(
            "{}|{}|{}|{}\n",
            phase.name(),
            version,
            status,
            Utc::now().to_rfc3339()
        );

        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.state_file)
            .context("Failed to open state file")?
            .write_all(entry.as_bytes())
            .context("Failed to write state entry")?;

        Ok(())
    }

    /// Get the last phase recorded as completed.
    pub fn get_last_completed_phase(&self) -> Option<Phase> {
        self.get_entries()
            .ok()?
            .into_iter()
            .rfind(|e| e.status == JournalStatus::Completed)
            .map(|e| e.phase)
    }

    /// All readable entries. Malformed lines are skipped.
    pub fn get_entries(&self) -> Result<Vec<StateEntry>> {
        if !self.state_file.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.state_file).context("Failed to read state file")?;

        let entries = content
            .lines()
            .filter_map(|line| {
                let parts: Vec<&str> = line.split('|').collect();
                if parts.len() != 4 {
                    return None;
                }
                Some(StateEntry {
                    phase: parts[0].parse().ok()?,
                    version: parts[1].parse().unwrap_or(0),
                    status: JournalStatus::parse(parts[2])?,
                    timestamp: DateTime::parse_from_rfc3339(parts[3])
                        .ok()?
                        .with_timezone(&Utc),
                })
            })
            .collect();

        Ok(entries)
    }

    pub fn get_phase_entries(&self, phase: Phase) -> Result<Vec<StateEntry>> {
        let entries = self.get_entries()?;
        Ok(entries.into_iter().filter(|e| e.phase == phase).collect())
    }

    pub fn reset(&self) -> Result<()> {
        if self.state_file.exists() {
            fs::remove_file(&self.state_file).context("Failed to remove state file")?;
        }
        Ok(())
    }
}
