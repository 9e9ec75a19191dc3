//! Revision audit trail: every commit to phase content, with a content hash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::phase::Phase;
use crate::util::content_hash;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSession {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub events: Vec<RevisionAudit>,
}

impl AuditSession {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            started_at: Utc::now(),
            ended_at: None,
            events: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.ended_at = Some(Utc::now());
    }

    pub fn events_for(&self, phase: Phase) -> impl Iterator<Item = &RevisionAudit> {
        self.events.iter().filter(move |e| e.phase == phase)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RevisionKind {
    Generated,
    Edited,
    ItemEdited { index: usize },
    Regenerated {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
    },
    Selected { index: usize, url: String },
    Restored,
    Discarded,
    Failed { reason: String },
}

impl fmt::Display for RevisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevisionKind::Generated => f.write_str("generated"),
            RevisionKind::Edited => f.write_str("edited"),
            RevisionKind::ItemEdited { index } => write!(f, "edited item {}", index),
            RevisionKind::Regenerated { index: Some(index) } => {
                write!(f, "regenerated item {}", index)
            }
            RevisionKind::Regenerated { index: None } => f.write_str("regenerated"),
            RevisionKind::Selected { index, url } => {
                write!(f, "selected {} for item {}", url, index)
            }
            RevisionKind::Restored => f.write_str("restored from cache"),
            RevisionKind::Discarded => f.write_str("discarded outdated result"),
            RevisionKind::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionAudit {
    pub phase: Phase,
    #[serde(flatten)]
    pub kind: RevisionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Uuid>,
    pub version: u32,
    /// Short SHA-256 of the committed body; empty when nothing was committed.
    #[serde(default)]
    pub content_hash: String,
    #[serde(default)]
    pub chars: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependents: Vec<Phase>,
    pub at: DateTime<Utc>,
}

impl RevisionAudit {
    /// Record for a committed body.
    pub fn committed(
        phase: Phase,
        kind: RevisionKind,
        message_id: Uuid,
        version: u32,
        body: &str,
    ) -> Self {
        Self {
            phase,
            kind,
            message_id: Some(message_id),
            version,
            content_hash: content_hash(body),
            chars: body.chars().count(),
            dependents: Vec::new(),
            at: Utc::now(),
        }
    }

    /// Record for an event that committed nothing.
    pub fn uncommitted(phase: Phase, kind: RevisionKind) -> Self {
        Self {
            phase,
            kind,
            message_id: None,
            version: 0,
            content_hash: String::new(),
            chars: 0,
            dependents: Vec::new(),
            at: Utc::now(),
        }
    }

    pub fn with_dependents(mut self, dependents: &[Phase]) -> Self {
        self.dependents = dependents.to_vec();
        self
    }
}

pub mod logger;
pub use logger::AuditLogger;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        assert_eq!(RevisionKind::Regenerated { index: Some(2) }.to_string(), "regenerated item 2");
        assert_eq!(
            RevisionKind::Failed { reason: "timeout".into() }.to_string(),
            "failed: timeout"
        );
    }

    #[test]
    fn test_committed_record_hashes_body() {
        let id = Uuid::new_v4();
        let a = RevisionAudit::committed(Phase::Script, RevisionKind::Edited, id, 2, "T2");
        let b = RevisionAudit::committed(Phase::Script, RevisionKind::Edited, id, 3, "T2");
        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(a.chars, 2);
        assert_eq!(a.message_id, Some(id));
    }

    #[test]
    fn test_kind_serializes_flat() {
        let record = RevisionAudit::committed(
            Phase::RoleImage,
            RevisionKind::Selected {
                index: 1,
                url: "u".into(),
            },
            Uuid::new_v4(),
            4,
            "{}",
        )
        .with_dependents(&[Phase::Film]);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["kind"], "selected");
        assert_eq!(value["index"], 1);
        assert_eq!(value["dependents"][0], "Film");

        let back: RevisionAudit = serde_json::from_value(value).unwrap();
        assert_eq!(back.kind, record.kind);
    }

    #[test]
    fn test_events_for_phase() {
        let mut session = AuditSession::new("s1");
        session
            .events
            .push(RevisionAudit::uncommitted(Phase::Tone, RevisionKind::Discarded));
        session.events.push(RevisionAudit::uncommitted(
            Phase::Audio,
            RevisionKind::Failed { reason: "x".into() },
        ));
        assert_eq!(session.events_for(Phase::Tone).count(), 1);
        assert!(session.ended_at.is_none());
        session.finish();
        assert!(session.ended_at.is_some());
    }
}
