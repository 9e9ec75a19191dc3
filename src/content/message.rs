//! Versioned conversation messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::phase::{self, Phase};

pub type MessageId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    Text,
    PhaseContent,
}

/// One piece of a message version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub kind: FragmentKind,
    pub content: String,
}

impl Fragment {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: FragmentKind::Text,
            content: content.into(),
        }
    }

    /// Phase content fragment; the body is prefixed with the phase marker.
    pub fn phase_content(phase: Phase, body: &str) -> Self {
        Self {
            kind: FragmentKind::PhaseContent,
            content: phase::with_marker(phase, body),
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        match self.kind {
            FragmentKind::PhaseContent => phase::marker_of(&self.content),
            FragmentKind::Text => None,
        }
    }

    /// Content without the phase marker.
    pub fn body(&self) -> String {
        phase::strip_marker(&self.content)
    }
}

/// A conversation message holding every version it ever had.
///
/// `current_version` always names an existing entry in `versions`, and
/// version numbers run contiguously from 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    role: Role,
    versions: BTreeMap<u32, Vec<Fragment>>,
    current_version: u32,
    created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, fragments: Vec<Fragment>) -> Self {
        let mut versions = BTreeMap::new();
        versions.insert(1, fragments);
        Self {
            id: Uuid::new_v4(),
            role,
            versions,
            current_version: 1,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn current_version(&self) -> u32 {
        self.current_version
    }

    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    pub fn current_fragments(&self) -> &[Fragment] {
        self.fragments_at(self.current_version).unwrap_or(&[])
    }

    pub fn fragments_at(&self, version: u32) -> Option<&[Fragment]> {
        self.versions.get(&version).map(Vec::as_slice)
    }

    /// Phase tagged by the first phase-content fragment of the current version.
    pub fn phase(&self) -> Option<Phase> {
        self.current_fragments().iter().find_map(Fragment::phase)
    }

    /// Current phase body, marker stripped.
    pub fn phase_body(&self) -> Option<String> {
        self.current_fragments()
            .iter()
            .find(|f| f.kind == FragmentKind::PhaseContent)
            .map(Fragment::body)
    }

    /// Plain text of the current version, fragments joined by blank lines.
    pub fn text(&self) -> String {
        self.current_fragments()
            .iter()
            .map(|f| match f.kind {
                FragmentKind::Text => f.content.clone(),
                FragmentKind::PhaseContent => f.body(),
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Every version as `(number, text)`, oldest first.
    pub fn history(&self) -> Vec<(u32, String)> {
        self.versions
            .iter()
            .map(|(version, fragments)| {
                let text = fragments
                    .iter()
                    .map(Fragment::body)
                    .collect::<Vec<_>>()
                    .join("\n\n");
                (*version, text)
            })
            .collect()
    }

    /// Store `fragments` as the next version and make it current.
    pub(crate) fn push_version(&mut self, fragments: Vec<Fragment>) -> u32 {
        let next = self.versions.keys().next_back().copied().unwrap_or(0) + 1;
        self.versions.insert(next, fragments);
        self.current_version = next;
        next
    }

    /// True when versions are contiguous from 1 and the current one exists.
    pub fn is_consistent(&self) -> bool {
        self.versions.contains_key(&self.current_version)
            && self
                .versions
                .keys()
                .copied()
                .eq(1..=self.versions.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message_starts_at_version_one() {
        let msg = Message::new(Role::Assistant, vec![Fragment::phase_content(Phase::Script, "T1")]);
        assert_eq!(msg.current_version(), 1);
        assert_eq!(msg.phase(), Some(Phase::Script));
        assert_eq!(msg.phase_body().as_deref(), Some("T1"));
        assert!(msg.is_consistent());
    }

    #[test]
    fn test_push_version_moves_current_forward() {
        let mut msg = Message::new(
            Role::Assistant,
            vec![Fragment::phase_content(Phase::Script, "T1")],
        );
        let v = msg.push_version(vec![Fragment::phase_content(Phase::Script, "T2")]);
        assert_eq!(v, 2);
        assert_eq!(msg.current_version(), 2);
        assert_eq!(msg.phase_body().as_deref(), Some("T2"));
        assert_eq!(msg.fragments_at(1).map(|f| f[0].body()), Some("T1".to_string()));
        assert_eq!(msg.history().len(), 2);
        assert!(msg.is_consistent());
    }

    #[test]
    fn test_text_fragments_have_no_phase() {
        let msg = Message::new(Role::User, vec![Fragment::text("a rabbit finds a carrot")]);
        assert_eq!(msg.phase(), None);
        assert_eq!(msg.text(), "a rabbit finds a carrot");
    }

    #[test]
    fn test_inconsistent_message_detected() {
        let json = serde_json::json!({
            "id": Uuid::nil(),
            "role": "assistant",
            "versions": { "1": [], "3": [] },
            "current_version": 3,
            "created_at": "2026-01-01T00:00:00Z"
        });
        let msg: Message = serde_json::from_value(json).unwrap();
        assert!(!msg.is_consistent());
    }
}
