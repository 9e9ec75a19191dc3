//! Ordered, append-only message store.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::message::{Fragment, Message, MessageId, Role};
use crate::errors::StoreError;
use crate::phase::Phase;

/// Conversation messages in arrival order.
///
/// Messages are never removed individually; edits add versions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentStore {
    messages: Vec<Message>,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_message(&mut self, role: Role, fragments: Vec<Fragment>) -> MessageId {
        let message = Message::new(role, fragments);
        let id = message.id();
        debug!(message_id = %id, ?role, "Appended message");
        self.messages.push(message);
        id
    }

    pub fn append_user_text(&mut self, text: &str) -> MessageId {
        self.append_message(Role::User, vec![Fragment::text(text)])
    }

    /// Assistant message carrying a single phase-content fragment.
    pub fn append_phase_message(&mut self, phase: Phase, body: &str) -> MessageId {
        self.append_message(Role::Assistant, vec![Fragment::phase_content(phase, body)])
    }

    /// Add a new version of an assistant message and make it current.
    pub fn append_version(
        &mut self,
        id: MessageId,
        phase: Phase,
        body: &str,
    ) -> Result<u32, StoreError> {
        let message = self
            .messages
            .iter_mut()
            .find(|m| m.id() == id)
            .ok_or(StoreError::MessageNotFound { id })?;
        if message.role() != Role::Assistant {
            return Err(StoreError::NotAssistant { id });
        }
        let version = message.push_version(vec![Fragment::phase_content(phase, body)]);
        debug!(message_id = %id, %phase, version, "Appended message version");
        Ok(version)
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id() == id)
    }

    pub fn current_version_of(&self, id: MessageId) -> Option<u32> {
        self.get(id).map(Message::current_version)
    }

    /// Most recent assistant message whose current version carries content for `phase`.
    pub fn find_latest_by_phase(&self, phase: Phase) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role() == Role::Assistant)
            .find(|m| m.current_fragments().iter().any(|f| f.phase() == Some(phase)))
    }

    /// Current body for `phase`, marker stripped.
    pub fn current_body(&self, phase: Phase) -> Option<String> {
        self.find_latest_by_phase(phase).and_then(Message::phase_body)
    }

    pub fn has_phase(&self, phase: Phase) -> bool {
        self.find_latest_by_phase(phase).is_some()
    }

    /// Phases that currently have content, in pipeline order.
    pub fn phases_with_content(&self) -> Vec<Phase> {
        Phase::ALL
            .into_iter()
            .filter(|p| self.has_phase(*p))
            .collect()
    }

    /// Text of the most recent user message.
    pub fn latest_user_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role() == Role::User)
            .map(Message::text)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// True when every message satisfies its version invariants.
    pub fn is_consistent(&self) -> bool {
        self.messages.iter().all(Message::is_consistent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_latest_by_phase_prefers_newest() {
        let mut store = ContentStore::new();
        store.append_phase_message(Phase::Script, "first");
        let second = store.append_phase_message(Phase::Script, "second");
        store.append_phase_message(Phase::StoryBoard, "分镜1：");

        let found = store.find_latest_by_phase(Phase::Script).unwrap();
        assert_eq!(found.id(), second);
        assert_eq!(store.current_body(Phase::Script).as_deref(), Some("second"));
        assert!(store.find_latest_by_phase(Phase::Film).is_none());
    }

    #[test]
    fn test_append_version_bumps_current() {
        let mut store = ContentStore::new();
        let id = store.append_phase_message(Phase::Script, "T1");
        let v = store.append_version(id, Phase::Script, "T2").unwrap();
        assert_eq!(v, 2);
        assert_eq!(store.current_version_of(id), Some(2));
        assert_eq!(store.current_body(Phase::Script).as_deref(), Some("T2"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_append_version_rejects_unknown_and_user_messages() {
        let mut store = ContentStore::new();
        let user = store.append_user_text("premise");
        assert!(matches!(
            store.append_version(user, Phase::Script, "x"),
            Err(StoreError::NotAssistant { .. })
        ));
        assert!(matches!(
            store.append_version(uuid::Uuid::new_v4(), Phase::Script, "x"),
            Err(StoreError::MessageNotFound { .. })
        ));
    }

    #[test]
    fn test_user_messages_are_never_phase_content() {
        let mut store = ContentStore::new();
        store.append_user_text("phase=Script\nsneaky");
        assert!(!store.has_phase(Phase::Script));
        assert_eq!(store.latest_user_text().as_deref(), Some("phase=Script\nsneaky"));
    }

    #[test]
    fn test_phases_with_content_in_pipeline_order() {
        let mut store = ContentStore::new();
        store.append_phase_message(Phase::RoleDescription, "角色1：兔子");
        store.append_phase_message(Phase::Script, "T");
        assert_eq!(
            store.phases_with_content(),
            vec![Phase::Script, Phase::RoleDescription]
        );
        assert!(store.is_consistent());
    }
}
