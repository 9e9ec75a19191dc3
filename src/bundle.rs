//! The confirmation bundle: latest user-confirmed content per phase.
//!
//! Generation requests read upstream inputs from here, never from the
//! raw conversation.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

use crate::phase::{DataKey, Phase};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfirmationBundle {
    entries: BTreeMap<DataKey, Value>,
}

impl ConfirmationBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `partial` over the current entries; keys not mentioned are untouched.
    pub fn update<I>(&mut self, partial: I)
    where
        I: IntoIterator<Item = (DataKey, Value)>,
    {
        self.entries.extend(partial);
    }

    pub fn set(&mut self, key: DataKey, value: Value) {
        self.entries.insert(key, value);
    }

    pub fn read(&self, key: DataKey) -> Option<&Value> {
        self.entries.get(&key)
    }

    pub fn read_text(&self, key: DataKey) -> Option<&str> {
        self.read(key).and_then(Value::as_str)
    }

    /// Typed view of an entry. A malformed entry reads as absent.
    pub fn read_as<T: DeserializeOwned>(&self, key: DataKey) -> Option<T> {
        let value = self.read(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(typed) => Some(typed),
            Err(e) => {
                warn!(key = %key, error = %e, "Bundle entry does not match its payload shape");
                None
            }
        }
    }

    pub fn remove(&mut self, key: DataKey) -> Option<Value> {
        self.entries.remove(&key)
    }

    pub fn contains(&self, key: DataKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = DataKey> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries owned by phases strictly before `phase`: the inputs it generates from.
    pub fn upstream_of(&self, phase: Phase) -> ConfirmationBundle {
        let entries = self
            .entries
            .iter()
            .filter(|(key, _)| key.phase() < phase)
            .map(|(key, value)| (*key, value.clone()))
            .collect();
        ConfirmationBundle { entries }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(&self.entries).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_merges_without_touching_other_keys() {
        let mut bundle = ConfirmationBundle::new();
        bundle.update([(DataKey::Script, json!("T1")), (DataKey::Storyboards, json!("S1"))]);
        bundle.update([(DataKey::Script, json!("T2"))]);
        assert_eq!(bundle.read_text(DataKey::Script), Some("T2"));
        assert_eq!(bundle.read_text(DataKey::Storyboards), Some("S1"));
        assert_eq!(bundle.len(), 2);
    }

    #[test]
    fn test_upstream_of_excludes_own_and_later_keys() {
        let mut bundle = ConfirmationBundle::new();
        bundle.set(DataKey::Script, json!("T"));
        bundle.set(DataKey::Storyboards, json!("S"));
        bundle.set(DataKey::RoleDescriptions, json!("R"));

        let inputs = bundle.upstream_of(Phase::StoryBoard);
        assert!(inputs.contains(DataKey::Script));
        assert!(!inputs.contains(DataKey::Storyboards));
        assert!(!inputs.contains(DataKey::RoleDescriptions));
    }

    #[test]
    fn test_serializes_with_wire_keys() {
        let mut bundle = ConfirmationBundle::new();
        bundle.set(DataKey::FirstFrameImages, json!([{"index": 0, "images": []}]));
        let value = bundle.to_value();
        assert!(value.get("first_frame_images").is_some());

        let back: ConfirmationBundle = serde_json::from_value(value).unwrap();
        assert_eq!(back, bundle);
    }

    #[test]
    fn test_read_as_tolerates_wrong_shape() {
        let mut bundle = ConfirmationBundle::new();
        bundle.set(DataKey::Tones, json!("not a list"));
        let tones: Option<Vec<crate::models::Tone>> = bundle.read_as(DataKey::Tones);
        assert!(tones.is_none());
    }
}
