//! Staleness flags: which phases (or items within them) need regenerating.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::phase::Phase;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleMark {
    /// The whole phase derives from superseded upstream content.
    Whole,
    /// Only these item indices are affected.
    Items(BTreeSet<usize>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaleFlags {
    marks: BTreeMap<Phase, StaleMark>,
}

impl StaleFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_phase(&mut self, phase: Phase) {
        self.marks.insert(phase, StaleMark::Whole);
    }

    /// Flag one item; a phase already stale as a whole stays whole.
    pub fn mark_item(&mut self, phase: Phase, index: usize) {
        match self
            .marks
            .entry(phase)
            .or_insert_with(|| StaleMark::Items(BTreeSet::new()))
        {
            StaleMark::Whole => {}
            StaleMark::Items(items) => {
                items.insert(index);
            }
        }
    }

    pub fn clear_phase(&mut self, phase: Phase) {
        self.marks.remove(&phase);
    }

    /// Clear one item flag. A whole-phase mark is left in place.
    pub fn clear_item(&mut self, phase: Phase, index: usize) {
        if let Some(StaleMark::Items(items)) = self.marks.get_mut(&phase) {
            items.remove(&index);
            if items.is_empty() {
                self.marks.remove(&phase);
            }
        }
    }

    pub fn is_stale(&self, phase: Phase) -> bool {
        self.marks.contains_key(&phase)
    }

    pub fn is_item_stale(&self, phase: Phase, index: usize) -> bool {
        match self.marks.get(&phase) {
            Some(StaleMark::Whole) => true,
            Some(StaleMark::Items(items)) => items.contains(&index),
            None => false,
        }
    }

    pub fn mark(&self, phase: Phase) -> Option<&StaleMark> {
        self.marks.get(&phase)
    }

    /// Stale phases in pipeline order.
    pub fn stale_phases(&self) -> Vec<Phase> {
        self.marks.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    pub fn reset(&mut self) {
        self.marks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_marks_accumulate_and_clear() {
        let mut flags = StaleFlags::new();
        flags.mark_item(Phase::Audio, 1);
        flags.mark_item(Phase::Audio, 3);
        assert!(flags.is_item_stale(Phase::Audio, 3));
        assert!(!flags.is_item_stale(Phase::Audio, 2));

        flags.clear_item(Phase::Audio, 1);
        flags.clear_item(Phase::Audio, 3);
        assert!(!flags.is_stale(Phase::Audio));
    }

    #[test]
    fn test_whole_mark_absorbs_items() {
        let mut flags = StaleFlags::new();
        flags.mark_phase(Phase::Video);
        flags.mark_item(Phase::Video, 0);
        flags.clear_item(Phase::Video, 0);
        assert_eq!(flags.mark(Phase::Video), Some(&StaleMark::Whole));
        assert!(flags.is_item_stale(Phase::Video, 7));
    }

    #[test]
    fn test_stale_phases_ordered() {
        let mut flags = StaleFlags::new();
        flags.mark_phase(Phase::Film);
        flags.mark_phase(Phase::StoryBoard);
        assert_eq!(flags.stale_phases(), vec![Phase::StoryBoard, Phase::Film]);
        flags.reset();
        assert!(flags.is_empty());
    }
}
