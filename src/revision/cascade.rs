//! Dependent-phase regeneration requests and their version fences.
//!
//! A request is fenced on the message version whose edit caused it. When the
//! result comes back, it is applied only if that version is still current;
//! a newer edit in between makes the result stale and it is discarded.
//! The queue holds at most one request per phase; a newer request replaces
//! the older one.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::content::MessageId;
use crate::phase::Phase;

/// The message version a regeneration was computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionFence {
    pub message_id: MessageId,
    pub version: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegenerationRequest {
    pub phase: Phase,
    /// Phase whose edit triggered this request.
    pub trigger: Phase,
    pub fence: VersionFence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only_index: Option<usize>,
    /// Flag and queue this phase's dependents once the result lands.
    #[serde(default)]
    pub cascade_on_apply: bool,
    pub not_before: DateTime<Utc>,
}

impl RegenerationRequest {
    pub fn new(phase: Phase, trigger: Phase, fence: VersionFence, delay: TimeDelta) -> Self {
        Self {
            phase,
            trigger,
            fence,
            only_index: None,
            cascade_on_apply: false,
            not_before: Utc::now() + delay,
        }
    }

    pub fn for_item(mut self, index: usize) -> Self {
        self.only_index = Some(index);
        self
    }

    pub fn cascading(mut self) -> Self {
        self.cascade_on_apply = true;
        self
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now
    }
}

/// What an in-flight generation must still match to be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationTicket {
    pub phase: Phase,
    pub fences: Vec<VersionFence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only_index: Option<usize>,
    #[serde(default)]
    pub cascade_on_apply: bool,
    /// A fresh run of the phase; applying it drops any queued regeneration of it.
    #[serde(default)]
    pub replaces_pending: bool,
}

/// Pending regenerations keyed by phase, last writer wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegenerationQueue {
    pending: BTreeMap<Phase, RegenerationRequest>,
}

impl RegenerationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `request`, replacing any pending request for the same phase.
    ///
    /// Two single-item requests for different items of one phase widen to
    /// the whole phase.
    pub fn schedule(&mut self, mut request: RegenerationRequest) {
        let phase = request.phase;
        if let Some(previous) = self.pending.remove(&phase) {
            if previous.only_index != request.only_index {
                request.only_index = None;
            }
            request.cascade_on_apply |= previous.cascade_on_apply;
            debug!(%phase, "Superseded pending regeneration");
        }
        self.pending.insert(phase, request);
    }

    /// Remove and return every request due at `now`, in pipeline order.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<RegenerationRequest> {
        let due: Vec<Phase> = self
            .pending
            .values()
            .filter(|r| r.is_due(now))
            .map(|r| r.phase)
            .collect();
        due.into_iter()
            .filter_map(|phase| self.pending.remove(&phase))
            .collect()
    }

    /// Earliest time any pending request becomes due.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.pending.values().map(|r| r.not_before).min()
    }

    pub fn get(&self, phase: Phase) -> Option<&RegenerationRequest> {
        self.pending.get(&phase)
    }

    pub fn cancel(&mut self, phase: Phase) -> Option<RegenerationRequest> {
        self.pending.remove(&phase)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegenerationRequest> {
        self.pending.values()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn fence(version: u32) -> VersionFence {
        VersionFence {
            message_id: Uuid::nil(),
            version,
        }
    }

    #[test]
    fn test_schedule_replaces_same_phase() {
        let mut queue = RegenerationQueue::new();
        queue.schedule(RegenerationRequest::new(
            Phase::StoryBoard,
            Phase::Script,
            fence(2),
            TimeDelta::zero(),
        ));
        queue.schedule(RegenerationRequest::new(
            Phase::StoryBoard,
            Phase::Script,
            fence(3),
            TimeDelta::zero(),
        ));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get(Phase::StoryBoard).map(|r| r.fence.version), Some(3));
    }

    #[test]
    fn test_take_due_respects_settle_delay() {
        let mut queue = RegenerationQueue::new();
        queue.schedule(RegenerationRequest::new(
            Phase::RoleDescription,
            Phase::Script,
            fence(1),
            TimeDelta::seconds(60),
        ));
        queue.schedule(RegenerationRequest::new(
            Phase::StoryBoard,
            Phase::Script,
            fence(1),
            TimeDelta::zero(),
        ));

        let due = queue.take_due(Utc::now());
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].phase, Phase::StoryBoard);
        assert_eq!(queue.len(), 1);

        let later = Utc::now() + TimeDelta::seconds(61);
        assert_eq!(queue.take_due(later).len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_different_items_widen_to_whole_phase() {
        let mut queue = RegenerationQueue::new();
        let base =
            RegenerationRequest::new(Phase::Audio, Phase::Audio, fence(2), TimeDelta::zero());
        queue.schedule(base.clone().for_item(0));
        queue.schedule(base.clone().for_item(0));
        assert_eq!(queue.get(Phase::Audio).and_then(|r| r.only_index), Some(0));
        queue.schedule(base.for_item(1));
        assert_eq!(queue.get(Phase::Audio).and_then(|r| r.only_index), None);
    }

    #[test]
    fn test_take_due_in_pipeline_order() {
        let mut queue = RegenerationQueue::new();
        for phase in [Phase::Film, Phase::StoryBoard, Phase::Video] {
            queue.schedule(RegenerationRequest::new(
                phase,
                Phase::Script,
                fence(1),
                TimeDelta::zero(),
            ));
        }
        let phases: Vec<Phase> = queue.take_due(Utc::now()).iter().map(|r| r.phase).collect();
        assert_eq!(phases, vec![Phase::StoryBoard, Phase::Video, Phase::Film]);
    }
}
