//! Revision controller: validates user edits, commits them as new message
//! versions, keeps the confirmation bundle in step, and flags or queues the
//! dependent phases that an edit invalidates.
//!
//! Every write goes through one commit path, so the bundle entry for a phase
//! is always derived from that phase's current message version.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::cascade::{GenerationTicket, RegenerationQueue, RegenerationRequest, VersionFence};
use crate::bundle::ConfirmationBundle;
use crate::content::{ContentStore, Message, MessageId};
use crate::descriptions;
use crate::errors::{CascadeError, RevisionError, ValidationError};
use crate::generate::{GenerationMode, GenerationRequest, GenerationResult, GenerationStatus};
use crate::models;
use crate::notice::{Notice, Notices};
use crate::phase::{self, DataKey, Phase};
use crate::stale::StaleFlags;
use crate::storyboard;

/// Everything the controller owns that outlives a single process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerState {
    #[serde(default)]
    pub store: ContentStore,
    #[serde(default)]
    pub bundle: ConfirmationBundle,
    #[serde(default)]
    pub stale: StaleFlags,
    #[serde(default)]
    pub queue: RegenerationQueue,
}

impl ControllerState {
    /// Bundle keys whose value no longer matches the owning phase's current content.
    pub fn bundle_mismatches(&self) -> Vec<DataKey> {
        self.bundle
            .keys()
            .filter(|key| {
                let phase = key.phase();
                let derived = self
                    .store
                    .current_body(phase)
                    .and_then(|body| models::bundle_value(phase, &body).ok());
                derived.as_ref() != self.bundle.read(*key)
            })
            .collect()
    }
}

/// Result of a committed edit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditOutcome {
    pub phase: Phase,
    pub message_id: MessageId,
    pub version: u32,
    /// Committed body, after normalization.
    pub body: String,
    /// Phases flagged stale by this edit.
    pub dependents: Vec<Phase>,
    /// Phases queued for regeneration by this edit.
    pub scheduled: Vec<Phase>,
    pub warnings: Vec<String>,
}

/// What happened to a generation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied {
        phase: Phase,
        message_id: MessageId,
        version: u32,
    },
    /// The fence broke while the request was in flight.
    Discarded { phase: Phase },
    /// The collaborator reported an error.
    Failed { phase: Phase, reason: String },
}

pub struct RevisionController {
    state: ControllerState,
    notices: Notices,
    settle_delay: TimeDelta,
}

impl RevisionController {
    pub fn new(settle_delay: TimeDelta) -> Self {
        Self::from_state(ControllerState::default(), settle_delay)
    }

    pub fn from_state(state: ControllerState, settle_delay: TimeDelta) -> Self {
        Self {
            state,
            notices: Notices::default(),
            settle_delay,
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn store(&self) -> &ContentStore {
        &self.state.store
    }

    pub fn bundle(&self) -> &ConfirmationBundle {
        &self.state.bundle
    }

    pub fn stale(&self) -> &StaleFlags {
        &self.state.stale
    }

    pub fn queue(&self) -> &RegenerationQueue {
        &self.state.queue
    }

    pub fn notices(&self) -> &[Notice] {
        self.notices.pending()
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.drain()
    }

    pub fn append_user_text(&mut self, text: &str) -> MessageId {
        self.state.store.append_user_text(text)
    }

    /// Drop every stale flag, e.g. when a new session starts.
    pub fn reset_stale(&mut self) {
        self.state.stale.reset();
    }

    /// Forget all content, flags and pending regenerations.
    pub fn clear(&mut self) {
        self.state = ControllerState::default();
        self.notices.drain();
    }

    /// Replace a phase's content with `content` and invalidate what depends on it.
    ///
    /// Storyboards are renumbered when needed (with a warning). Structured
    /// phases must parse as their payload shape; media phases lose their
    /// attached assets and are queued to regenerate them. Every later phase
    /// that already has content is flagged stale and queued for regeneration.
    #[instrument(skip(self, content), fields(phase = %phase))]
    pub fn edit_phase(
        &mut self,
        phase: Phase,
        content: &str,
    ) -> Result<EditOutcome, RevisionError> {
        let (body, warnings) = self.prepare(phase, content, true)?;
        for warning in &warnings {
            self.notices.warning(warning.clone());
        }

        let fence = self.commit(phase, &body)?;
        self.state.queue.cancel(phase);

        let mut scheduled = Vec::new();
        if phase.has_media_asset() {
            self.state.stale.mark_phase(phase);
            self.schedule(phase, phase, fence, None, false);
            scheduled.push(phase);
        } else {
            self.state.stale.clear_phase(phase);
        }

        let dependents = self.cascade(phase, fence);
        scheduled.extend(dependents.iter().copied());
        info!(version = fence.version, dependents = dependents.len(), "Edit committed");

        Ok(EditOutcome {
            phase,
            message_id: fence.message_id,
            version: fence.version,
            body,
            dependents,
            scheduled,
            warnings,
        })
    }

    /// Replace one item of a description list or one tone line.
    ///
    /// Only the same-index items downstream are flagged; nothing is queued.
    #[instrument(skip(self, value), fields(phase = %phase, index))]
    pub fn edit_item(
        &mut self,
        phase: Phase,
        index: usize,
        value: &str,
    ) -> Result<EditOutcome, RevisionError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ValidationError::Empty { phase }.into());
        }
        let current = self
            .state
            .store
            .current_body(phase)
            .ok_or(ValidationError::NoContent { phase })?;

        let (body, subject) = if phase.is_description_list() {
            let subject = descriptions::parse_items(&current)
                .get(index)
                .map(|item| item.subject().to_string());
            (descriptions::replace_item(phase, &current, index, value)?, subject)
        } else if phase == Phase::Tone {
            let payload = models::bundle_value(phase, &current)?;
            let edited = models::edit_tone_line(&payload, index, value)?;
            (self.encode(phase, &edited)?, None)
        } else {
            return Err(ValidationError::Unsupported {
                phase,
                operation: "item edits",
            }
            .into());
        };

        let fence = self.commit(phase, &body)?;
        let dependents = self.flag_item_dependents(phase, index, subject.as_deref());
        Ok(EditOutcome {
            phase,
            message_id: fence.message_id,
            version: fence.version,
            body,
            dependents,
            scheduled: Vec::new(),
            warnings: Vec::new(),
        })
    }

    /// Clear the generated asset of one media item and queue it for regeneration.
    #[instrument(skip(self), fields(phase = %phase, index))]
    pub fn regenerate_item(
        &mut self,
        phase: Phase,
        index: usize,
    ) -> Result<EditOutcome, RevisionError> {
        if !phase.has_media_asset() || phase == Phase::Film {
            return Err(ValidationError::Unsupported {
                phase,
                operation: "item regeneration",
            }
            .into());
        }
        let payload = self.current_payload(phase)?;
        let cleared = models::clear_assets(phase, &payload, Some(index))?;
        let body = self.encode(phase, &cleared)?;

        let fence = self.commit(phase, &body)?;
        self.state.stale.clear_item(phase, index);
        self.schedule(phase, phase, fence, Some(index), false);
        let dependents = self.flag_item_dependents(phase, index, None);
        Ok(EditOutcome {
            phase,
            message_id: fence.message_id,
            version: fence.version,
            body,
            dependents,
            scheduled: vec![phase],
            warnings: Vec::new(),
        })
    }

    /// Queue a whole phase for regeneration.
    ///
    /// Media phases drop their assets first. Text phases keep their content
    /// until the new result lands, then invalidate their dependents.
    #[instrument(skip(self), fields(phase = %phase))]
    pub fn regenerate_phase(&mut self, phase: Phase) -> Result<EditOutcome, RevisionError> {
        let (fence, body) = if phase.has_media_asset() {
            let payload = self.current_payload(phase)?;
            let cleared = models::clear_assets(phase, &payload, None)?;
            let body = self.encode(phase, &cleared)?;
            (self.commit(phase, &body)?, body)
        } else {
            let fence = self
                .fence_for(phase)
                .ok_or(ValidationError::NoContent { phase })?;
            let body = self.state.store.current_body(phase).unwrap_or_default();
            (fence, body)
        };

        self.state.stale.mark_phase(phase);
        self.schedule(phase, phase, fence, None, !phase.has_media_asset());
        Ok(EditOutcome {
            phase,
            message_id: fence.message_id,
            version: fence.version,
            body,
            dependents: Vec::new(),
            scheduled: vec![phase],
            warnings: Vec::new(),
        })
    }

    /// Pin one generated candidate as the chosen asset of an item.
    #[instrument(skip(self, url), fields(phase = %phase, index))]
    pub fn select_candidate(
        &mut self,
        phase: Phase,
        index: usize,
        url: &str,
    ) -> Result<EditOutcome, RevisionError> {
        let payload = self.current_payload(phase)?;
        let selected = models::select_asset(phase, &payload, index, url)?;
        let body = self.encode(phase, &selected)?;

        let fence = self.commit(phase, &body)?;
        self.state.stale.clear_item(phase, index);
        let dependents = self.flag_item_dependents(phase, index, None);
        Ok(EditOutcome {
            phase,
            message_id: fence.message_id,
            version: fence.version,
            body,
            dependents,
            scheduled: Vec::new(),
            warnings: Vec::new(),
        })
    }

    /// Re-apply a cached edit without cascading.
    ///
    /// Produces the same bundle state `edit_phase` would have. Returns
    /// `None` when the phase already holds exactly this content.
    #[instrument(skip(self, content), fields(phase = %phase))]
    pub fn restore_edit(
        &mut self,
        phase: Phase,
        content: &str,
    ) -> Result<Option<EditOutcome>, RevisionError> {
        let (body, warnings) = self.prepare(phase, content, true)?;
        if self.state.store.current_body(phase).as_deref() == Some(body.as_str()) {
            debug!("Cached edit already applied");
            return Ok(None);
        }
        let fence = self.commit(phase, &body)?;
        Ok(Some(EditOutcome {
            phase,
            message_id: fence.message_id,
            version: fence.version,
            body,
            dependents: Vec::new(),
            scheduled: Vec::new(),
            warnings,
        }))
    }

    /// Fence on the current version of the latest message for `phase`.
    pub fn fence_for(&self, phase: Phase) -> Option<VersionFence> {
        self.state
            .store
            .find_latest_by_phase(phase)
            .map(|m| VersionFence {
                message_id: m.id(),
                version: m.current_version(),
            })
    }

    pub fn fence_holds(&self, fence: &VersionFence) -> bool {
        self.state.store.current_version_of(fence.message_id) == Some(fence.version)
    }

    /// Ticket for a sequenced run of `phase`, fenced on its predecessor.
    ///
    /// Re-running a phase that already has content invalidates the later
    /// phases built from it, the same way an edit does.
    pub fn run_ticket(&self, phase: Phase) -> GenerationTicket {
        GenerationTicket {
            phase,
            fences: phase
                .prev()
                .and_then(|p| self.fence_for(p))
                .into_iter()
                .collect(),
            only_index: None,
            cascade_on_apply: self.state.store.has_phase(phase),
            replaces_pending: true,
        }
    }

    /// Ticket for a queued regeneration, also fenced on the target's current version.
    pub fn regeneration_ticket(&self, request: &RegenerationRequest) -> GenerationTicket {
        let mut fences = vec![request.fence];
        if let Some(target) = self.fence_for(request.phase) {
            if target != request.fence {
                fences.push(target);
            }
        }
        GenerationTicket {
            phase: request.phase,
            fences,
            only_index: request.only_index,
            cascade_on_apply: request.cascade_on_apply,
            replaces_pending: false,
        }
    }

    /// Request handed to the generation collaborator.
    ///
    /// Inputs are the confirmed upstream entries; regenerations also carry
    /// the phase's own current entry so unchanged items can be kept.
    pub fn generation_request(
        &self,
        phase: Phase,
        mode: GenerationMode,
        only_index: Option<usize>,
    ) -> GenerationRequest {
        let mut inputs = self.state.bundle.upstream_of(phase);
        if mode == GenerationMode::Regeneration {
            if let Some(own) = self.state.bundle.read(phase.data_key()) {
                inputs.set(phase.data_key(), own.clone());
            }
        }
        GenerationRequest {
            phase,
            mode,
            inputs,
            only_index,
            prompt: self.state.store.latest_user_text(),
        }
    }

    /// Drop a pending regeneration of `phase`, e.g. when its result arrives out of band.
    pub fn cancel_regeneration(&mut self, phase: Phase) -> bool {
        self.state.queue.cancel(phase).is_some()
    }

    /// Pending regenerations whose fences still hold, due at `now`.
    ///
    /// Requests whose trigger was superseded are dropped.
    pub fn take_due_regenerations(&mut self, now: DateTime<Utc>) -> Vec<RegenerationRequest> {
        let due = self.state.queue.take_due(now);
        due.into_iter()
            .filter(|request| {
                let holds = self.fence_holds(&request.fence);
                if !holds {
                    debug!(phase = %request.phase, "Dropped regeneration with superseded fence");
                }
                holds
            })
            .collect()
    }

    pub fn next_regeneration_due(&self) -> Option<DateTime<Utc>> {
        self.state.queue.next_due()
    }

    /// Apply a collaborator result if every fence on its ticket still holds.
    #[instrument(skip(self, ticket, result), fields(phase = %ticket.phase))]
    pub fn apply_generation(
        &mut self,
        ticket: &GenerationTicket,
        result: &GenerationResult,
    ) -> Result<ApplyOutcome, RevisionError> {
        let phase = ticket.phase;
        if !ticket.fences.iter().all(|f| self.fence_holds(f)) {
            warn!("Discarding generation result computed from superseded content");
            self.notices
                .info(format!("Discarded an outdated {} result", phase.label()));
            return Ok(ApplyOutcome::Discarded { phase });
        }

        match result.status {
            GenerationStatus::Error => {
                let reason = result
                    .error
                    .clone()
                    .unwrap_or_else(|| "generation failed".to_string());
                self.notices
                    .error(format!("{} generation failed: {}", phase.label(), reason));
                Ok(ApplyOutcome::Failed { phase, reason })
            }
            GenerationStatus::Success => {
                let raw = match &result.payload {
                    serde_json::Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                let (body, _) = self.prepare(phase, &raw, false)?;
                let fence = self.commit(phase, &body)?;
                match ticket.only_index {
                    Some(index) => self.state.stale.clear_item(phase, index),
                    None => self.state.stale.clear_phase(phase),
                }
                if ticket.replaces_pending {
                    self.state.queue.cancel(phase);
                }
                if ticket.cascade_on_apply {
                    self.cascade(phase, fence);
                }
                Ok(ApplyOutcome::Applied {
                    phase,
                    message_id: fence.message_id,
                    version: fence.version,
                })
            }
        }
    }

    /// A regeneration could not be dispatched. The phase stays stale.
    pub fn record_dispatch_failure(&mut self, error: &CascadeError) {
        warn!(error = %error, "Regeneration dispatch failed");
        self.notices.error(error.to_string());
    }

    fn current_payload(&self, phase: Phase) -> Result<serde_json::Value, RevisionError> {
        self.state
            .bundle
            .read(phase.data_key())
            .cloned()
            .ok_or_else(|| ValidationError::NoContent { phase }.into())
    }

    fn encode(&self, phase: Phase, payload: &serde_json::Value) -> Result<String, RevisionError> {
        models::body_for(phase, payload).map_err(|source| RevisionError::Encode { phase, source })
    }

    /// Validate and normalize submitted content into a phase body.
    fn prepare(
        &self,
        phase: Phase,
        content: &str,
        clear_media: bool,
    ) -> Result<(String, Vec<String>), RevisionError> {
        let content = phase::strip_marker(content);
        if content.is_empty() {
            return Err(ValidationError::Empty { phase }.into());
        }

        let mut warnings = Vec::new();
        let body = if phase == Phase::StoryBoard {
            let normalized = storyboard::normalize_numbering(&content)?;
            if normalized.renumbered {
                warnings.push("Storyboard scenes were renumbered from 1".to_string());
            }
            normalized.content
        } else if phase.is_structured() {
            let mut payload = models::parse_payload(phase, &content)?;
            if clear_media && phase.has_media_asset() {
                payload = models::clear_assets(phase, &payload, None)?;
            }
            self.encode(phase, &payload)?
        } else {
            content
        };
        Ok((body, warnings))
    }

    /// Store `body` as the phase's new current content and mirror it into the bundle.
    fn commit(&mut self, phase: Phase, body: &str) -> Result<VersionFence, RevisionError> {
        let value = models::bundle_value(phase, body)?;
        let existing = self.state.store.find_latest_by_phase(phase).map(Message::id);
        let fence = match existing {
            Some(message_id) => VersionFence {
                message_id,
                version: self.state.store.append_version(message_id, phase, body)?,
            },
            None => VersionFence {
                message_id: self.state.store.append_phase_message(phase, body),
                version: 1,
            },
        };
        self.state.bundle.update([(phase.data_key(), value)]);
        Ok(fence)
    }

    fn schedule(
        &mut self,
        phase: Phase,
        trigger: Phase,
        fence: VersionFence,
        only_index: Option<usize>,
        cascade_on_apply: bool,
    ) {
        let mut request = RegenerationRequest::new(phase, trigger, fence, self.settle_delay);
        if let Some(index) = only_index {
            request = request.for_item(index);
        }
        if cascade_on_apply {
            request = request.cascading();
        }
        self.state.queue.schedule(request);
    }

    /// Flag and queue every later phase that already has content.
    fn cascade(&mut self, phase: Phase, fence: VersionFence) -> Vec<Phase> {
        let dependents: Vec<Phase> = phase
            .successors()
            .into_iter()
            .filter(|p| self.state.store.has_phase(*p))
            .collect();
        for dependent in &dependents {
            self.state.stale.mark_phase(*dependent);
            self.schedule(*dependent, phase, fence, None, false);
        }
        if !dependents.is_empty() {
            debug!(%phase, ?dependents, "Cascaded edit to dependents");
        }
        dependents
    }

    /// Flag same-index items downstream of an item-level change.
    fn flag_item_dependents(
        &mut self,
        phase: Phase,
        index: usize,
        subject: Option<&str>,
    ) -> Vec<Phase> {
        let mut flagged = Vec::new();
        let has = |store: &ContentStore, p: Phase| store.has_phase(p);

        match phase {
            Phase::RoleDescription => {
                if has(&self.state.store, Phase::RoleImage) {
                    self.state.stale.mark_item(Phase::RoleImage, index);
                    flagged.push(Phase::RoleImage);
                }
                let frames = self.state.store.current_body(Phase::FirstFrameDescription);
                if let (Some(name), Some(frames)) = (subject, frames) {
                    let mentioning = descriptions::items_mentioning(&frames, name);
                    for i in &mentioning {
                        self.state.stale.mark_item(Phase::FirstFrameDescription, *i);
                    }
                    if !mentioning.is_empty() {
                        flagged.push(Phase::FirstFrameDescription);
                    }
                }
            }
            Phase::FirstFrameDescription => {
                self.state.stale.clear_item(Phase::FirstFrameDescription, index);
                if has(&self.state.store, Phase::FirstFrameImage) {
                    self.state.stale.mark_item(Phase::FirstFrameImage, index);
                    flagged.push(Phase::FirstFrameImage);
                }
            }
            Phase::FirstFrameImage | Phase::VideoDescription => {
                if has(&self.state.store, Phase::Video) {
                    self.state.stale.mark_item(Phase::Video, index);
                    flagged.push(Phase::Video);
                }
            }
            Phase::Tone => {
                if has(&self.state.store, Phase::Audio) {
                    self.state.stale.mark_item(Phase::Audio, index);
                    flagged.push(Phase::Audio);
                }
            }
            _ => {}
        }

        if phase != Phase::Film && has(&self.state.store, Phase::Film) {
            self.state.stale.mark_phase(Phase::Film);
            flagged.push(Phase::Film);
        }
        flagged
    }
}
