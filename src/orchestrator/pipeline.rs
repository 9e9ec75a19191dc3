//! Async driver that owns the engine's single-writer state and talks to the
//! generation collaborator.
//!
//! Every mutation goes through `&mut self`, so an edit's store and bundle
//! writes finish before the next operation starts. Generation is awaited
//! here; the controller itself never blocks.

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::audit::{AuditLogger, RevisionAudit, RevisionKind};
use crate::cache::{MountOutcome, PersistenceCache, SessionGuard};
use crate::errors::{CascadeError, GenerateError, PipelineError, SequencerError};
use crate::generate::{GenerationMode, GenerationRequest, GenerationResult, Generator};
use crate::notice::Notice;
use crate::orchestrator::state::{JournalStatus, StateManager};
use crate::phase::Phase;
use crate::revision::{ApplyOutcome, EditOutcome, GenerationTicket, RevisionController};
use crate::sequencer::{Completion, PhaseSequencer, PipelineState, RunStatus};
use crate::transport::{self, ImplicitCommand, ImplicitSender};

/// What happened to one dispatched generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Applied { phase: Phase, version: u32 },
    Failed { phase: Phase, reason: String },
    /// The result was computed from superseded content and dropped.
    Discarded { phase: Phase },
    /// Handed to the fallback transport; the result arrives later via `deliver`.
    Deferred { phase: Phase, command: ImplicitCommand },
}

impl RunOutcome {
    pub fn phase(&self) -> Phase {
        match self {
            RunOutcome::Applied { phase, .. }
            | RunOutcome::Failed { phase, .. }
            | RunOutcome::Discarded { phase }
            | RunOutcome::Deferred { phase, .. } => *phase,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, RunOutcome::Applied { .. })
    }
}

enum Dispatch {
    Completed(GenerationResult),
    Deferred(ImplicitCommand),
}

pub struct Pipeline {
    session_id: String,
    controller: RevisionController,
    sequencer: PhaseSequencer,
    cache: PersistenceCache,
    guard: SessionGuard,
    generator: Option<Box<dyn Generator>>,
    fallback: Option<Box<dyn ImplicitSender>>,
    journal: Option<StateManager>,
    audit: Option<AuditLogger>,
}

impl Pipeline {
    pub fn new(
        session_id: &str,
        controller: RevisionController,
        sequencer: PhaseSequencer,
        cache: PersistenceCache,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            controller,
            sequencer,
            cache,
            guard: SessionGuard::default(),
            generator: None,
            fallback: None,
            journal: None,
            audit: None,
        }
    }

    pub fn with_guard(mut self, guard: SessionGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_generator(mut self, generator: Box<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_fallback(mut self, sender: Box<dyn ImplicitSender>) -> Self {
        self.fallback = Some(sender);
        self
    }

    pub fn with_journal(mut self, journal: StateManager) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn controller(&self) -> &RevisionController {
        &self.controller
    }

    pub fn sequencer(&self) -> &PhaseSequencer {
        &self.sequencer
    }

    pub fn cache(&self) -> &PersistenceCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut PersistenceCache {
        &mut self.cache
    }

    pub fn audit(&self) -> Option<&AuditLogger> {
        self.audit.as_ref()
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.controller.drain_notices()
    }

    pub fn set_auto_next(&mut self, enabled: bool) {
        self.sequencer.set_auto_next(enabled);
        info!(enabled, "Auto-advance updated");
    }

    /// Bind the cache to this session and restore or purge cached edits.
    pub fn mount(&mut self) -> MountOutcome {
        let outcome = self
            .guard
            .on_mount(&self.session_id, &mut self.cache, &mut self.controller);
        if let Some(audit) = self.audit.as_mut() {
            if let Err(e) = audit.resume_or_start(&self.session_id) {
                warn!(error = %e, "Failed to open audit session");
            }
        }
        if let MountOutcome::Resumed { restored, .. } = &outcome {
            for phase in restored {
                self.record_commit(*phase, RevisionKind::Restored);
            }
        }
        outcome
    }

    /// Record the premise and run the first phase (and, with auto-advance, the rest).
    pub async fn start(&mut self, premise: &str) -> Result<Vec<RunOutcome>, PipelineError> {
        let phase = self.sequencer.start()?;
        self.controller.append_user_text(premise);
        self.drive(phase).await
    }

    /// Resume after a halt: start the next phase, re-dispatch a pending one,
    /// or retry a failed one.
    pub async fn continue_pipeline(&mut self) -> Result<Vec<RunOutcome>, PipelineError> {
        let phase = match self.sequencer.state() {
            PipelineState::NotStarted => return Err(SequencerError::NotStarted.into()),
            PipelineState::Complete => {
                return Err(SequencerError::PipelineComplete.into());
            }
            PipelineState::Failed(_) => self.sequencer.retry()?,
            PipelineState::Running(phase) => phase,
            PipelineState::Halted(finished) => self.sequencer.advance(finished)?,
        };
        self.drive(phase).await
    }

    /// Re-run the failed phase.
    pub async fn retry(&mut self) -> Result<Vec<RunOutcome>, PipelineError> {
        let phase = self.sequencer.retry()?;
        self.drive(phase).await
    }

    /// Roll back to `phase` and run forward from it.
    pub async fn retry_from(&mut self, phase: Phase) -> Result<Vec<RunOutcome>, PipelineError> {
        let phase = self.sequencer.retry_from(phase)?;
        self.drive(phase).await
    }

    async fn drive(&mut self, first: Phase) -> Result<Vec<RunOutcome>, PipelineError> {
        let mut outcomes = Vec::new();
        let mut phase = first;
        loop {
            let outcome = self.run_phase(phase).await?;
            let applied = outcome.is_applied();
            outcomes.push(outcome);
            if !applied || !self.sequencer.should_auto_advance() {
                break;
            }
            match self.sequencer.advance(phase) {
                Ok(next) => phase = next,
                Err(SequencerError::PipelineComplete) => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(outcomes)
    }

    /// Generate the running phase from the confirmed upstream content.
    #[instrument(skip(self), fields(phase = %phase))]
    async fn run_phase(&mut self, phase: Phase) -> Result<RunOutcome, PipelineError> {
        self.journal(phase, 0, JournalStatus::Started);
        let ticket = self.controller.run_ticket(phase);
        let request = self
            .controller
            .generation_request(phase, GenerationMode::Confirmation, None);

        let outcome = match self.dispatch(&request).await {
            Ok(Dispatch::Completed(result)) => {
                self.apply(&ticket, &result, RevisionKind::Generated)?
            }
            Ok(Dispatch::Deferred(command)) => RunOutcome::Deferred { phase, command },
            Err(error) => self.dispatch_failed(phase, error),
        };
        self.settle_run(phase, &outcome)?;
        Ok(outcome)
    }

    fn settle_run(&mut self, phase: Phase, outcome: &RunOutcome) -> Result<(), PipelineError> {
        match outcome {
            RunOutcome::Applied { .. } => self.sequencer.complete(phase, Completion::Success)?,
            RunOutcome::Failed { .. } | RunOutcome::Discarded { .. } => {
                self.sequencer.complete(phase, Completion::Error)?
            }
            RunOutcome::Deferred { .. } => {}
        }
        Ok(())
    }

    /// Accept a result produced out of band for a deferred run or a stale phase.
    pub fn deliver(
        &mut self,
        phase: Phase,
        result: &GenerationResult,
    ) -> Result<RunOutcome, PipelineError> {
        let awaiting_run = self.sequencer.running_phase() == Some(phase)
            && self.sequencer.progress().running_phase_status == RunStatus::Pending;
        if awaiting_run {
            let ticket = self.controller.run_ticket(phase);
            let outcome = self.apply(&ticket, result, RevisionKind::Generated)?;
            self.settle_run(phase, &outcome)?;
            return Ok(outcome);
        }
        if self.controller.stale().is_stale(phase) {
            self.controller.cancel_regeneration(phase);
            let ticket = GenerationTicket {
                phase,
                fences: self.controller.fence_for(phase).into_iter().collect(),
                only_index: None,
                cascade_on_apply: !phase.has_media_asset(),
                replaces_pending: false,
            };
            return Ok(self.apply(&ticket, result, RevisionKind::Regenerated { index: None })?);
        }
        Err(PipelineError::NotAwaiting { phase })
    }

    /// Dispatch queued regenerations, waiting out their settle delay.
    ///
    /// Applied text regenerations may queue further regenerations; those are
    /// processed too, so this returns once the queue is empty.
    pub async fn process_regenerations(&mut self) -> Result<Vec<RunOutcome>, PipelineError> {
        let mut outcomes = Vec::new();
        loop {
            let now = Utc::now();
            let due = self.controller.take_due_regenerations(now);
            if due.is_empty() {
                match self.controller.next_regeneration_due() {
                    Some(at) => {
                        sleep_until(now, at).await;
                        continue;
                    }
                    None => break,
                }
            }
            for request in due {
                let phase = request.phase;
                let ticket = self.controller.regeneration_ticket(&request);
                let generation = self.controller.generation_request(
                    phase,
                    GenerationMode::Regeneration,
                    request.only_index,
                );
                let outcome = match self.dispatch(&generation).await {
                    Ok(Dispatch::Completed(result)) => self.apply(
                        &ticket,
                        &result,
                        RevisionKind::Regenerated {
                            index: request.only_index,
                        },
                    )?,
                    Ok(Dispatch::Deferred(command)) => RunOutcome::Deferred { phase, command },
                    Err(error) => self.dispatch_failed(phase, error),
                };
                debug!(%phase, ?outcome, "Regeneration processed");
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }

    /// Check freshly streamed content against the cached edit for `phase`.
    pub fn on_stream(&mut self, phase: Phase, fresh: &str) -> bool {
        self.guard.check_stream(phase, fresh, &mut self.cache)
    }

    pub fn submit_edit(
        &mut self,
        phase: Phase,
        content: &str,
    ) -> Result<EditOutcome, PipelineError> {
        let outcome = self.controller.edit_phase(phase, content)?;
        self.cache.save(phase.data_key(), &outcome.body);
        self.record_edit(&outcome, RevisionKind::Edited);
        Ok(outcome)
    }

    pub fn edit_item(
        &mut self,
        phase: Phase,
        index: usize,
        value: &str,
    ) -> Result<EditOutcome, PipelineError> {
        let outcome = self.controller.edit_item(phase, index, value)?;
        self.cache.save(phase.data_key(), &outcome.body);
        self.record_edit(&outcome, RevisionKind::ItemEdited { index });
        Ok(outcome)
    }

    /// Queue a whole phase, or one media item, for regeneration.
    pub fn regenerate(
        &mut self,
        phase: Phase,
        index: Option<usize>,
    ) -> Result<EditOutcome, PipelineError> {
        let outcome = match index {
            Some(index) => self.controller.regenerate_item(phase, index)?,
            None => self.controller.regenerate_phase(phase)?,
        };
        self.journal(phase, outcome.version, JournalStatus::Regenerated);
        Ok(outcome)
    }

    /// Pin a candidate asset. Not cached: restoring re-clears media assets.
    pub fn select(
        &mut self,
        phase: Phase,
        index: usize,
        url: &str,
    ) -> Result<EditOutcome, PipelineError> {
        let outcome = self.controller.select_candidate(phase, index, url)?;
        self.record_edit(
            &outcome,
            RevisionKind::Selected {
                index,
                url: url.to_string(),
            },
        );
        Ok(outcome)
    }

    /// Forget all content and progress for this session.
    pub fn reset(&mut self) -> anyhow::Result<()> {
        self.controller.clear();
        self.sequencer.reset();
        self.cache.purge_content();
        if let Some(journal) = &self.journal {
            journal.reset()?;
        }
        if let Some(audit) = self.audit.as_mut() {
            if audit.current_session().is_some() {
                audit.finish_session()?;
            }
        }
        info!(session = %self.session_id, "Pipeline reset");
        Ok(())
    }

    async fn dispatch(&self, request: &GenerationRequest) -> Result<Dispatch, GenerateError> {
        if let Some(generator) = &self.generator {
            match generator.generate(request).await {
                Err(GenerateError::Unavailable(reason)) if self.fallback.is_some() => {
                    warn!(
                        generator = generator.name(),
                        %reason,
                        "Generator unavailable; using fallback"
                    );
                }
                other => return other.map(Dispatch::Completed),
            }
        }
        match &self.fallback {
            Some(sender) => {
                let command = ImplicitCommand::for_request(request);
                sender
                    .send_implicit(command, &transport::payload_for(request))
                    .await?;
                info!(phase = %request.phase, %command, "Sent implicit command");
                Ok(Dispatch::Deferred(command))
            }
            None => Err(GenerateError::Unavailable("no generator configured".to_string())),
        }
    }

    fn dispatch_failed(&mut self, phase: Phase, error: GenerateError) -> RunOutcome {
        let error = match error {
            GenerateError::Unavailable(_)
                if self.generator.is_none() && self.fallback.is_none() =>
            {
                CascadeError::NoEntryPoint { phase }
            }
            source => CascadeError::DispatchFailed { phase, source },
        };
        let reason = error.to_string();
        self.controller.record_dispatch_failure(&error);
        self.journal(phase, 0, JournalStatus::Failed);
        self.record(RevisionAudit::uncommitted(
            phase,
            RevisionKind::Failed {
                reason: reason.clone(),
            },
        ));
        RunOutcome::Failed { phase, reason }
    }

    fn apply(
        &mut self,
        ticket: &GenerationTicket,
        result: &GenerationResult,
        kind: RevisionKind,
    ) -> Result<RunOutcome, PipelineError> {
        let phase = ticket.phase;
        if result.is_success() {
            let fresh = match &result.payload {
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            self.on_stream(phase, &fresh);
        }

        let outcome = match self.controller.apply_generation(ticket, result)? {
            ApplyOutcome::Applied { version, .. } => {
                self.cache.forget(phase.data_key());
                self.journal(phase, version, JournalStatus::Completed);
                self.record_commit(phase, kind);
                RunOutcome::Applied { phase, version }
            }
            ApplyOutcome::Discarded { .. } => {
                self.journal(phase, 0, JournalStatus::Discarded);
                self.record(RevisionAudit::uncommitted(phase, RevisionKind::Discarded));
                RunOutcome::Discarded { phase }
            }
            ApplyOutcome::Failed { reason, .. } => {
                self.journal(phase, 0, JournalStatus::Failed);
                self.record(RevisionAudit::uncommitted(
                    phase,
                    RevisionKind::Failed {
                        reason: reason.clone(),
                    },
                ));
                RunOutcome::Failed { phase, reason }
            }
        };
        Ok(outcome)
    }

    fn record_edit(&mut self, outcome: &EditOutcome, kind: RevisionKind) {
        self.journal(outcome.phase, outcome.version, JournalStatus::Edited);
        let record = RevisionAudit::committed(
            outcome.phase,
            kind,
            outcome.message_id,
            outcome.version,
            &outcome.body,
        )
        .with_dependents(&outcome.dependents);
        self.record(record);
    }

    fn record_commit(&mut self, phase: Phase, kind: RevisionKind) {
        let Some(message) = self.controller.store().find_latest_by_phase(phase) else {
            return;
        };
        let body = message.phase_body().unwrap_or_default();
        let record =
            RevisionAudit::committed(phase, kind, message.id(), message.current_version(), &body);
        self.record(record);
    }

    fn record(&mut self, record: RevisionAudit) {
        if let Some(audit) = self.audit.as_mut() {
            if let Err(e) = audit.record(record) {
                warn!(error = %e, "Failed to write audit record");
            }
        }
    }

    fn journal(&self, phase: Phase, version: u32, status: JournalStatus) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.save(phase, version, status) {
                warn!(error = %e, "Failed to write state journal");
            }
        }
    }
}

async fn sleep_until(now: DateTime<Utc>, at: DateTime<Utc>) {
    let wait = (at - now).to_std().unwrap_or_default();
    if !wait.is_zero() {
        debug!(wait_ms = wait.as_millis() as u64, "Waiting for regeneration settle delay");
        tokio::time::sleep(wait).await;
    }
}
