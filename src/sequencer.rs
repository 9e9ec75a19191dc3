//! Phase sequencer: which phase is running, which finished last, and
//! whether the pipeline advances on its own.
//!
//! The pipeline is strictly linear. At most one phase runs at a time and a
//! phase may only start once its predecessor has finished.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::SequencerError;
use crate::phase::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Pending,
    Success,
    Error,
}

/// Outcome reported by the generation collaborator for the running phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Success,
    Error,
}

/// Serializable progress record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseProgress {
    pub running_phase: Option<Phase>,
    pub finish_phase: Option<Phase>,
    #[serde(default)]
    pub running_phase_status: RunStatus,
    #[serde(default)]
    pub auto_next: bool,
}

/// Coarse pipeline state for display and dispatch decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    NotStarted,
    Running(Phase),
    Failed(Phase),
    /// Finished a phase and waiting for `continue`.
    Halted(Phase),
    Complete,
}

#[derive(Debug, Clone)]
pub struct PhaseSequencer {
    progress: PhaseProgress,
    default_auto_next: bool,
}

impl PhaseSequencer {
    pub fn new(auto_next: bool) -> Self {
        Self {
            progress: PhaseProgress {
                auto_next,
                ..PhaseProgress::default()
            },
            default_auto_next: auto_next,
        }
    }

    pub fn from_progress(progress: PhaseProgress, default_auto_next: bool) -> Self {
        Self {
            progress,
            default_auto_next,
        }
    }

    pub fn progress(&self) -> &PhaseProgress {
        &self.progress
    }

    pub fn running_phase(&self) -> Option<Phase> {
        self.progress.running_phase
    }

    pub fn finish_phase(&self) -> Option<Phase> {
        self.progress.finish_phase
    }

    pub fn auto_next(&self) -> bool {
        self.progress.auto_next
    }

    pub fn set_auto_next(&mut self, enabled: bool) {
        self.progress.auto_next = enabled;
    }

    pub fn state(&self) -> PipelineState {
        let p = &self.progress;
        match (p.running_phase, p.finish_phase) {
            (Some(phase), _) if p.running_phase_status == RunStatus::Error => {
                PipelineState::Failed(phase)
            }
            (Some(phase), _) => PipelineState::Running(phase),
            (None, Some(Phase::Film)) => PipelineState::Complete,
            (None, Some(phase)) => PipelineState::Halted(phase),
            (None, None) => PipelineState::NotStarted,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state() == PipelineState::Complete
    }

    /// Begin the pipeline at the first phase.
    pub fn start(&mut self) -> Result<Phase, SequencerError> {
        if self.state() != PipelineState::NotStarted {
            return Err(SequencerError::AlreadyStarted);
        }
        let first = Phase::first();
        self.progress.running_phase = Some(first);
        self.progress.running_phase_status = RunStatus::Pending;
        info!(phase = %first, "Pipeline started");
        Ok(first)
    }

    /// Start the phase after `current`, which must be the last finished phase.
    pub fn advance(&mut self, current: Phase) -> Result<Phase, SequencerError> {
        if let Some(running) = self.progress.running_phase {
            return Err(SequencerError::AlreadyRunning { phase: running });
        }
        if self.progress.finish_phase != Some(current) {
            return Err(SequencerError::OutOfOrder {
                requested: current,
                finished: self.progress.finish_phase,
            });
        }
        let next = current.next().ok_or(SequencerError::PipelineComplete)?;
        self.progress.running_phase = Some(next);
        self.progress.running_phase_status = RunStatus::Pending;
        debug!(from = %current, to = %next, "Advanced phase");
        Ok(next)
    }

    /// Record the collaborator's outcome for the running phase.
    pub fn complete(&mut self, phase: Phase, outcome: Completion) -> Result<(), SequencerError> {
        if self.progress.running_phase != Some(phase) {
            return Err(SequencerError::NotRunning { phase });
        }
        match outcome {
            Completion::Success => {
                self.progress.finish_phase = Some(phase);
                self.progress.running_phase = None;
                self.progress.running_phase_status = RunStatus::Success;
                info!(%phase, "Phase finished");
            }
            Completion::Error => {
                self.progress.running_phase_status = RunStatus::Error;
                info!(%phase, "Phase failed");
            }
        }
        Ok(())
    }

    /// Re-run a failed phase.
    pub fn retry(&mut self) -> Result<Phase, SequencerError> {
        match self.state() {
            PipelineState::Failed(phase) => {
                self.progress.running_phase_status = RunStatus::Pending;
                Ok(phase)
            }
            _ => Err(SequencerError::NothingToRetry),
        }
    }

    /// Roll back to `phase` and run it again. Later progress is discarded.
    pub fn retry_from(&mut self, phase: Phase) -> Result<Phase, SequencerError> {
        let reached = self
            .progress
            .running_phase
            .or_else(|| self.progress.finish_phase.and_then(Phase::next))
            .or(self.progress.finish_phase);
        match reached {
            None => return Err(SequencerError::NotStarted),
            Some(furthest) if phase > furthest => {
                return Err(SequencerError::OutOfOrder {
                    requested: phase,
                    finished: self.progress.finish_phase,
                });
            }
            Some(_) => {}
        }
        self.progress.finish_phase = phase.prev();
        self.progress.running_phase = Some(phase);
        self.progress.running_phase_status = RunStatus::Pending;
        info!(%phase, "Rolled back pipeline");
        Ok(phase)
    }

    /// True when the last phase succeeded, nothing runs, and auto-advance is on.
    pub fn should_auto_advance(&self) -> bool {
        self.progress.auto_next
            && self.progress.running_phase_status == RunStatus::Success
            && matches!(self.state(), PipelineState::Halted(_))
    }

    /// One-based position of the current phase and the phase count.
    pub fn position(&self) -> (usize, usize) {
        let current = self
            .progress
            .running_phase
            .or(self.progress.finish_phase)
            .map_or(0, |p| p.index() + 1);
        (current, Phase::COUNT)
    }

    pub fn reset(&mut self) {
        self.progress = PhaseProgress {
            auto_next: self.default_auto_next,
            ..PhaseProgress::default()
        };
    }
}
