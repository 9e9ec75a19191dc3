//! Typed error hierarchy for the toonflow engine.
//!
//! One enum per subsystem:
//! - `ValidationError`: rejected edits (empty content, malformed storyboard or payload)
//! - `StoreError`: message lookups that violate the content store's contract
//! - `RevisionError`: umbrella returned by the revision controller entry points
//! - `CascadeError`: a dependent regeneration could not be dispatched
//! - `SequencerError`: invalid phase transitions
//! - `GenerateError`: failures at the generation collaborator boundary
//! - `PersistenceError`: cache storage failures, logged and swallowed by the cache
//! - `PipelineError`: umbrella returned by the async pipeline driver

use crate::phase::Phase;
use thiserror::Error;
use uuid::Uuid;

/// Reasons an edit is rejected before anything is committed.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{phase} content cannot be empty")]
    Empty { phase: Phase },

    #[error("Storyboard has no scene headers; expected blocks starting with \"分镜1：\"")]
    MalformedStoryboard,

    #[error("Scene {id} needs characters, a picture and a line of dialogue")]
    IncompleteScene { id: usize },

    #[error("{phase} payload is not valid: {source}")]
    MalformedPayload {
        phase: Phase,
        #[source]
        source: serde_json::Error,
    },

    #[error("{phase} has no item at index {index}")]
    IndexOutOfRange { phase: Phase, index: usize },

    #[error("{phase} does not support {operation}")]
    Unsupported {
        phase: Phase,
        operation: &'static str,
    },

    #[error("{phase} has no content yet")]
    NoContent { phase: Phase },
}

/// Contract violations when addressing messages in the content store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Message {id} not found")]
    MessageNotFound { id: Uuid },

    #[error("Message {id} is not an assistant message and cannot be versioned")]
    NotAssistant { id: Uuid },
}

/// Errors surfaced by the revision controller.
#[derive(Debug, Error)]
pub enum RevisionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to encode {phase} payload: {source}")]
    Encode {
        phase: Phase,
        #[source]
        source: serde_json::Error,
    },
}

/// A dependent-phase regeneration could not be handed to any entry point.
#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("Regeneration of {phase} failed to dispatch: {source}")]
    DispatchFailed {
        phase: Phase,
        #[source]
        source: GenerateError,
    },

    #[error("No generation entry point is configured; {phase} cannot be regenerated")]
    NoEntryPoint { phase: Phase },
}

/// Invalid transitions requested of the phase sequencer.
#[derive(Debug, Error)]
pub enum SequencerError {
    #[error("Pipeline has already started; use `continue` or `reset`")]
    AlreadyStarted,

    #[error("Pipeline has not started yet")]
    NotStarted,

    #[error("Cannot advance from {requested}: the last finished phase is {}", finished_label(.finished))]
    OutOfOrder {
        requested: Phase,
        finished: Option<Phase>,
    },

    #[error("{phase} is still running")]
    AlreadyRunning { phase: Phase },

    #[error("{phase} is not the running phase")]
    NotRunning { phase: Phase },

    #[error("Pipeline is complete; there is no phase after Film")]
    PipelineComplete,

    #[error("Nothing to retry: the running phase has not failed")]
    NothingToRetry,
}

fn finished_label(finished: &Option<Phase>) -> String {
    finished.map_or_else(|| "none".to_string(), |p| p.to_string())
}

/// Failures talking to the generation collaborator.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Generation entry point unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to spawn generator `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Generator I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generator did not answer within {secs}s")]
    Timeout { secs: u64 },

    #[error("Generator protocol error: {0}")]
    Protocol(String),
}

/// Storage failures inside the persistence cache.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Cache storage I/O failed at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache storage is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Cache quota exceeded writing {key} ({limit} entries max)")]
    QuotaExceeded { key: String, limit: usize },
}

/// Errors surfaced by the pipeline driver.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Sequencer(#[from] SequencerError),

    #[error(transparent)]
    Revision(#[from] RevisionError),

    #[error("{phase} is neither running nor stale; no result is expected for it")]
    NotAwaiting { phase: Phase },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_empty_names_the_phase() {
        let err = ValidationError::Empty {
            phase: Phase::Script,
        };
        assert!(err.to_string().contains("Script"));
        assert!(matches!(err, ValidationError::Empty { phase: Phase::Script }));
    }

    #[test]
    fn revision_error_converts_from_validation_error() {
        let err: RevisionError = ValidationError::MalformedStoryboard.into();
        match &err {
            RevisionError::Validation(ValidationError::MalformedStoryboard) => {}
            _ => panic!("Expected RevisionError::Validation(MalformedStoryboard)"),
        }
    }

    #[test]
    fn sequencer_error_out_of_order_renders_missing_finish() {
        let err = SequencerError::OutOfOrder {
            requested: Phase::Tone,
            finished: None,
        };
        let msg = err.to_string();
        assert!(msg.contains("Tone"));
        assert!(msg.contains("none"));
    }

    #[test]
    fn cascade_error_carries_generate_source() {
        use std::error::Error as _;
        let err = CascadeError::DispatchFailed {
            phase: Phase::StoryBoard,
            source: GenerateError::Timeout { secs: 30 },
        };
        let source = err.source().map(|s| s.to_string()).unwrap_or_default();
        assert!(source.contains("30s"));
    }

    #[test]
    fn persistence_error_quota_is_matchable() {
        let err = PersistenceError::QuotaExceeded {
            key: "toonflow:script:s1".into(),
            limit: 4,
        };
        match &err {
            PersistenceError::QuotaExceeded { key, limit } => {
                assert_eq!(key, "toonflow:script:s1");
                assert_eq!(*limit, 4);
            }
            _ => panic!("Expected QuotaExceeded"),
        }
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&ValidationError::MalformedStoryboard);
        assert_std_error(&StoreError::MessageNotFound { id: Uuid::nil() });
        assert_std_error(&SequencerError::NothingToRetry);
        assert_std_error(&GenerateError::Unavailable("offline".into()));
        assert_std_error(&CascadeError::NoEntryPoint {
            phase: Phase::Audio,
        });
    }

    #[test]
    fn pipeline_error_is_transparent_over_sequencer_errors() {
        let err: PipelineError = SequencerError::NothingToRetry.into();
        assert_eq!(err.to_string(), SequencerError::NothingToRetry.to_string());
        assert!(matches!(
            err,
            PipelineError::Sequencer(SequencerError::NothingToRetry)
        ));
    }
}
