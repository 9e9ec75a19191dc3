//! Pipeline orchestration.
//!
//! - `pipeline`: `Pipeline`, the async driver over controller, sequencer and cache
//! - `state`: `StateManager`, the append-only event journal

pub mod pipeline;
pub mod state;

pub use pipeline::{Pipeline, RunOutcome};
pub use state::{JournalStatus, StateEntry, StateManager};
