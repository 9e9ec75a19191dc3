//! Post-generation revision: edits, version fences and cascading regeneration.
//!
//! - `controller`: `RevisionController`, the single entry point for edits
//! - `cascade`: regeneration requests, the per-phase queue, version fences

pub mod cascade;
pub mod controller;

pub use cascade::{GenerationTicket, RegenerationQueue, RegenerationRequest, VersionFence};
pub use controller::{ApplyOutcome, ControllerState, EditOutcome, RevisionController};
