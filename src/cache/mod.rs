//! Local persistence of unsaved edits across reloads.
//!
//! - `storage`: `KvStorage` trait with memory and JSON-file backends
//! - `entry`: `CacheEntry`, one cached edit with its session and timestamp
//! - `persistence`: `PersistenceCache`, session-keyed save/restore/purge
//! - `guard`: `SessionGuard`, restore-or-purge on mount and on streamed content
//! - `similarity`: significant-token overlap used by the guard

pub mod entry;
pub mod guard;
pub mod persistence;
pub mod similarity;
pub mod storage;

pub use entry::CacheEntry;
pub use guard::{MountOutcome, SessionGuard};
pub use persistence::PersistenceCache;
pub use storage::{FileStorage, KvStorage, MemoryStorage};
