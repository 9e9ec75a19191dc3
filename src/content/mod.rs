//! Versioned conversation content.
//!
//! - `message`: `Message`, `Fragment` and their version history
//! - `store`: `ContentStore`, the ordered message list with phase lookup

pub mod message;
pub mod store;

pub use message::{Fragment, FragmentKind, Message, MessageId, Role};
pub use store::ContentStore;
