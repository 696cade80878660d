//! Session state shared by the batch coordinator and the hook entry points.
//!
//! [`state`] holds the persisted record, [`store`] reads and writes it with a
//! backup and a cross-process lock, [`actor`] serializes all access in a
//! process, and [`archive`] appends finished sessions and batches to a JSONL
//! log.

pub mod actor;
pub mod archive;
pub mod state;
pub mod store;

pub use actor::SessionHandle;
pub use state::{Review, ReviewResult, ReviewStatus, SessionState};
pub use store::StateStore;
