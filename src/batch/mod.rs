//! Batch coordination: parse a request into tasks, run one worker per task,
//! wait for completion markers, and write a reviewable proposal.
//!
//! [`coordinator::run_batch`] drives the whole pipeline; the other modules
//! are its stages.

pub mod conflicts;
pub mod coordinator;
pub mod locks;
pub mod manifest;
pub mod monitor;
pub mod parser;
pub mod proposal;
pub mod supervisor;
pub mod task;

pub use coordinator::{BatchReport, run_batch};
pub use task::{Task, TaskId, TaskKind};
