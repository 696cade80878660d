//! Cross-agent review: reviewer rotation, reviewer invocation, and the
//! queue that turns a file edit into a gate decision.

pub mod agent;
pub mod queue;
pub mod reviewer;

pub use agent::{Agent, reviewer_for};
pub use queue::{GateDecision, ReviewQueue};
pub use reviewer::{ApprovalMatcher, CommandReviewer, Reviewer};
