//! Persisted session state shared by the batch coordinator and the hooks.
//!
//! Every field carries a serde default so partially-written or older state
//! files still load.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a cross-agent review.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Completed,
    Failed,
}

/// What the reviewer said, or why it could not say anything.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub approved: bool,
    /// Whether the reviewer invocation itself succeeded.
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub review: String,
}

/// One cross-agent check of a single file edit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub file_path: String,
    pub reviewer: String,
    pub author: String,
    pub status: ReviewStatus,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ReviewResult>,
}

impl Review {
    pub fn pending(file_path: &str, reviewer: &str, author: &str) -> Self {
        Self {
            file_path: file_path.to_string(),
            reviewer: reviewer.to_string(),
            author: author.to_string(),
            status: ReviewStatus::Pending,
            timestamp: Utc::now().to_rfc3339(),
            completion_timestamp: None,
            result: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ReviewStatus::Pending
    }

    /// Whether this resolved review is older than `retention` at `now`.
    ///
    /// Age runs from `completion_timestamp`, else `timestamp`. Pending
    /// reviews and unparseable timestamps are never stale.
    pub fn is_stale(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        if self.is_pending() {
            return false;
        }
        let stamp = self
            .completion_timestamp
            .as_deref()
            .unwrap_or(&self.timestamp);
        match DateTime::parse_from_rfc3339(stamp) {
            Ok(resolved_at) => now.signed_duration_since(resolved_at) > retention,
            Err(_) => false,
        }
    }
}

/// A task handed to another agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub task: String,
    pub timestamp: String,
}

/// One entry of the bounded hook execution log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookExecution {
    pub hook_name: String,
    pub timestamp: String,
    #[serde(default)]
    pub detail: String,
}

/// The shared record of delegation, review, and hook activity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub current_task: Option<String>,
    pub delegated_to_glm: Vec<Delegation>,
    pub delegated_to_codex: Vec<Delegation>,
    pub pending_reviews: Vec<Review>,
    pub last_agent: String,
    pub glm_failures: u32,
    pub codex_failures: u32,
    pub session_start: String,
    pub total_tasks_completed: u64,
    pub hooks_executed: Vec<HookExecution>,
    pub last_activity: String,
    pub session_id: String,
}

impl Default for SessionState {
    fn default() -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            current_task: None,
            delegated_to_glm: Vec::new(),
            delegated_to_codex: Vec::new(),
            pending_reviews: Vec::new(),
            last_agent: "claude".to_string(),
            glm_failures: 0,
            codex_failures: 0,
            session_start: now.clone(),
            total_tasks_completed: 0,
            hooks_executed: Vec::new(),
            last_activity: now,
            session_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl SessionState {
    /// Append to the hook execution log.
    pub fn record_hook(&mut self, hook_name: &str, detail: impl Into<String>) {
        self.hooks_executed.push(HookExecution {
            hook_name: hook_name.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            detail: detail.into(),
        });
    }

    /// Keep only the most recent `limit` hook executions.
    pub fn cap_hook_log(&mut self, limit: usize) {
        let excess = self.hooks_executed.len().saturating_sub(limit);
        if excess > 0 {
            self.hooks_executed.drain(..excess);
        }
    }

    /// Drop resolved reviews older than `retention`. Returns how many were
    /// removed.
    pub fn prune_stale_reviews(&mut self, now: DateTime<Utc>, retention: Duration) -> usize {
        let before = self.pending_reviews.len();
        self.pending_reviews.retain(|r| !r.is_stale(now, retention));
        before - self.pending_reviews.len()
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now().to_rfc3339();
    }

    /// Start a new session, carrying over the statistics and any reviews
    /// still pending.
    pub fn reset_preserving_stats(&mut self) {
        let fresh = SessionState {
            total_tasks_completed: self.total_tasks_completed,
            glm_failures: self.glm_failures,
            codex_failures: self.codex_failures,
            pending_reviews: self
                .pending_reviews
                .drain(..)
                .filter(Review::is_pending)
                .collect(),
            ..SessionState::default()
        };
        *self = fresh;
    }
}
