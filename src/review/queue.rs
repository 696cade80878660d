//! The review queue behind the review-gate hook.
//!
//! One file edit per call: pick the reviewer by rotation, skip if the same
//! reviewer already has a pending review of the file, otherwise record a
//! pending review, invoke the reviewer, and resolve the review from its
//! answer. A rejection blocks; a reviewer that could not be run only warns.

use chrono::Utc;

use super::agent::{Agent, reviewer_for};
use super::reviewer::{ApprovalMatcher, ReviewRequest, Reviewer};
use crate::error::{ReviewError, StateError};
use crate::session::SessionHandle;
use crate::session::state::{Review, ReviewResult, ReviewStatus, SessionState};


/// Result of trying to enqueue a review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    /// The reviewer already has this file pending. Nothing was added.
    Duplicate { reviewer: Agent },
    /// A new pending review was recorded.
    Created { reviewer: Agent, author: String },
}

/// How a reviewer invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    Approved { review: String },
    Rejected { review: String },
    Failed { error: String },
}

impl ReviewOutcome {
    pub fn from_result(result: Result<String, ReviewError>, matcher: &ApprovalMatcher) -> Self {
        match result {
            Ok(review) if matcher.is_approval(&review) => ReviewOutcome::Approved { review },
            Ok(review) => ReviewOutcome::Rejected { review },
            Err(e) => ReviewOutcome::Failed {
                error: e.to_string(),
            },
        }
    }

    fn status(&self) -> ReviewStatus {
        match self {
            ReviewOutcome::Approved { .. } => ReviewStatus::Completed,
            ReviewOutcome::Rejected { .. } | ReviewOutcome::Failed { .. } => ReviewStatus::Failed,
        }
    }

    fn result(&self) -> ReviewResult {
        match self {
            ReviewOutcome::Approved { review } => ReviewResult {
                approved: true,
                success: true,
                error: None,
                review: review.clone(),
            },
            ReviewOutcome::Rejected { review } => ReviewResult {
                approved: false,
                success: true,
                error: None,
                review: review.clone(),
            },
            ReviewOutcome::Failed { error } => ReviewResult {
                approved: false,
                success: false,
                error: Some(error.clone()),
                review: String::new(),
            },
        }
    }
}

/// What the hook caller should do after a review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Continue,
    Block { reason: String },
    Warn { message: String },
}

/// Assign a reviewer for `file_path`, recording a pending review unless one
/// already exists for the same reviewer.
pub fn assign(state: &mut SessionState, file_path: &str) -> Assignment {
    let author = state.last_agent.clone();
    let reviewer = reviewer_for(&author);

    let duplicate = state
        .pending_reviews
        .iter()
        .any(|r| r.is_pending() && r.file_path == file_path && r.reviewer == reviewer.as_str());
    if duplicate {
        return Assignment::Duplicate { reviewer };
    }

    state
        .pending_reviews
        .push(Review::pending(file_path, reviewer.as_str(), &author));
    Assignment::Created { reviewer, author }
}

/// Resolve the pending review of `file_path` by `reviewer` with `outcome`.
///
/// A failed invocation also counts against the reviewer. Returns `false` if
/// no matching pending review was found (e.g. it was reset meanwhile).
pub fn resolve(
    state: &mut SessionState,
    file_path: &str,
    reviewer: Agent,
    outcome: &ReviewOutcome,
) -> bool {
    if matches!(outcome, ReviewOutcome::Failed { .. }) {
        reviewer.record_failure(state);
    }

    let Some(review) = state
        .pending_reviews
        .iter_mut()
        .find(|r| r.is_pending() && r.file_path == file_path && r.reviewer == reviewer.as_str())
    else {
        return false;
    };

    review.status = outcome.status();
    review.result = Some(outcome.result());
    review.completion_timestamp = Some(Utc::now().to_rfc3339());
    true
}

/// Map an outcome to the gate's effect on the calling agent.
pub fn gate(file_path: &str, reviewer: Agent, outcome: &ReviewOutcome) -> GateDecision {
    match outcome {
        ReviewOutcome::Approved { .. } => GateDecision::Continue,
        ReviewOutcome::Rejected { review } => GateDecision::Block {
            reason: format!("{reviewer} rejected changes to {file_path}:\n{review}"),
        },
        ReviewOutcome::Failed { error } => GateDecision::Warn {
            message: format!("review of {file_path} by {reviewer} could not run: {error}"),
        },
    }
}

/// Drives one review through the session actor and a [`Reviewer`].
pub struct ReviewQueue<R> {
    session: SessionHandle,
    reviewer: R,
    matcher: ApprovalMatcher,
}

impl<R: Reviewer> ReviewQueue<R> {
    pub fn new(session: SessionHandle, reviewer: R, matcher: ApprovalMatcher) -> Self {
        Self {
            session,
            reviewer,
            matcher,
        }
    }

    /// Handle one edit of `file_path`, logged under `hook_name`.
    ///
    /// The pending review is persisted before the reviewer runs; the state
    /// lock is not held while waiting for it.
    pub async fn on_edit(
        &self,
        hook_name: &str,
        file_path: &str,
    ) -> Result<GateDecision, StateError> {
        let file = file_path.to_string();
        let hook = hook_name.to_string();
        let assignment = self
            .session
            .update(move |state| {
                state.record_hook(&hook, format!("edit {file}"));
                assign(state, &file)
            })
            .await?;

        let (reviewer, author) = match assignment {
            Assignment::Duplicate { reviewer } => {
                tracing::info!(file = file_path, reviewer = %reviewer, "review already pending, skipping");
                return Ok(GateDecision::Continue);
            }
            Assignment::Created { reviewer, author } => (reviewer, author),
        };

        let request = ReviewRequest {
            file_path: file_path.to_string(),
            author,
            reviewer,
        };
        let result = self.reviewer.review(&request).await;
        let outcome = ReviewOutcome::from_result(result, &self.matcher);

        match &outcome {
            ReviewOutcome::Approved { .. } => {
                tracing::info!(file = file_path, reviewer = %reviewer, "review approved")
            }
            ReviewOutcome::Rejected { .. } => {
                tracing::warn!(file = file_path, reviewer = %reviewer, "review rejected")
            }
            ReviewOutcome::Failed { error } => {
                tracing::warn!(file = file_path, reviewer = %reviewer, error = %error, "reviewer invocation failed")
            }
        }

        let file = file_path.to_string();
        let hook = hook_name.to_string();
        let recorded = outcome.clone();
        let found = self
            .session
            .update(move |state| {
                state.record_hook(&hook, format!("resolved {file}"));
                resolve(state, &file, reviewer, &recorded)
            })
            .await?;
        if !found {
            tracing::warn!(file = file_path, reviewer = %reviewer, "pending review disappeared before resolution");
        }

        Ok(gate(file_path, reviewer, &outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::merge::default_approval_patterns;
    use crate::session::StateStore;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn matcher() -> ApprovalMatcher {
        ApprovalMatcher::new(&default_approval_patterns()).unwrap()
    }

    #[test]
    fn second_assignment_for_same_file_is_a_duplicate() {
        let mut state = SessionState::default();

        assert_eq!(
            assign(&mut state, "a.py"),
            Assignment::Created {
                reviewer: Agent::Glm,
                author: "claude".into()
            }
        );
        assert_eq!(
            assign(&mut state, "a.py"),
            Assignment::Duplicate {
                reviewer: Agent::Glm
            }
        );
        assert_eq!(state.pending_reviews.len(), 1);

        assign(&mut state, "b.py");
        assert_eq!(state.pending_reviews.len(), 2);
    }

    #[test]
    fn a_different_author_gets_its_own_review() {
        let mut state = SessionState::default();
        assign(&mut state, "a.py");
        state.last_agent = "glm".into();
        assert!(matches!(
            assign(&mut state, "a.py"),
            Assignment::Created {
                reviewer: Agent::Codex,
                ..
            }
        ));
        assert_eq!(state.pending_reviews.len(), 2);
    }

    #[test]
    fn resolved_review_no_longer_blocks_reassignment() {
        let mut state = SessionState::default();
        assign(&mut state, "a.py");
        let outcome = ReviewOutcome::Approved {
            review: "LGTM".into(),
        };
        assert!(resolve(&mut state, "a.py", Agent::Glm, &outcome));

        let review = &state.pending_reviews[0];
        assert_eq!(review.status, ReviewStatus::Completed);
        assert!(review.completion_timestamp.is_some());
        assert_eq!(review.result.as_ref().unwrap().review, "LGTM");

        assert!(matches!(
            assign(&mut state, "a.py"),
            Assignment::Created { .. }
        ));
    }

    #[test]
    fn failed_invocation_counts_against_reviewer() {
        let mut state = SessionState {
            last_agent: "glm".into(),
            ..Default::default()
        };
        assign(&mut state, "a.py");
        let outcome = ReviewOutcome::Failed {
            error: "timed out".into(),
        };
        resolve(&mut state, "a.py", Agent::Codex, &outcome);

        assert_eq!(state.codex_failures, 1);
        let result = state.pending_reviews[0].result.as_ref().unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("timed out"));
        assert_eq!(state.pending_reviews[0].status, ReviewStatus::Failed);
    }

    #[test]
    fn gate_blocks_on_rejection_and_warns_on_failure() {
        let m = matcher();
        let approved = ReviewOutcome::from_result(Ok("APPROVED".into()), &m);
        let rejected = ReviewOutcome::from_result(Ok("needs work".into()), &m);
        let failed = ReviewOutcome::from_result(
            Err(ReviewError::NoCommand("glm".into())),
            &m,
        );

        assert_eq!(gate("a.py", Agent::Glm, &approved), GateDecision::Continue);
        match gate("a.py", Agent::Glm, &rejected) {
            GateDecision::Block { reason } => assert!(reason.contains("needs work")),
            other => panic!("expected Block, got {other:?}"),
        }
        assert!(matches!(
            gate("a.py", Agent::Glm, &failed),
            GateDecision::Warn { .. }
        ));
    }

    /// Answers with a fixed text and counts invocations.
    struct ScriptedReviewer {
        answer: Mutex<Option<Result<String, ReviewError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedReviewer {
        fn new(answer: Result<String, ReviewError>) -> Self {
            Self {
                answer: Mutex::new(Some(answer)),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Reviewer for ScriptedReviewer {
        async fn review(&self, _request: &ReviewRequest) -> Result<String, ReviewError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok("APPROVED".into()))
        }
    }

    fn session(dir: &std::path::Path) -> SessionHandle {
        SessionHandle::spawn(StateStore::new(
            dir.join("state.json"),
            100,
            chrono::Duration::hours(1),
        ))
    }

    #[tokio::test]
    async fn rejection_is_persisted_and_blocks() {
        let tmp = TempDir::new().unwrap();
        let handle = session(tmp.path());
        let queue = ReviewQueue::new(
            handle.clone(),
            ScriptedReviewer::new(Ok("missing error handling".into())),
            matcher(),
        );

        let decision = queue.on_edit("review-gate", "src/main.rs").await.unwrap();
        assert!(matches!(decision, GateDecision::Block { .. }));

        let state = handle.snapshot().await.unwrap();
        assert_eq!(state.pending_reviews.len(), 1);
        let review = &state.pending_reviews[0];
        assert_eq!(review.status, ReviewStatus::Failed);
        assert_eq!(review.reviewer, "glm");
        assert_eq!(review.author, "claude");
        let result = review.result.as_ref().unwrap();
        assert!(!result.approved);
        assert!(result.success);
        assert_eq!(result.review, "missing error handling");
        assert_eq!(state.hooks_executed.len(), 2);
    }

    #[tokio::test]
    async fn pending_duplicate_skips_reviewer() {
        let tmp = TempDir::new().unwrap();
        let handle = session(tmp.path());
        handle
            .update(|s| {
                assign(s, "a.py");
            })
            .await
            .unwrap();

        let reviewer = ScriptedReviewer::new(Ok("APPROVED".into()));
        let queue = ReviewQueue::new(handle.clone(), reviewer, matcher());
        assert_eq!(
            queue.on_edit("review-gate", "a.py").await.unwrap(),
            GateDecision::Continue
        );
        assert_eq!(queue.reviewer.calls.load(Ordering::SeqCst), 0);

        let state = handle.snapshot().await.unwrap();
        assert_eq!(state.pending_reviews.len(), 1);
        assert!(state.pending_reviews[0].is_pending());
    }

    #[tokio::test]
    async fn failed_invocation_warns_and_counts() {
        let tmp = TempDir::new().unwrap();
        let handle = session(tmp.path());
        let queue = ReviewQueue::new(
            handle.clone(),
            ScriptedReviewer::new(Err(ReviewError::TimedOut {
                reviewer: "glm".into(),
                timeout_secs: 60,
            })),
            matcher(),
        );

        let decision = queue.on_edit("review-gate", "a.py").await.unwrap();
        assert!(matches!(decision, GateDecision::Warn { .. }));

        let state = handle.snapshot().await.unwrap();
        assert_eq!(state.glm_failures, 1);
        assert_eq!(state.pending_reviews[0].status, ReviewStatus::Failed);
    }
}
