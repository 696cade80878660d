//! Reviewer invocation and approval detection.

use std::future::Future;
use std::path::PathBuf;

use regex::RegexSet;

use super::agent::Agent;
use crate::config::AppConfig;
use crate::error::{ConfigError, ReviewError};
use crate::exec::execute_command;

/// Text Claude's local review resolves to.
pub const LOCAL_APPROVAL: &str = "APPROVED (reviewed locally by claude)";

/// One file edit to be checked by `reviewer`.
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub file_path: String,
    pub author: String,
    pub reviewer: Agent,
}

impl ReviewRequest {
    pub fn prompt(&self) -> String {
        format!(
            "Review the latest changes to {} made by {}. \
             Reply APPROVED if they are correct; otherwise explain what is wrong.",
            self.file_path, self.author
        )
    }
}

/// Something that can produce a review for a file edit.
pub trait Reviewer {
    /// Return the reviewer's raw text, or why it could not be obtained.
    fn review(
        &self,
        request: &ReviewRequest,
    ) -> impl Future<Output = Result<String, ReviewError>> + Send;
}

/// Runs GLM and Codex as external processes; Claude approves locally.
pub struct CommandReviewer {
    glm_command: Vec<String>,
    codex_command: Vec<String>,
    cwd: PathBuf,
    timeout_secs: u64,
}

impl CommandReviewer {
    pub fn new(
        glm_command: Vec<String>,
        codex_command: Vec<String>,
        cwd: PathBuf,
        timeout_secs: u64,
    ) -> Self {
        Self {
            glm_command,
            codex_command,
            cwd,
            timeout_secs,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.glm_command.clone(),
            config.codex_command.clone(),
            config.workspace.clone(),
            config.review_timeout_secs,
        )
    }

    fn command_for(&self, agent: Agent) -> Option<&[String]> {
        match agent {
            Agent::Glm => Some(&self.glm_command),
            Agent::Codex => Some(&self.codex_command),
            Agent::Claude => None,
        }
    }
}

impl Reviewer for CommandReviewer {
    async fn review(&self, request: &ReviewRequest) -> Result<String, ReviewError> {
        let reviewer = request.reviewer;
        let Some(prefix) = self.command_for(reviewer) else {
            tracing::debug!(file = %request.file_path, "claude review resolves locally");
            return Ok(LOCAL_APPROVAL.to_string());
        };
        if prefix.is_empty() {
            return Err(ReviewError::NoCommand(reviewer.to_string()));
        }

        let mut argv = prefix.to_vec();
        argv.push(request.prompt());

        tracing::info!(
            reviewer = %reviewer,
            file = %request.file_path,
            timeout_secs = self.timeout_secs,
            "invoking reviewer"
        );
        let result = execute_command(&argv, &self.cwd, self.timeout_secs).await?;

        if result.timed_out {
            return Err(ReviewError::TimedOut {
                reviewer: reviewer.to_string(),
                timeout_secs: self.timeout_secs,
            });
        }
        if !result.success() {
            return Err(ReviewError::NonZeroExit {
                reviewer: reviewer.to_string(),
                code: result
                    .exit_code
                    .map_or_else(|| "signal".to_string(), |c| c.to_string()),
                stderr: result.stderr.trim().to_string(),
            });
        }

        Ok(result.stdout)
    }
}

/// Decides whether reviewer text counts as an approval.
pub struct ApprovalMatcher {
    patterns: RegexSet,
}

impl ApprovalMatcher {
    /// Compile the approval patterns once.
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        let patterns =
            RegexSet::new(patterns).map_err(|e| ConfigError::InvalidPattern(e.to_string()))?;
        Ok(Self { patterns })
    }

    pub fn is_approval(&self, review: &str) -> bool {
        self.patterns.is_match(review)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::merge::default_approval_patterns;
    use std::path::Path;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into(), "reviewer".into()]
    }

    fn request(reviewer: Agent) -> ReviewRequest {
        ReviewRequest {
            file_path: "src/lib.rs".into(),
            author: "claude".into(),
            reviewer,
        }
    }

    fn reviewer(glm: Vec<String>, timeout_secs: u64) -> CommandReviewer {
        CommandReviewer::new(glm, vec![], Path::new(".").to_path_buf(), timeout_secs)
    }

    #[test]
    fn default_patterns_match_approvals_only() {
        let matcher = ApprovalMatcher::new(&default_approval_patterns()).unwrap();
        assert!(matcher.is_approval("Looks fine. APPROVED"));
        assert!(matcher.is_approval("lgtm"));
        assert!(matcher.is_approval(LOCAL_APPROVAL));
        assert!(!matcher.is_approval("Changes requested: missing tests"));
        assert!(!matcher.is_approval("UNAPPROVED"));
    }

    #[test]
    fn invalid_pattern_is_a_config_error() {
        let err = ApprovalMatcher::new(&["(unclosed".to_string()]).err().unwrap();
        assert!(matches!(err, ConfigError::InvalidPattern(_)));
    }

    #[tokio::test]
    async fn claude_approves_without_spawning() {
        let r = reviewer(vec!["/definitely/not/here".into()], 5);
        let text = r.review(&request(Agent::Claude)).await.unwrap();
        assert_eq!(text, LOCAL_APPROVAL);
    }

    #[tokio::test]
    async fn prompt_is_passed_as_last_argument() {
        let r = reviewer(sh("echo \"$1\""), 5);
        let text = r.review(&request(Agent::Glm)).await.unwrap();
        assert!(text.contains("src/lib.rs"));
        assert!(text.contains("made by claude"));
    }

    #[tokio::test]
    async fn failures_map_to_review_errors() {
        let missing = reviewer(vec!["baton-no-such-reviewer".into()], 5);
        assert!(matches!(
            missing.review(&request(Agent::Glm)).await,
            Err(ReviewError::Exec(crate::error::ExecError::NotFound(_)))
        ));

        let failing = reviewer(sh("echo boom >&2; exit 3"), 5);
        match failing.review(&request(Agent::Glm)).await {
            Err(ReviewError::NonZeroExit { code, stderr, .. }) => {
                assert_eq!(code, "3");
                assert_eq!(stderr, "boom");
            }
            other => panic!("expected NonZeroExit, got {other:?}"),
        }

        let slow = reviewer(sh("sleep 10"), 1);
        assert!(matches!(
            slow.review(&request(Agent::Glm)).await,
            Err(ReviewError::TimedOut { timeout_secs: 1, .. })
        ));

        let unconfigured = reviewer(vec![], 5);
        assert!(matches!(
            unconfigured.review(&request(Agent::Glm)).await,
            Err(ReviewError::NoCommand(_))
        ));
    }
}
