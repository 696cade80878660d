use serde::Deserialize;
use std::path::PathBuf;

/// The TOML file structure for baton.toml.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    pub batch: Option<BatchSection>,
    pub review: Option<ReviewSection>,
    pub session: Option<SessionSection>,
}

#[derive(Debug, Deserialize)]
pub struct BatchSection {
    pub worker: Option<String>,
    pub output_root: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub deadline_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewSection {
    pub timeout_secs: Option<u64>,
    /// If specified, fully replaces the default approval patterns.
    pub approval_patterns: Option<Vec<String>>,
    pub glm_command: Option<Vec<String>>,
    pub codex_command: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct SessionSection {
    pub state_path: Option<String>,
    pub archive_dir: Option<String>,
    pub hook_log_limit: Option<usize>,
    pub review_retention_secs: Option<u64>,
}

impl ConfigFile {
    /// Flatten the sectioned file into a [`PartialConfig`].
    pub fn to_partial(self) -> PartialConfig {
        let batch = self.batch;
        let review = self.review;
        let session = self.session;

        PartialConfig {
            workspace: None,
            worker: batch.as_ref().and_then(|b| b.worker.as_ref().map(PathBuf::from)),
            output_root: batch
                .as_ref()
                .and_then(|b| b.output_root.as_ref().map(PathBuf::from)),
            poll_interval_secs: batch.as_ref().and_then(|b| b.poll_interval_secs),
            deadline_secs: batch.as_ref().and_then(|b| b.deadline_secs),
            review_timeout_secs: review.as_ref().and_then(|r| r.timeout_secs),
            approval_patterns: review.as_ref().and_then(|r| r.approval_patterns.clone()),
            glm_command: review.as_ref().and_then(|r| r.glm_command.clone()),
            codex_command: review.as_ref().and_then(|r| r.codex_command.clone()),
            state_path: session
                .as_ref()
                .and_then(|s| s.state_path.as_ref().map(PathBuf::from)),
            archive_dir: session
                .as_ref()
                .and_then(|s| s.archive_dir.as_ref().map(PathBuf::from)),
            hook_log_limit: session.as_ref().and_then(|s| s.hook_log_limit),
            review_retention_secs: session.as_ref().and_then(|s| s.review_retention_secs),
        }
    }
}

/// Fully-resolved runtime configuration. All fields have values and all
/// paths are absolute or workspace-relative already joined.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub workspace: PathBuf,
    /// Worker executable launched once per task.
    pub worker: PathBuf,
    /// Directory holding one sub-directory per batch.
    pub output_root: PathBuf,
    pub poll_interval_secs: u64,
    pub deadline_secs: u64,
    pub review_timeout_secs: u64,
    pub approval_patterns: Vec<String>,
    pub glm_command: Vec<String>,
    pub codex_command: Vec<String>,
    pub state_path: PathBuf,
    pub archive_dir: PathBuf,
    /// Maximum number of retained hook execution entries.
    pub hook_log_limit: usize,
    /// Age after which resolved reviews are dropped.
    pub review_retention_secs: u64,
}

/// Partial config used during merge. All fields are Option so that
/// missing fields don't override lower-priority values.
#[derive(Debug, Clone, Default)]
pub struct PartialConfig {
    pub workspace: Option<PathBuf>,
    pub worker: Option<PathBuf>,
    pub output_root: Option<PathBuf>,
    pub poll_interval_secs: Option<u64>,
    pub deadline_secs: Option<u64>,
    pub review_timeout_secs: Option<u64>,
    pub approval_patterns: Option<Vec<String>>,
    pub glm_command: Option<Vec<String>>,
    pub codex_command: Option<Vec<String>>,
    pub state_path: Option<PathBuf>,
    pub archive_dir: Option<PathBuf>,
    pub hook_log_limit: Option<usize>,
    pub review_retention_secs: Option<u64>,
}
