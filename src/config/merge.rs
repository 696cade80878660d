use super::schema::{AppConfig, PartialConfig};
use std::path::{Path, PathBuf};

/// Default approval markers matched against reviewer output.
pub fn default_approval_patterns() -> Vec<String> {
    vec![r"(?i)\bAPPROVED\b".into(), r"(?i)\bLGTM\b".into()]
}

impl PartialConfig {
    /// Merge self with a lower-priority fallback.
    /// Self's non-None values take precedence.
    /// For approval_patterns: REPLACE semantics (if self has Some, use it entirely).
    pub fn with_fallback(self, fallback: PartialConfig) -> PartialConfig {
        PartialConfig {
            workspace: self.workspace.or(fallback.workspace),
            worker: self.worker.or(fallback.worker),
            output_root: self.output_root.or(fallback.output_root),
            poll_interval_secs: self.poll_interval_secs.or(fallback.poll_interval_secs),
            deadline_secs: self.deadline_secs.or(fallback.deadline_secs),
            review_timeout_secs: self.review_timeout_secs.or(fallback.review_timeout_secs),
            approval_patterns: self.approval_patterns.or(fallback.approval_patterns),
            glm_command: self.glm_command.or(fallback.glm_command),
            codex_command: self.codex_command.or(fallback.codex_command),
            state_path: self.state_path.or(fallback.state_path),
            archive_dir: self.archive_dir.or(fallback.archive_dir),
            hook_log_limit: self.hook_log_limit.or(fallback.hook_log_limit),
            review_retention_secs: self
                .review_retention_secs
                .or(fallback.review_retention_secs),
        }
    }

    /// Convert to AppConfig, filling any remaining gaps with defaults.
    /// Relative paths are resolved against the workspace.
    pub fn finalize(self) -> AppConfig {
        let workspace = self.workspace.unwrap_or_else(|| PathBuf::from("."));
        let resolve = |p: Option<PathBuf>, default: &str| -> PathBuf {
            let p = p.unwrap_or_else(|| PathBuf::from(default));
            join_workspace(&workspace, p)
        };

        AppConfig {
            worker: resolve(self.worker, "scripts/worker.sh"),
            output_root: resolve(self.output_root, ".baton/batches"),
            state_path: resolve(self.state_path, ".baton/session_state.json"),
            archive_dir: resolve(self.archive_dir, ".baton/logs"),
            poll_interval_secs: self.poll_interval_secs.unwrap_or(2).max(1),
            deadline_secs: self.deadline_secs.unwrap_or(300),
            review_timeout_secs: self.review_timeout_secs.unwrap_or(60),
            approval_patterns: self
                .approval_patterns
                .unwrap_or_else(default_approval_patterns),
            glm_command: self
                .glm_command
                .unwrap_or_else(|| vec!["glm".into(), "-p".into()]),
            codex_command: self
                .codex_command
                .unwrap_or_else(|| vec!["codex".into(), "exec".into()]),
            hook_log_limit: self.hook_log_limit.unwrap_or(100),
            review_retention_secs: self.review_retention_secs.unwrap_or(3600),
            workspace,
        }
    }
}

fn join_workspace(workspace: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        workspace.join(path)
    }
}
