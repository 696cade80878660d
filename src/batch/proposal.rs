//! Change classification and the batch proposal.
//!
//! Every task with a result artifact on disk becomes a change entry. Safe
//! kinds (tests, docs, search results) can be applied without review; risky
//! kinds (code edits) must be approved. Tasks without an artifact contribute
//! nothing.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::conflicts::Conflict;
use super::manifest::{BatchDir, Manifest, write_json_atomic};
use super::monitor::CompletionReport;
use super::task::{ChangeClass, Task, TaskId, TaskKind};
use crate::error::BatchError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Completed,
    TimedOut,
    Incomplete,
}

impl ProposalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProposalStatus::Completed => "completed",
            ProposalStatus::TimedOut => "timed_out",
            ProposalStatus::Incomplete => "incomplete",
        }
    }
}

/// One task's result artifact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub task_id: TaskId,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub description: String,
    pub files: Vec<String>,
    pub output: PathBuf,
}

/// The coordinator's final, reviewable output for one batch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Proposal {
    pub task_id: String,
    pub completed_at: String,
    pub total_tasks: usize,
    pub status: ProposalStatus,
    pub incomplete_tasks: Vec<TaskId>,
    pub safe_changes: Vec<ChangeEntry>,
    pub risky_changes: Vec<ChangeEntry>,
    pub conflicts: Vec<Conflict>,
    pub output_dir: PathBuf,
}

impl Proposal {
    /// Classify every task's artifact found in `output_dir`.
    pub fn build(
        manifest: &Manifest,
        output_dir: &Path,
        completion: &CompletionReport,
        conflicts: Vec<Conflict>,
    ) -> Self {
        let (safe_changes, risky_changes) = classify_outputs(&manifest.tasks, output_dir);

        let status = if completion.timed_out {
            ProposalStatus::TimedOut
        } else if completion.all_done() {
            ProposalStatus::Completed
        } else {
            ProposalStatus::Incomplete
        };

        Self {
            task_id: manifest.task_id.clone(),
            completed_at: Utc::now().to_rfc3339(),
            total_tasks: manifest.tasks.len(),
            status,
            incomplete_tasks: completion.missing(),
            safe_changes,
            risky_changes,
            conflicts,
            output_dir: output_dir.to_path_buf(),
        }
    }

    /// Write the proposal once, atomically, into the batch directory.
    pub fn persist(&self, batch_dir: &BatchDir) -> Result<PathBuf, BatchError> {
        let path = batch_dir.proposal_path();
        write_json_atomic(&path, self).map_err(|message| BatchError::WriteFailed {
            what: "proposal",
            path: path.clone(),
            message,
        })?;
        Ok(path)
    }
}

/// Split the tasks that produced an artifact into (safe, risky) changes.
pub fn classify_outputs(tasks: &[Task], output_dir: &Path) -> (Vec<ChangeEntry>, Vec<ChangeEntry>) {
    let mut safe = Vec::new();
    let mut risky = Vec::new();

    for task in tasks {
        let output = output_dir.join(task.output_file_name());
        if !output.is_file() {
            tracing::debug!(task_id = task.id, output = %output.display(), "no output artifact");
            continue;
        }

        let entry = ChangeEntry {
            task_id: task.id,
            kind: task.kind,
            description: task.description.clone(),
            files: task.files.clone(),
            output,
        };
        match task.kind.class() {
            ChangeClass::Safe => safe.push(entry),
            ChangeClass::Risky => risky.push(entry),
        }
    }

    (safe, risky)
}
