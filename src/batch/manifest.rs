//! Batch manifest and on-disk batch layout.
//!
//! Each batch owns one directory under the output root:
//!
//! ```text
//! {output_root}/{batch_id}/manifest.json
//! {output_root}/{batch_id}/outputs/        worker results, markers, logs
//! {output_root}/{batch_id}/proposal.json
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::Task;
use crate::error::BatchError;

/// Lifecycle status recorded in the manifest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestStatus {
    Running,
}

/// The record of one batch run. Written once before workers start.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Manifest {
    /// Batch id (`YYYYMMDD_HHMMSS`, with `_N` appended on collision).
    pub task_id: String,
    pub created_at: String,
    pub tasks: Vec<Task>,
    /// Union of every task's files. Edit tasks lease these exclusively
    /// while their worker runs.
    pub locked_files: Vec<String>,
    pub status: ManifestStatus,
}

impl Manifest {
    pub fn new(batch_id: String, tasks: Vec<Task>) -> Self {
        let locked_files = locked_files(&tasks);
        Self {
            task_id: batch_id,
            created_at: Utc::now().to_rfc3339(),
            tasks,
            locked_files,
            status: ManifestStatus::Running,
        }
    }

    /// Write the manifest as pretty JSON into the batch directory.
    pub fn persist(&self, batch_dir: &BatchDir) -> Result<PathBuf, BatchError> {
        let path = batch_dir.manifest_path();
        write_json_atomic(&path, self).map_err(|message| BatchError::WriteFailed {
            what: "manifest",
            path: path.clone(),
            message,
        })?;
        Ok(path)
    }
}

/// Deduplicated union of all task files, in first-appearance order.
pub fn locked_files(tasks: &[Task]) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for file in tasks.iter().flat_map(|t| t.files.iter()) {
        if !files.contains(file) {
            files.push(file.clone());
        }
    }
    files
}

/// A reserved batch directory.
#[derive(Clone, Debug)]
pub struct BatchDir {
    id: String,
    root: PathBuf,
}

impl BatchDir {
    /// Reserve a fresh batch directory under `output_root`.
    ///
    /// The id is the timestamp formatted as `YYYYMMDD_HHMMSS`. Reservation
    /// uses an exclusive `create_dir`, so two batches started within the
    /// same second get `_2`, `_3`, ... suffixes instead of sharing a
    /// directory.
    pub fn reserve(output_root: &Path, now: DateTime<Utc>) -> Result<Self, BatchError> {
        let reserve_err = |source| BatchError::ReserveFailed {
            root: output_root.to_path_buf(),
            source,
        };

        std::fs::create_dir_all(output_root).map_err(reserve_err)?;

        let base = now.format("%Y%m%d_%H%M%S").to_string();
        let mut sequence = 1u32;
        loop {
            let id = if sequence == 1 {
                base.clone()
            } else {
                format!("{base}_{sequence}")
            };
            let root = output_root.join(&id);

            match std::fs::create_dir(&root) {
                Ok(()) => {
                    std::fs::create_dir_all(root.join("outputs")).map_err(reserve_err)?;
                    return Ok(Self { id, root });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    tracing::debug!(batch_id = %id, "batch id taken, trying next suffix");
                    sequence += 1;
                }
                Err(e) => return Err(reserve_err(e)),
            }
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Shared output directory passed to every worker of the batch.
    pub fn output_dir(&self) -> PathBuf {
        self.root.join("outputs")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.json")
    }

    pub fn proposal_path(&self) -> PathBuf {
        self.root.join("proposal.json")
    }
}

/// Serialize `value` to a sibling temp file, then rename it into place.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)
        .and_then(|()| std::fs::File::open(&tmp)?.sync_all())
        .map_err(|e| e.to_string())?;
    std::fs::rename(&tmp, path).map_err(|e| e.to_string())
}
