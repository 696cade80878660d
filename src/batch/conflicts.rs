//! Declarative conflict detection over the task list.
//!
//! Only edit-producing tasks count. Read-only kinds sharing a file with an
//! edit are not reported. Undeclared writes are invisible here, and declared
//! files a worker never touches still count.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::task::{Task, TaskId};

/// A file declared by more than one edit-producing task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub file: String,
    #[serde(rename = "tasks")]
    pub task_ids: Vec<TaskId>,
}

/// Report every file claimed by two or more edit-producing tasks, sorted by
/// path with task ids ascending.
pub fn detect_conflicts(tasks: &[Task]) -> Vec<Conflict> {
    let mut editors: BTreeMap<&str, Vec<TaskId>> = BTreeMap::new();

    for task in tasks.iter().filter(|t| t.kind.produces_edits()) {
        for file in &task.files {
            let ids = editors.entry(file.as_str()).or_default();
            if !ids.contains(&task.id) {
                ids.push(task.id);
            }
        }
    }

    editors
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|(file, mut ids)| {
            ids.sort_unstable();
            tracing::warn!(file, tasks = ?ids, "multiple edit tasks declare the same file");
            Conflict {
                file: file.to_string(),
                task_ids: ids,
            }
        })
        .collect()
}
