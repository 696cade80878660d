//! Task vocabulary shared by the parser, manifest, supervisor, and proposal.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RequestError;

/// Sequential task id, unique within a batch, starting at 1.
pub type TaskId = u32;

/// The closed set of task kinds a batch request may name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Code review that may result in edits.
    Review,
    Test,
    Docs,
    Search,
}

/// Whether a change can be applied without human approval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeClass {
    Safe,
    Risky,
}

impl TaskKind {
    pub const ALL: [TaskKind; 4] = [
        TaskKind::Review,
        TaskKind::Test,
        TaskKind::Docs,
        TaskKind::Search,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Review => "review",
            TaskKind::Test => "test",
            TaskKind::Docs => "docs",
            TaskKind::Search => "search",
        }
    }

    pub fn class(self) -> ChangeClass {
        match self {
            TaskKind::Review => ChangeClass::Risky,
            TaskKind::Test | TaskKind::Docs | TaskKind::Search => ChangeClass::Safe,
        }
    }

    /// Edit-producing kinds take exclusive file leases and count towards
    /// conflicts.
    pub fn produces_edits(self) -> bool {
        matches!(self, TaskKind::Review)
    }

    pub fn output_extension(self) -> &'static str {
        match self {
            TaskKind::Test => "py",
            TaskKind::Review | TaskKind::Docs | TaskKind::Search => "md",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| RequestError::UnknownTaskKind { kind: s.to_string() })
    }
}

/// One unit of delegated work. Immutable once parsed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub description: String,
    pub files: Vec<String>,
}

impl Task {
    /// File name of the result artifact the worker is expected to write.
    pub fn output_file_name(&self) -> String {
        format!("{}_{}.{}", self.id, self.kind, self.kind.output_extension())
    }

    /// Worker stdout/stderr capture.
    pub fn log_file_name(&self) -> String {
        format!("{}.log", self.id)
    }
}
