use std::path::PathBuf;

/// Errors related to configuration loading and parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config at {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid approval pattern: {0}")]
    InvalidPattern(String),
}

/// Errors in a batch request string. These are fatal and raised before any
/// manifest is written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("Batch request contains no tasks")]
    Empty,

    #[error("Unknown task type `{kind}` (expected one of: review, test, docs, search)")]
    UnknownTaskKind { kind: String },

    #[error("Clause {clause} starts with a quoted description but has no task type")]
    MissingKind { clause: usize },

    #[error("Unterminated quote in batch request")]
    UnterminatedQuote,
}

/// Errors related to running a coordination batch.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("Failed to reserve batch directory under {root}: {source}")]
    ReserveFailed {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {what} at {path}: {message}")]
    WriteFailed {
        what: &'static str,
        path: PathBuf,
        message: String,
    },

    #[error("Worker program not found at {0}")]
    WorkerNotFound(PathBuf),
}

/// Errors related to external command execution.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("Empty command line")]
    EmptyCommand,

    #[error("Program not found: {0}")]
    NotFound(String),

    #[error("Failed to spawn process: {0}")]
    SpawnFailed(String),

    #[error("Process execution failed: {0}")]
    ProcessFailed(String),
}

/// Errors from invoking a reviewer. All of these are non-blocking for the
/// review gate.
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("No reviewer command configured for `{0}`")]
    NoCommand(String),

    #[error("Reviewer `{reviewer}` timed out after {timeout_secs}s")]
    TimedOut { reviewer: String, timeout_secs: u64 },

    #[error("Reviewer `{reviewer}` exited with code {code}: {stderr}")]
    NonZeroExit {
        reviewer: String,
        code: String,
        stderr: String,
    },

    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Errors related to session state persistence.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize session state: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Session actor is no longer running")]
    ActorGone,
}
