//! Worker process supervisor.
//!
//! Launches one worker process per task:
//!
//! ```text
//! <worker> <task.id> <task.type> <output_dir> <description> [file...]
//! ```
//!
//! Each worker:
//! - Runs in its own process group (`process_group(0)`) so cancellation can
//!   kill everything it forked
//! - Has stdout/stderr piped into a bounded ring buffer, flushed to
//!   `{output_dir}/{id}.log` when it exits
//! - Holds exclusive leases on its declared files while running, if its kind
//!   produces edits
//! - Reports a [`WorkerExit`] on the batch's exit channel
//!
//! [`WorkerSupervisor::spawn_all`] returns as soon as the owning tokio tasks
//! are started; it never waits on a worker.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::locks::FileLocks;
use super::task::{Task, TaskId};
use crate::exec::kill_process_group;

/// Maximum number of lines retained in each worker's output ring buffer.
const OUTPUT_BUFFER_CAPACITY: usize = 1000;

/// How long to wait for pipe readers once the worker has exited.
const READER_GRACE: Duration = Duration::from_secs(2);

/// How a worker's supervision ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExitKind {
    /// The process exited on its own. Non-zero codes are not failures here.
    Exited { code: Option<i32> },
    /// The process could not be started.
    SpawnFailed { message: String },
    /// The batch was cancelled before the process finished (or started).
    Cancelled,
}

/// Event sent on the batch's exit channel, once per task.
#[derive(Clone, Debug)]
pub struct WorkerExit {
    pub task_id: TaskId,
    pub kind: ExitKind,
    pub elapsed_secs: f64,
}

/// Lifecycle of a supervised worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkerState {
    /// Waiting for file leases held by another edit task.
    Queued,
    Running { pid: Option<u32>, started_at: String },
    Finished,
}

/// Spawns and owns the worker processes of one batch.
pub struct WorkerSupervisor {
    worker: PathBuf,
    workspace: PathBuf,
    output_dir: PathBuf,
    locks: FileLocks,
    cancel: CancellationToken,
    states: Arc<Mutex<BTreeMap<TaskId, WorkerState>>>,
}

/// Handles for a spawned batch, consumed by the completion monitor.
pub struct SpawnedBatch {
    pub exits: UnboundedReceiver<WorkerExit>,
    pub handles: Vec<JoinHandle<()>>,
    pub cancel: CancellationToken,
}

impl WorkerSupervisor {
    /// Create a supervisor whose workers all share `output_dir`.
    ///
    /// `cancel` is the batch's root token; cancelling it kills every worker
    /// process group still alive.
    pub fn new(
        worker: PathBuf,
        workspace: PathBuf,
        output_dir: PathBuf,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            worker,
            workspace,
            output_dir,
            locks: FileLocks::new(),
            cancel,
            states: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Start one supervised worker per task and return immediately.
    pub fn spawn_all(&self, tasks: &[Task]) -> SpawnedBatch {
        let (tx, rx) = mpsc::unbounded_channel();

        let handles = tasks
            .iter()
            .map(|task| {
                self.set_state(task.id, WorkerState::Queued);
                let job = WorkerJob {
                    task: task.clone(),
                    worker: self.worker.clone(),
                    workspace: self.workspace.clone(),
                    output_dir: self.output_dir.clone(),
                    locks: self.locks.clone(),
                    cancel: self.cancel.child_token(),
                    states: self.states.clone(),
                    exits: tx.clone(),
                };
                tokio::spawn(job.run())
            })
            .collect();

        tracing::info!(
            workers = tasks.len(),
            output_dir = %self.output_dir.display(),
            "workers dispatched"
        );

        SpawnedBatch {
            exits: rx,
            handles,
            cancel: self.cancel.clone(),
        }
    }

    /// Snapshot of every worker's lifecycle state.
    pub fn states(&self) -> BTreeMap<TaskId, WorkerState> {
        self.states.lock().unwrap().clone()
    }

    fn set_state(&self, id: TaskId, state: WorkerState) {
        self.states.lock().unwrap().insert(id, state);
    }
}

/// Everything one worker's owning task needs, moved into `tokio::spawn`.
struct WorkerJob {
    task: Task,
    worker: PathBuf,
    workspace: PathBuf,
    output_dir: PathBuf,
    locks: FileLocks,
    cancel: CancellationToken,
    states: Arc<Mutex<BTreeMap<TaskId, WorkerState>>>,
    exits: UnboundedSender<WorkerExit>,
}

impl WorkerJob {
    async fn run(self) {
        let start = Instant::now();
        let task_id = self.task.id;

        // 1. Edit tasks wait for exclusive leases on their files.
        let _lease = if self.task.kind.produces_edits() {
            match self.locks.try_acquire(&self.task.files) {
                Some(lease) => Some(lease),
                None => {
                    tracing::info!(task_id, files = ?self.task.files, "waiting for file leases held by another edit task");
                    tokio::select! {
                        lease = self.locks.acquire(&self.task.files) => Some(lease),
                        _ = self.cancel.cancelled() => {
                            tracing::warn!(task_id, "cancelled while waiting for file leases");
                            self.finish(ExitKind::Cancelled, start);
                            return;
                        }
                    }
                }
            }
        } else {
            None
        };

        // 2. Spawn the worker in its own process group.
        let spawn_result = Command::new(&self.worker)
            .arg(task_id.to_string())
            .arg(self.task.kind.as_str())
            .arg(&self.output_dir)
            .arg(&self.task.description)
            .args(&self.task.files)
            .current_dir(&self.workspace)
            .process_group(0)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawn_result {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(task_id, worker = %self.worker.display(), error = %e, "failed to spawn worker");
                self.finish(
                    ExitKind::SpawnFailed {
                        message: e.to_string(),
                    },
                    start,
                );
                return;
            }
        };

        let pid = child.id();
        self.set_state(WorkerState::Running {
            pid,
            started_at: Utc::now().to_rfc3339(),
        });
        tracing::info!(task_id, kind = %self.task.kind, pid = ?pid, "worker started");

        // 3. Drain stdout/stderr into a shared ring buffer.
        let output_buffer: Arc<Mutex<VecDeque<String>>> =
            Arc::new(Mutex::new(VecDeque::with_capacity(OUTPUT_BUFFER_CAPACITY)));
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(capture_lines(stdout, output_buffer.clone(), "")));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(capture_lines(
                stderr,
                output_buffer.clone(),
                "[stderr] ",
            )));
        }

        // 4. Wait for exit or cancellation.
        let kind = tokio::select! {
            wait_result = child.wait() => match wait_result {
                Ok(status) => ExitKind::Exited { code: status.code() },
                Err(e) => ExitKind::SpawnFailed { message: format!("process wait failed: {e}") },
            },
            _ = self.cancel.cancelled() => {
                // Kill the entire process group via SIGKILL.
                if let Some(pid) = child.id() {
                    kill_process_group(pid);
                }
                // Reap the child to prevent zombies.
                let _ = child.wait().await;
                tracing::warn!(task_id, "worker killed on cancellation");
                ExitKind::Cancelled
            }
        };

        for reader in readers {
            let _ = tokio::time::timeout(READER_GRACE, reader).await;
        }
        self.write_log(&output_buffer);

        self.finish(kind, start);
    }

    fn finish(&self, kind: ExitKind, start: Instant) {
        self.set_state(WorkerState::Finished);
        let elapsed_secs = start.elapsed().as_secs_f64();
        tracing::debug!(task_id = self.task.id, ?kind, elapsed_secs, "worker finished");
        let _ = self.exits.send(WorkerExit {
            task_id: self.task.id,
            kind,
            elapsed_secs,
        });
    }

    fn set_state(&self, state: WorkerState) {
        self.states.lock().unwrap().insert(self.task.id, state);
    }

    fn write_log(&self, buffer: &Arc<Mutex<VecDeque<String>>>) {
        let contents = {
            let buf = buffer.lock().unwrap();
            let mut text = buf.iter().cloned().collect::<Vec<_>>().join("\n");
            if !text.is_empty() {
                text.push('\n');
            }
            text
        };
        let path = self.output_dir.join(self.task.log_file_name());
        if let Err(e) = std::fs::write(&path, contents) {
            tracing::warn!(path = %path.display(), error = %e, "failed to write worker log");
        }
    }
}

async fn capture_lines<R: AsyncRead + Unpin>(
    reader: R,
    buffer: Arc<Mutex<VecDeque<String>>>,
    prefix: &'static str,
) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let mut buf = buffer.lock().unwrap();
        if buf.len() >= OUTPUT_BUFFER_CAPACITY {
            buf.pop_front();
        }
        buf.push_back(format!("{prefix}{line}"));
    }
}
