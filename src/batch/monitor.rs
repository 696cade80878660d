//! Completion monitor.
//!
//! A task is complete once `{output_dir}/{id}.done` exists. The monitor
//! reacts to worker exit events as they arrive and re-checks markers on a
//! fixed interval for markers written by processes that outlive their
//! worker. When the deadline elapses the batch's token is cancelled, which
//! kills every worker still running.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::time::MissedTickBehavior;

use super::supervisor::{ExitKind, SpawnedBatch};
use super::task::{Task, TaskId};

/// How long to wait for worker tasks to reap their processes after cancellation.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Final state of one task as seen by the monitor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WorkerOutcome {
    /// The completion marker is present.
    Done { exit_code: Option<i32> },
    /// The worker finished (or never started) without writing its marker.
    Failed { reason: String },
    /// The deadline elapsed before the marker appeared.
    TimedOut,
}

/// Summary of waiting for one batch.
#[derive(Clone, Debug, Serialize)]
pub struct CompletionReport {
    pub outcomes: BTreeMap<TaskId, WorkerOutcome>,
    pub timed_out: bool,
    pub elapsed_secs: f64,
}

impl CompletionReport {
    pub fn all_done(&self) -> bool {
        self.outcomes
            .values()
            .all(|o| matches!(o, WorkerOutcome::Done { .. }))
    }

    /// Task ids whose completion marker is missing.
    pub fn missing(&self) -> Vec<TaskId> {
        self.outcomes
            .iter()
            .filter(|(_, o)| !matches!(o, WorkerOutcome::Done { .. }))
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Waits for the workers of one batch under a deadline.
pub struct CompletionMonitor {
    output_dir: PathBuf,
    poll_interval: Duration,
    deadline: Duration,
}

impl CompletionMonitor {
    pub fn new(output_dir: PathBuf, poll_interval: Duration, deadline: Duration) -> Self {
        Self {
            output_dir,
            poll_interval,
            deadline,
        }
    }

    /// Wait until every task has resolved or the deadline elapses.
    ///
    /// Always cancels the batch token before returning, so no worker
    /// process outlives the wait.
    pub async fn wait(&self, tasks: &[Task], batch: SpawnedBatch) -> CompletionReport {
        let start = Instant::now();
        let SpawnedBatch {
            mut exits,
            handles,
            cancel,
        } = batch;

        let mut pending: BTreeSet<TaskId> = tasks.iter().map(|t| t.id).collect();
        let mut outcomes: BTreeMap<TaskId, WorkerOutcome> = BTreeMap::new();
        let mut timed_out = false;

        let deadline = tokio::time::sleep(self.deadline);
        tokio::pin!(deadline);
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.poll_interval,
            self.poll_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !pending.is_empty() {
            tokio::select! {
                biased;

                exit = exits.recv() => {
                    let Some(exit) = exit else {
                        // Every worker task is gone; nothing more can arrive.
                        break;
                    };
                    if !pending.remove(&exit.task_id) {
                        continue;
                    }
                    let outcome = self.resolve_exit(exit.task_id, &exit.kind);
                    tracing::info!(task_id = exit.task_id, ?outcome, elapsed_secs = exit.elapsed_secs, "worker resolved");
                    outcomes.insert(exit.task_id, outcome);
                }
                _ = ticker.tick() => {
                    let ready: Vec<TaskId> = pending
                        .iter()
                        .copied()
                        .filter(|id| marker_present(&self.output_dir, *id))
                        .collect();
                    for id in ready {
                        pending.remove(&id);
                        tracing::info!(task_id = id, "completion marker found while worker still running");
                        outcomes.insert(id, WorkerOutcome::Done { exit_code: None });
                    }
                }
                _ = &mut deadline => {
                    timed_out = true;
                    tracing::warn!(
                        deadline_secs = self.deadline.as_secs(),
                        missing = ?pending,
                        "batch deadline elapsed"
                    );
                    break;
                }
            }
        }

        // A final look catches markers written just before the deadline.
        for id in std::mem::take(&mut pending) {
            let outcome = if marker_present(&self.output_dir, id) {
                WorkerOutcome::Done { exit_code: None }
            } else if timed_out {
                WorkerOutcome::TimedOut
            } else {
                WorkerOutcome::Failed {
                    reason: "worker vanished without reporting an exit".into(),
                }
            };
            outcomes.insert(id, outcome);
        }

        cancel.cancel();
        for handle in handles {
            let _ = tokio::time::timeout(DRAIN_GRACE, handle).await;
        }

        CompletionReport {
            outcomes,
            timed_out,
            elapsed_secs: start.elapsed().as_secs_f64(),
        }
    }

    fn resolve_exit(&self, task_id: TaskId, kind: &ExitKind) -> WorkerOutcome {
        if marker_present(&self.output_dir, task_id) {
            let exit_code = match kind {
                ExitKind::Exited { code } => *code,
                _ => None,
            };
            return WorkerOutcome::Done { exit_code };
        }

        let reason = match kind {
            ExitKind::Exited { code } => format!(
                "worker exited with code {} without writing its completion marker",
                code.map_or("unknown".to_string(), |c| c.to_string())
            ),
            ExitKind::SpawnFailed { message } => format!("worker failed to start: {message}"),
            ExitKind::Cancelled => "worker cancelled".to_string(),
        };
        WorkerOutcome::Failed { reason }
    }
}

/// Whether the completion marker for `task_id` exists in `output_dir`.
pub fn marker_present(output_dir: &Path, task_id: TaskId) -> bool {
    output_dir.join(format!("{task_id}.done")).exists()
}
