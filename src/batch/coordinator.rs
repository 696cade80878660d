//! Drives one batch from request string to proposal.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::conflicts::{Conflict, detect_conflicts};
use super::manifest::{BatchDir, Manifest};
use super::monitor::{CompletionMonitor, CompletionReport, WorkerOutcome};
use super::parser::parse_request;
use super::proposal::{ChangeEntry, Proposal, ProposalStatus};
use super::supervisor::WorkerSupervisor;
use crate::config::AppConfig;
use crate::error::BatchError;
use crate::session::SessionHandle;
use crate::session::archive::{ArchiveEntry, append_entry};

const HOOK_NAME: &str = "batch";

/// Everything produced by one batch run.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub batch_id: String,
    pub manifest_path: PathBuf,
    pub proposal_path: PathBuf,
    pub proposal: Proposal,
    pub completion: CompletionReport,
}

/// The one-line JSON summary printed by `baton batch`.
#[derive(Debug, Serialize)]
pub struct BatchSummary<'a> {
    pub task_id: &'a str,
    pub status: ProposalStatus,
    pub manifest: &'a Path,
    pub proposal: &'a Path,
    pub safe_changes: &'a [ChangeEntry],
    pub risky_changes: &'a [ChangeEntry],
    pub conflicts: &'a [Conflict],
}

impl BatchReport {
    pub fn summary(&self) -> BatchSummary<'_> {
        BatchSummary {
            task_id: &self.batch_id,
            status: self.proposal.status,
            manifest: &self.manifest_path,
            proposal: &self.proposal_path,
            safe_changes: &self.proposal.safe_changes,
            risky_changes: &self.proposal.risky_changes,
            conflicts: &self.proposal.conflicts,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.proposal.status == ProposalStatus::Completed
    }
}

/// Parse `request`, run one worker per task, and write the manifest and
/// proposal into a fresh batch directory.
///
/// Request errors and a missing worker fail before anything is written. A
/// deadline or Ctrl-C does not fail the call: the proposal is still written
/// and its status says what happened.
pub async fn run_batch(
    config: &AppConfig,
    request: &str,
    session: Option<&SessionHandle>,
) -> Result<BatchReport, BatchError> {
    let tasks = parse_request(request)?;
    if !config.worker.is_file() {
        return Err(BatchError::WorkerNotFound(config.worker.clone()));
    }

    let batch_dir = BatchDir::reserve(&config.output_root, Utc::now())?;
    let manifest = Manifest::new(batch_dir.id().to_string(), tasks);
    let manifest_path = manifest.persist(&batch_dir)?;
    tracing::info!(
        batch_id = batch_dir.id(),
        tasks = manifest.tasks.len(),
        locked_files = manifest.locked_files.len(),
        manifest = %manifest_path.display(),
        "batch manifest written"
    );

    if let Some(session) = session {
        let batch_id = batch_dir.id().to_string();
        let detail = format!("started {batch_id} ({} tasks)", manifest.tasks.len());
        record(session, move |state| {
            state.current_task = Some(format!("batch {batch_id}"));
            state.record_hook(HOOK_NAME, detail);
        })
        .await;
    }

    let cancel = CancellationToken::new();
    let supervisor = WorkerSupervisor::new(
        config.worker.clone(),
        config.workspace.clone(),
        batch_dir.output_dir(),
        cancel.clone(),
    );
    let monitor = CompletionMonitor::new(
        batch_dir.output_dir(),
        Duration::from_secs(config.poll_interval_secs),
        Duration::from_secs(config.deadline_secs),
    );

    let interrupt = tokio::spawn(cancel_on_interrupt(cancel.clone()));
    let spawned = supervisor.spawn_all(&manifest.tasks);
    let completion = monitor.wait(&manifest.tasks, spawned).await;
    interrupt.abort();

    let conflicts = detect_conflicts(&manifest.tasks);
    let proposal = Proposal::build(&manifest, &batch_dir.output_dir(), &completion, conflicts);
    let proposal_path = proposal.persist(&batch_dir)?;
    tracing::info!(
        batch_id = batch_dir.id(),
        status = proposal.status.as_str(),
        safe = proposal.safe_changes.len(),
        risky = proposal.risky_changes.len(),
        conflicts = proposal.conflicts.len(),
        elapsed_secs = completion.elapsed_secs,
        "batch proposal written"
    );

    if let Some(session) = session {
        let done = completion
            .outcomes
            .values()
            .filter(|o| matches!(o, WorkerOutcome::Done { .. }))
            .count() as u64;
        let detail = format!("finished {} ({})", batch_dir.id(), proposal.status.as_str());
        record(session, move |state| {
            state.total_tasks_completed += done;
            state.current_task = None;
            state.record_hook(HOOK_NAME, detail);
        })
        .await;
    }

    append_entry(
        &config.archive_dir,
        &ArchiveEntry::batch_finished(
            batch_dir.id(),
            proposal.status.as_str(),
            proposal.total_tasks,
            proposal.safe_changes.len(),
            proposal.risky_changes.len(),
            proposal.conflicts.len(),
            &proposal_path,
        ),
    );

    Ok(BatchReport {
        batch_id: batch_dir.id().to_string(),
        manifest_path,
        proposal_path,
        proposal,
        completion,
    })
}

async fn record<F>(session: &SessionHandle, f: F)
where
    F: FnOnce(&mut crate::session::SessionState) + Send + 'static,
{
    if let Err(e) = session.update(f).await {
        tracing::warn!(error = %e, "failed to record batch in session state");
    }
}

/// Cancel the batch on Ctrl-C. Aborted once the batch has finished.
async fn cancel_on_interrupt(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("interrupted, cancelling batch");
        cancel.cancel();
    }
}
