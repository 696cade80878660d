//! Append-only JSONL archive of finished sessions and batches.
//!
//! Every entry is one JSON object per line in `{archive_dir}/sessions.jsonl`,
//! tagged with `event_type` so each line is self-describing.
//!
//! Uses synchronous `std::fs` since writes are small and flushed after each
//! entry.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;

use super::state::{ReviewStatus, SessionState};

const ARCHIVE_FILE: &str = "sessions.jsonl";

/// Returns the current UTC time as an ISO 8601 string with milliseconds.
fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[derive(Debug, Serialize)]
#[serde(tag = "event_type")]
pub enum ArchiveEntry {
    /// Written by `end_session` before the state is reset.
    #[serde(rename = "session_summary")]
    SessionSummary {
        timestamp: String,
        session_id: String,
        session_start: String,
        total_tasks_completed: u64,
        delegated_to_glm: usize,
        delegated_to_codex: usize,
        glm_failures: u32,
        codex_failures: u32,
        reviews_pending: usize,
        reviews_completed: usize,
        reviews_failed: usize,
        hooks_executed: usize,
    },

    /// Written once a batch proposal exists.
    #[serde(rename = "batch_finished")]
    BatchFinished {
        timestamp: String,
        batch_id: String,
        status: String,
        total_tasks: usize,
        safe_changes: usize,
        risky_changes: usize,
        conflicts: usize,
        proposal: String,
    },
}

impl ArchiveEntry {
    pub fn session_summary(state: &SessionState) -> Self {
        let count = |status: ReviewStatus| {
            state
                .pending_reviews
                .iter()
                .filter(|r| r.status == status)
                .count()
        };

        ArchiveEntry::SessionSummary {
            timestamp: now_iso(),
            session_id: state.session_id.clone(),
            session_start: state.session_start.clone(),
            total_tasks_completed: state.total_tasks_completed,
            delegated_to_glm: state.delegated_to_glm.len(),
            delegated_to_codex: state.delegated_to_codex.len(),
            glm_failures: state.glm_failures,
            codex_failures: state.codex_failures,
            reviews_pending: count(ReviewStatus::Pending),
            reviews_completed: count(ReviewStatus::Completed),
            reviews_failed: count(ReviewStatus::Failed),
            hooks_executed: state.hooks_executed.len(),
        }
    }

    pub fn batch_finished(
        batch_id: &str,
        status: &str,
        total_tasks: usize,
        safe_changes: usize,
        risky_changes: usize,
        conflicts: usize,
        proposal: &Path,
    ) -> Self {
        ArchiveEntry::BatchFinished {
            timestamp: now_iso(),
            batch_id: batch_id.to_string(),
            status: status.to_string(),
            total_tasks,
            safe_changes,
            risky_changes,
            conflicts,
            proposal: proposal.display().to_string(),
        }
    }
}

/// Append-only JSONL writer for [`ArchiveEntry`] values.
pub struct SessionArchive {
    writer: BufWriter<fs::File>,
    path: PathBuf,
}

impl SessionArchive {
    /// Open (creating if needed) `{archive_dir}/sessions.jsonl` for appending.
    pub fn open(archive_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(archive_dir)?;
        let path = archive_dir.join(ARCHIVE_FILE);

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            writer: BufWriter::new(file),
            path,
        })
    }

    /// Serialize an entry as a single JSON line and flush.
    pub fn append(&mut self, entry: &ArchiveEntry) -> anyhow::Result<()> {
        serde_json::to_writer(&mut self.writer, entry)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Open the archive, append one entry, and log (not propagate) failures.
pub fn append_entry(archive_dir: &Path, entry: &ArchiveEntry) {
    let result = SessionArchive::open(archive_dir).and_then(|mut archive| archive.append(entry));
    if let Err(e) = result {
        tracing::warn!(dir = %archive_dir.display(), error = %e, "failed to write archive entry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::state::Review;
    use std::io::BufRead;
    use tempfile::TempDir;

    fn read_lines(path: &Path) -> Vec<serde_json::Value> {
        let file = fs::File::open(path).expect("open archive");
        std::io::BufReader::new(file)
            .lines()
            .map(|l| serde_json::from_str(&l.unwrap()).expect("valid JSON"))
            .collect()
    }

    #[test]
    fn session_summary_counts_reviews_by_status() {
        let mut state = SessionState {
            total_tasks_completed: 4,
            glm_failures: 1,
            ..Default::default()
        };
        state.pending_reviews.push(Review::pending("a.py", "glm", "claude"));
        let mut done = Review::pending("b.py", "codex", "glm");
        done.status = ReviewStatus::Completed;
        state.pending_reviews.push(done);
        state.record_hook("session-tracker", "end_session");

        let tmp = TempDir::new().unwrap();
        let mut archive = SessionArchive::open(tmp.path()).unwrap();
        archive.append(&ArchiveEntry::session_summary(&state)).unwrap();

        let lines = read_lines(archive.path());
        assert_eq!(lines.len(), 1);
        let entry = &lines[0];
        assert_eq!(entry["event_type"], "session_summary");
        assert_eq!(entry["session_id"], state.session_id.as_str());
        assert_eq!(entry["total_tasks_completed"], 4);
        assert_eq!(entry["glm_failures"], 1);
        assert_eq!(entry["reviews_pending"], 1);
        assert_eq!(entry["reviews_completed"], 1);
        assert_eq!(entry["reviews_failed"], 0);
        assert_eq!(entry["hooks_executed"], 1);
    }

    #[test]
    fn entries_append_across_opens() {
        let tmp = TempDir::new().unwrap();
        let proposal = tmp.path().join("proposal.json");

        append_entry(
            tmp.path(),
            &ArchiveEntry::batch_finished("20260101_000000", "completed", 3, 2, 1, 0, &proposal),
        );
        append_entry(
            tmp.path(),
            &ArchiveEntry::batch_finished("20260101_000001", "timed_out", 1, 0, 0, 0, &proposal),
        );

        let lines = read_lines(&tmp.path().join(ARCHIVE_FILE));
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event_type"], "batch_finished");
        assert_eq!(lines[0]["safe_changes"], 2);
        assert_eq!(lines[1]["status"], "timed_out");
    }
}
