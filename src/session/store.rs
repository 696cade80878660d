//! File-backed session state with a one-generation backup.
//!
//! `save` renames the current file to `<name>.backup` before writing the new
//! state through a temp file. `load` never fails: a missing or corrupt file
//! yields a default state (the backup is left for a human to inspect).
//!
//! Read-modify-write cycles are bracketed by [`StateStore::lock`], an
//! exclusive `flock` on `<name>.lock`, so separate hook processes do not
//! overwrite each other's updates.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use nix::fcntl::{Flock, FlockArg};

use super::state::SessionState;
use crate::config::AppConfig;
use crate::error::StateError;

pub struct StateStore {
    path: PathBuf,
    hook_log_limit: usize,
    review_retention: Duration,
}

/// Held for the duration of a read-modify-write. Unlocks on drop.
pub struct StateLock {
    _flock: Flock<File>,
}

impl StateStore {
    pub fn new(path: PathBuf, hook_log_limit: usize, review_retention: Duration) -> Self {
        Self {
            path,
            hook_log_limit,
            review_retention,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.state_path.clone(),
            config.hook_log_limit,
            Duration::seconds(config.review_retention_secs as i64),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        sibling_with_suffix(&self.path, "backup")
    }

    fn lock_path(&self) -> PathBuf {
        sibling_with_suffix(&self.path, "lock")
    }

    /// Read the state file, falling back to defaults on any problem.
    pub fn load(&self) -> SessionState {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str::<SessionState>(&contents) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "session state is corrupt, starting from defaults"
                    );
                    SessionState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no session state yet, using defaults");
                SessionState::default()
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to read session state, using defaults"
                );
                SessionState::default()
            }
        }
    }

    /// Prune, back up the previous file, and write `state`.
    ///
    /// `state` is pruned in place so the caller's copy matches what was
    /// written.
    pub fn save(&self, state: &mut SessionState) -> Result<(), StateError> {
        let pruned = state.prune_stale_reviews(Utc::now(), self.review_retention);
        if pruned > 0 {
            tracing::debug!(pruned, "dropped stale reviews");
        }
        state.cap_hook_log(self.hook_log_limit);

        let json = serde_json::to_string_pretty(state)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StateError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        if self.path.exists() {
            let backup = self.backup_path();
            std::fs::rename(&self.path, &backup).map_err(|source| StateError::Io {
                path: backup.clone(),
                source,
            })?;
        }

        let tmp = sibling_with_suffix(&self.path, "tmp");
        std::fs::write(&tmp, json)
            .and_then(|()| std::fs::File::open(&tmp)?.sync_all())
            .map_err(|source| StateError::Io {
                path: tmp.clone(),
                source,
            })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| StateError::Io {
            path: self.path.clone(),
            source,
        })?;

        Ok(())
    }

    /// Take the cross-process state lock, blocking until it is free.
    ///
    /// Returns `None` (after a warning) if the lock file cannot be opened or
    /// locked; callers then proceed unlocked.
    pub fn lock(&self) -> Option<StateLock> {
        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let file = match OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
        {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(path = %lock_path.display(), error = %e, "cannot open state lock file");
                return None;
            }
        };

        match Flock::lock(file, FlockArg::LockExclusive) {
            Ok(flock) => Some(StateLock { _flock: flock }),
            Err((_, errno)) => {
                tracing::warn!(path = %lock_path.display(), error = %errno, "cannot lock session state");
                None
            }
        }
    }
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}
