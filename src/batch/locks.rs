//! Per-file exclusive leases for edit-producing tasks.
//!
//! Each declared path maps to its own async mutex. A task holding a
//! [`FileLease`] owns every file it declared until the lease is dropped.
//! Leases are acquired in sorted path order so two tasks with overlapping
//! file sets cannot deadlock each other.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Shared table of per-file locks. Cheap to clone.
#[derive(Clone, Default)]
pub struct FileLocks {
    table: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

/// Exclusive ownership of a set of files. Released on drop.
pub struct FileLease {
    files: Vec<String>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl FileLease {
    pub fn files(&self) -> &[String] {
        &self.files
    }
}

impl FileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until every file in `files` is free, then lease them all.
    pub async fn acquire(&self, files: &[String]) -> FileLease {
        let ordered: BTreeSet<&String> = files.iter().collect();

        let mut guards = Vec::with_capacity(ordered.len());
        for file in &ordered {
            let lock = self.lock_for(file);
            guards.push(lock.lock_owned().await);
        }

        FileLease {
            files: ordered.into_iter().cloned().collect(),
            _guards: guards,
        }
    }

    /// Lease `files` only if none of them is currently held.
    pub fn try_acquire(&self, files: &[String]) -> Option<FileLease> {
        let ordered: BTreeSet<&String> = files.iter().collect();

        let mut guards = Vec::with_capacity(ordered.len());
        for file in &ordered {
            guards.push(self.lock_for(file).try_lock_owned().ok()?);
        }

        Some(FileLease {
            files: ordered.into_iter().cloned().collect(),
            _guards: guards,
        })
    }

    fn lock_for(&self, file: &str) -> Arc<AsyncMutex<()>> {
        let mut table = self.table.lock().unwrap();
        table
            .entry(file.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}
