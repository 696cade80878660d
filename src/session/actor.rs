//! Single-writer access to the session state.
//!
//! All reads and writes go through one blocking task that owns the
//! [`StateStore`]. Each update takes the cross-process lock, reloads from
//! disk, applies the mutation, and saves before acknowledging, so concurrent
//! callers in this process and in other hook processes never lose updates.

use tokio::sync::{mpsc, oneshot};

use super::archive::{ArchiveEntry, append_entry};
use super::state::SessionState;
use super::store::StateStore;
use crate::error::StateError;

type Mutation = Box<dyn FnOnce(&mut SessionState) + Send>;

enum Command {
    Snapshot {
        reply: oneshot::Sender<SessionState>,
    },
    Update {
        apply: Mutation,
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to the session state actor.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    /// Start the actor on the blocking pool. It stops when the last handle
    /// is dropped.
    pub fn spawn(store: StateStore) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::task::spawn_blocking(move || run(store, rx));
        Self { tx }
    }

    /// The state as currently on disk.
    pub async fn snapshot(&self) -> Result<SessionState, StateError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Snapshot { reply })
            .map_err(|_| StateError::ActorGone)?;
        rx.await.map_err(|_| StateError::ActorGone)
    }

    /// Apply `f` to the freshly loaded state and persist the result.
    ///
    /// Resolves only after the save was attempted. A failed save is logged
    /// by the actor and the value `f` produced is still returned, so callers
    /// carry on with the in-memory result.
    pub async fn update<F, R>(&self, f: F) -> Result<R, StateError>
    where
        F: FnOnce(&mut SessionState) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (value_tx, value_rx) = oneshot::channel();
        let apply: Mutation = Box::new(move |state| {
            let _ = value_tx.send(f(state));
        });

        let (reply, ack) = oneshot::channel();
        self.tx
            .send(Command::Update { apply, reply })
            .map_err(|_| StateError::ActorGone)?;

        ack.await.map_err(|_| StateError::ActorGone)?;
        value_rx.await.map_err(|_| StateError::ActorGone)
    }

    /// Archive a summary of the current session, then start a fresh one
    /// that keeps the statistics and pending reviews.
    ///
    /// Returns the state as it was before the reset.
    pub async fn end_session(
        &self,
        archive_dir: std::path::PathBuf,
    ) -> Result<SessionState, StateError> {
        self.update(move |state| {
            let ended = state.clone();
            append_entry(&archive_dir, &ArchiveEntry::session_summary(&ended));
            state.reset_preserving_stats();
            ended
        })
        .await
    }
}

fn run(store: StateStore, mut rx: mpsc::UnboundedReceiver<Command>) {
    tracing::debug!(path = %store.path().display(), "session state actor started");

    while let Some(command) = rx.blocking_recv() {
        match command {
            Command::Snapshot { reply } => {
                // A writer in another process briefly has no live file
                // between its two renames.
                let _lock = store.lock();
                let _ = reply.send(store.load());
            }
            Command::Update { apply, reply } => {
                let _lock = store.lock();
                let mut state = store.load();
                apply(&mut state);
                state.touch();

                if let Err(e) = store.save(&mut state) {
                    tracing::warn!(error = %e, "failed to save session state");
                }
                let _ = reply.send(());
            }
        }
    }

    tracing::debug!("session state actor stopped");
}
