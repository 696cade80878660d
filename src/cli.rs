use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "baton",
    version,
    about = "Parallel agent batch coordinator and cross-agent review gate"
)]
pub struct Cli {
    /// Path to config file (replaces the global config file)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Workspace directory the batch and session state belong to
    #[arg(short, long, global = true)]
    pub workspace: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse a batch request, run one worker per task, and emit a proposal
    Batch {
        /// Request such as: review "fix auth" src/auth.py AND test src/auth.py
        request: String,

        /// Worker executable invoked once per task
        #[arg(long)]
        worker: Option<PathBuf>,

        /// Seconds to wait for all workers before failing the batch
        #[arg(long)]
        deadline: Option<u64>,

        /// Directory where batch manifests, outputs, and proposals are written
        #[arg(long)]
        output_root: Option<PathBuf>,
    },
    /// Run a hook: reads a JSON event on stdin, answers on stdout/exit code
    Hook {
        #[arg(value_enum)]
        kind: HookKind,
    },
    /// Inspect or reset the persisted session state
    State {
        #[command(subcommand)]
        action: StateAction,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookKind {
    /// Assign and run a cross-agent review for an edited file
    ReviewGate,
    /// Record task, delegation, and session lifecycle events
    SessionTracker,
}

#[derive(Subcommand, Debug)]
pub enum StateAction {
    /// Print the current session state as JSON
    Show,
    /// Archive the current session and start a new one, keeping statistics
    Reset,
}
