//! External process execution with a wall-clock timeout.
//!
//! Every process is started in its own process group so a timeout can take
//! down the whole tree (the process plus anything it forked) with one
//! `killpg`.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::error::ExecError;

/// How long to wait for pipe readers after the process group was killed.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Result of an external command execution.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Run `argv[0]` with the remaining arguments in `cwd`, killing its process
/// group if it does not finish within `timeout_secs`.
///
/// A missing program is reported as [`ExecError::NotFound`] so callers can
/// tell it apart from other spawn failures. Timeouts are not errors: they
/// come back as an [`ExecResult`] with `timed_out` set.
pub async fn execute_command(
    argv: &[String],
    cwd: &Path,
    timeout_secs: u64,
) -> Result<ExecResult, ExecError> {
    let (program, args) = argv.split_first().ok_or(ExecError::EmptyCommand)?;

    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .process_group(0)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExecError::NotFound(program.clone())
            } else {
                ExecError::SpawnFailed(e.to_string())
            }
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ExecError::SpawnFailed("failed to capture stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ExecError::SpawnFailed("failed to capture stderr".into()))?;

    let stdout_task = tokio::spawn(read_all(stdout));
    let stderr_task = tokio::spawn(read_all(stderr));

    let (exit_code, timed_out) =
        match tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait()).await {
            Ok(Ok(status)) => (status.code(), false),
            Ok(Err(e)) => return Err(ExecError::ProcessFailed(e.to_string())),
            Err(_) => {
                if let Some(pid) = child.id() {
                    kill_process_group(pid);
                }
                // Reap the child to prevent zombies.
                let _ = child.wait().await;
                (None, true)
            }
        };

    let stdout = tokio::time::timeout(PIPE_DRAIN_GRACE, stdout_task)
        .await
        .ok()
        .and_then(Result::ok)
        .unwrap_or_default();
    let stderr = tokio::time::timeout(PIPE_DRAIN_GRACE, stderr_task)
        .await
        .ok()
        .and_then(Result::ok)
        .unwrap_or_default();

    Ok(ExecResult {
        stdout,
        stderr,
        exit_code,
        timed_out,
    })
}

/// Send SIGKILL to the process group led by `pid`.
///
/// Only valid for children spawned with `process_group(0)`, whose pgid is
/// their own pid.
pub fn kill_process_group(pid: u32) {
    let pgid = nix::unistd::Pid::from_raw(pid as i32);
    if let Err(e) = nix::sys::signal::killpg(pgid, nix::sys::signal::Signal::SIGKILL) {
        tracing::debug!(pid, error = %e, "killpg failed (process group already gone?)");
    }
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut buf = Vec::new();
    let _ = reader.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}
