//! External program execution with a deadline and cancellation

use crate::error::{AcquireError, Result};
use std::ffi::OsStr;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Captured result of a finished program
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    /// Last `lines` non-empty lines of stderr
    pub fn stderr_tail(&self, lines: usize) -> String {
        tail(&self.stderr, lines)
    }
}

pub fn tail(text: &str, lines: usize) -> String {
    let kept: Vec<&str> = text
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect();
    let start = kept.len().saturating_sub(lines);
    kept[start..].join("\n")
}

/// Run `program` to completion. The program runs in its own process group,
/// and the whole group is killed when the deadline passes or `cancel` fires.
pub async fn run<I, S>(
    program: &str,
    args: I,
    cwd: Option<&Path>,
    limit: Duration,
    cancel: &CancellationToken,
) -> Result<ProcessOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }
    #[cfg(unix)]
    command.process_group(0);

    debug!(program, timeout_secs = limit.as_secs(), "Starting external program");

    let child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            AcquireError::ProgramNotFound(program.to_string())
        } else {
            AcquireError::io(format!("failed to start {program}"), e)
        }
    })?;
    let pid = child.id();

    // Dropping the wait future drops the child, which kills the leader;
    // kill_group takes care of anything it spawned
    let output = tokio::select! {
        _ = cancel.cancelled() => {
            debug!(program, "Cancelled, killing external program");
            kill_group(program, pid).await;
            return Err(AcquireError::Cancelled);
        }
        waited = tokio::time::timeout(limit, child.wait_with_output()) => match waited {
            Ok(output) => output.map_err(|e| AcquireError::io(format!("failed to wait for {program}"), e))?,
            Err(_) => {
                kill_group(program, pid).await;
                return Err(AcquireError::timeout(program, limit));
            }
        },
    };

    debug!(program, status = ?output.status.code(), "External program finished");

    Ok(ProcessOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// SIGKILL every process in the group led by `pid`
#[cfg(unix)]
async fn kill_group(program: &str, pid: Option<u32>) {
    let Some(pid) = pid else {
        return;
    };
    let status = Command::new("kill")
        .args(["-s", "KILL", "--", &format!("-{pid}")])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match status {
        Ok(status) if status.success() => debug!(program, pid, "Process group killed"),
        // Group already gone
        Ok(_) => {}
        Err(e) => warn!(program, pid, error = %e, "Failed to kill process group"),
    }
}

#[cfg(not(unix))]
async fn kill_group(_program: &str, _pid: Option<u32>) {}
