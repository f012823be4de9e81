use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::JobFailure;

/// Execution seam between the worker pool and the outside world.
///
/// The pool only sees this trait, so tests inject scripted executors to
/// force failure sequences without spawning processes.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run a command to completion under a hard wall-clock deadline
    async fn run(&self, command: &str, timeout: Duration) -> Result<(), JobFailure>;
}

/// Runs job commands through `sh -c` with captured output.
///
/// A command that outlives the deadline is killed (`kill_on_drop`) and
/// reported as a timeout failure; a nonzero exit becomes an execution
/// failure carrying stderr, stdout, or the exit code as detail.
pub struct ShellExecutor;

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn run(&self, command: &str, timeout: Duration) -> Result<(), JobFailure> {
        debug!(command, timeout_secs = timeout.as_secs(), "executing command");

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| JobFailure::failed(format!("failed to spawn command: {e}")))?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            // Dropping the child on the timeout path kills the process
            Err(_) => return Err(JobFailure::TimedOut(timeout.as_secs())),
            Ok(Err(e)) => return Err(JobFailure::failed(format!("execution error: {e}"))),
            Ok(Ok(output)) => output,
        };

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = if !stderr.trim().is_empty() {
            stderr.trim().to_string()
        } else if !stdout.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            format!(
                "command failed with exit code {}",
                output.status.code().unwrap_or(-1)
            )
        };
        Err(JobFailure::Failed(detail))
    }
}
