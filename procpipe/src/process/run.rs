//! One-shot helpers for running a command to completion.

use serde::Serialize;

use super::error::{RunError, StreamError};
use super::status::ExitStatus;
use super::stream::PipeStream;
use super::task::Task;

/// Output captured from a finished command.
///
/// Both streams have exactly one trailing newline stripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureResult {
    pub stdout: String,
    pub stderr: String,
    pub status: ExitStatus,
}

/// Run a command with inherited streams and wait for it.
///
/// A non-zero exit is reported as [`RunError::Failed`].
pub async fn run<I, S>(executable: &str, args: I) -> Result<(), RunError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    run_task(Task::new(executable).args(args)).await
}

/// Run a one-line script through `bash -c`.
pub async fn run_bash(script: &str) -> Result<(), RunError> {
    run_task(Task::bash(script)).await
}

/// Run a prepared task and wait for it, failing on a non-zero exit.
pub async fn run_task(mut task: Task) -> Result<(), RunError> {
    let status = task.run().await?;
    if status.success() {
        Ok(())
    } else {
        Err(RunError::Failed { status })
    }
}

/// Run a command and capture its stdout and stderr.
///
/// # Example
///
/// ```rust,no_run
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let output = procpipe::process::capture("ls", ["/tmp"]).await?;
///     println!("{}", output.stdout);
///     Ok(())
/// }
/// ```
pub async fn capture<I, S>(executable: &str, args: I) -> Result<CaptureResult, RunError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    capture_task(Task::new(executable).args(args)).await
}

/// Capture the output of a one-line script run through `bash -c`.
pub async fn capture_bash(script: &str) -> Result<CaptureResult, RunError> {
    capture_task(Task::bash(script)).await
}

/// Capture a prepared task's stdout and stderr.
///
/// Any stdout/stderr assignment on `task` is replaced. Both pipes are
/// drained while waiting for the process, so large output on either
/// stream cannot stall it.
pub async fn capture_task(task: Task) -> Result<CaptureResult, RunError> {
    let stdout = PipeStream::new().map_err(StreamError::from)?;
    let stderr = PipeStream::new().map_err(StreamError::from)?;

    let mut task = task.stdout(stdout.clone()).stderr(stderr.clone());
    task.spawn()?;

    let (status, out, err) = tokio::join!(
        task.finish(),
        stdout.read_trimmed(),
        stderr.read_trimmed()
    );

    let result = CaptureResult {
        stdout: out?,
        stderr: err?,
        status: status?,
    };

    if result.status.success() {
        Ok(result)
    } else {
        Err(RunError::CaptureFailed { result })
    }
}
