//! Error types for process execution.

use std::io;

use thiserror::Error;

use super::run::CaptureResult;
use super::status::ExitStatus;

/// Failure to launch or wait on a [`Task`](super::Task).
#[derive(Debug, Error)]
pub enum TaskError {
    /// The executable could not be located on `PATH` or at the given path.
    #[error("executable not found: {name}")]
    ExecutableNotFound { name: String },

    /// The OS refused to create the process.
    #[error("failed to spawn process: {executable}")]
    Spawn {
        executable: String,
        #[source]
        source: io::Error,
    },

    /// A stream endpoint could not be opened for the child.
    #[error("failed to open {stream} for {executable}")]
    Stream {
        stream: &'static str,
        executable: String,
        #[source]
        source: io::Error,
    },

    /// A pipe end or line stream was already handed to another process.
    #[error("{stream} stream is already attached to a process")]
    StreamClaimed { stream: &'static str },

    /// The task was already launched; tasks never re-execute.
    #[error("task has already been launched")]
    AlreadyLaunched,

    /// `finish` was called on a task that was never launched.
    #[error("task has not been launched")]
    NotLaunched,

    /// The OS wait call failed.
    #[error("failed to wait for process to exit")]
    Wait {
        #[source]
        source: io::Error,
    },
}

/// Failure while reading from or writing to a stream.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The write end was closed or handed to a child process.
    #[error("write end of pipe is closed")]
    WriteClosed,

    #[error(transparent)]
    Io(#[from] io::Error),

    /// The background reader panicked or was cancelled.
    #[error("stream reader failed")]
    Worker(#[from] tokio::task::JoinError),
}

/// Failure of the one-shot `run`/`capture` helpers.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    /// The command ran but did not exit successfully.
    #[error("command failed with {status}")]
    Failed { status: ExitStatus },

    /// The command ran but did not exit successfully; output is kept.
    #[error("command failed with {}: {}", .result.status, .result.stderr)]
    CaptureFailed { result: CaptureResult },
}

impl RunError {
    /// Exit status of the failed command, if it got as far as running.
    pub const fn status(&self) -> Option<ExitStatus> {
        match self {
            Self::Failed { status } => Some(*status),
            Self::CaptureFailed { result } => Some(result.status),
            Self::Task(_) | Self::Stream(_) => None,
        }
    }
}
