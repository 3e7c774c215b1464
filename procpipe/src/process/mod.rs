//! Child process execution and piping.
//!
//! This module provides:
//! - [`Task`]: one child process with configurable stdio, launched once
//! - [`Input`]/[`Output`]: stream assignments, inheriting by default
//! - [`PipeStream`] and [`LineStream`]: buffered and line-by-line sinks
//! - [`pipeline()`]: two tasks joined through one pipe
//! - [`find_executable`]: `PATH` lookup
//! - [`run`]/[`capture`]: one-shot helpers

mod error;
mod pipeline;
mod resolve;
mod run;
mod signal;
mod status;
mod stream;
mod task;

pub use error::{RunError, StreamError, TaskError};
pub use pipeline::pipeline;
pub use resolve::{find_executable, find_executable_in};
pub use run::{capture, capture_bash, capture_task, run, run_bash, run_task, CaptureResult};
pub use signal::TaskSignals;
pub use status::ExitStatus;
pub use stream::{Input, LineConsumer, LineStream, Output, PipeStream};
pub use task::{Task, TaskState};
