//! A single managed child process.
//!
//! A [`Task`] is configured with the same builder calls a process options
//! struct would take, then launched exactly once with [`Task::run`] (wait
//! for exit) or [`Task::spawn`] (return immediately). Stream assignments are
//! resolved to OS descriptors at launch.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::process::{Child, Command};

use super::error::TaskError;
use super::resolve::find_executable_in;
use super::signal::{lock, TaskSignals};
use super::status::ExitStatus;
use super::stream::{Channel, Claims, Input, Output};

/// Lifecycle of a task.
///
/// `Created -> Running <-> Suspended -> Exited`. `Exited` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Running,
    Suspended,
    Exited(ExitStatus),
}

impl TaskState {
    /// Launched and not yet observed to exit.
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Running | Self::Suspended)
    }
}

/// A child process with its configuration and stream wiring.
///
/// # Example
///
/// ```rust,no_run
/// use procpipe::process::{PipeStream, Task};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let output = PipeStream::new()?;
///     let mut echo = Task::new("bash")
///         .args(["-c", "echo $GREETING"])
///         .env("GREETING", "hello")
///         .stdout(output.clone());
///
///     let status = echo.run().await?;
///     assert!(status.success());
///     assert_eq!(output.read_all().await?, "hello\n");
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Task {
    executable: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    current_dir: Option<PathBuf>,
    stdin: Input,
    stdout: Output,
    stderr: Output,
    child: Option<Child>,
    pid: Option<u32>,
    state: Arc<Mutex<TaskState>>,
}

impl Task {
    /// Create a task for the given executable name or path.
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            env: HashMap::new(),
            current_dir: None,
            stdin: Input::Inherit,
            stdout: Output::Inherit,
            stderr: Output::Inherit,
            child: None,
            pid: None,
            state: Arc::new(Mutex::new(TaskState::Created)),
        }
    }

    /// Create a task that runs a one-line script with `bash -c`.
    pub fn bash(script: impl Into<String>) -> Self {
        Self::new("bash").arg("-c").arg(script)
    }

    /// Add an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable on top of the inherited environment.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set multiple environment variables.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in vars {
            self.env.insert(k.into(), v.into());
        }
        self
    }

    /// Set the working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Set where stdin comes from.
    ///
    /// A [`PipeStream`](super::PipeStream) read end is reserved for this
    /// task from here on, so a producer launched first leaves it alone.
    pub fn stdin(mut self, input: impl Into<Input>) -> Self {
        self.stdin = input.into();
        if let Input::Pipe(pipe) = &self.stdin {
            pipe.reserve_reader();
        }
        self
    }

    /// Set where stdout goes.
    pub fn stdout(mut self, output: impl Into<Output>) -> Self {
        self.stdout = output.into();
        self
    }

    /// Set where stderr goes.
    pub fn stderr(mut self, output: impl Into<Output>) -> Self {
        self.stderr = output.into();
        self
    }

    /// Executable name or path as given, before resolution.
    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// Arguments passed after the executable.
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        *lock(&self.state)
    }

    /// Exit status, once observed.
    pub fn status(&self) -> Option<ExitStatus> {
        match self.state() {
            TaskState::Exited(status) => Some(status),
            _ => None,
        }
    }

    /// Process id of the launched child.
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Launch the process and wait for it to exit.
    pub async fn run(&mut self) -> Result<ExitStatus, TaskError> {
        self.spawn()?;
        self.finish().await
    }

    /// Launch the process without waiting.
    ///
    /// Must be called from within a tokio runtime. Output assigned to a
    /// [`LineStream`](super::LineStream), or to a
    /// [`PipeStream`](super::PipeStream) whose read end no consumer task
    /// reserved, starts draining immediately. If the launch fails, every
    /// stream endpoint goes back to its stream and the task stays
    /// `Created`.
    pub fn spawn(&mut self) -> Result<(), TaskError> {
        if self.state() != TaskState::Created {
            return Err(TaskError::AlreadyLaunched);
        }

        let program = self.resolve()?;
        let mut claims = Claims::default();
        let cmd = match self.command(&program, &mut claims) {
            Ok(cmd) => cmd,
            Err(e) => {
                claims.release();
                return Err(e);
            }
        };

        // The command holds copies of the pipe ends and is dropped at the end
        // of this statement; readers only see EOF after that.
        let spawned = Command::from(cmd).spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(source) => {
                claims.release();
                return Err(TaskError::Spawn {
                    executable: self.executable.clone(),
                    source,
                });
            }
        };
        claims.commit(&mut child);

        self.pid = child.id();
        self.child = Some(child);
        *lock(&self.state) = TaskState::Running;

        tracing::debug!(
            pid = self.pid,
            executable = %program.display(),
            args = ?self.args,
            "spawned process"
        );
        Ok(())
    }

    /// Wait for the process to exit.
    ///
    /// Once the exit has been observed this returns the same status again
    /// without waiting.
    pub async fn finish(&mut self) -> Result<ExitStatus, TaskError> {
        if let TaskState::Exited(status) = self.state() {
            return Ok(status);
        }

        let child = self.child.as_mut().ok_or(TaskError::NotLaunched)?;
        let status = child
            .wait()
            .await
            .map_err(|source| TaskError::Wait { source })?;

        Ok(self.observe(status.into()))
    }

    /// Whether the process has been launched and not yet seen to exit.
    ///
    /// Polls the child, so an exit that happened since the last call is
    /// recorded. A suspended process counts as running.
    pub fn is_running(&mut self) -> bool {
        if !self.state().is_live() {
            return false;
        }
        let Some(child) = self.child.as_mut() else {
            return false;
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                self.observe(status.into());
                false
            }
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(pid = self.pid, error = %e, "failed to poll process");
                true
            }
        }
    }

    /// Handle for signalling the process from elsewhere.
    ///
    /// `None` until the task has been launched.
    pub fn signals(&self) -> Option<TaskSignals> {
        self.pid.map(|pid| TaskSignals::new(pid, self.state.clone()))
    }

    /// Pause the process. See [`TaskSignals::suspend`].
    pub fn suspend(&self) -> bool {
        self.signals().is_some_and(|signals| signals.suspend())
    }

    /// Continue a paused process. See [`TaskSignals::resume`].
    pub fn resume(&self) -> bool {
        self.signals().is_some_and(|signals| signals.resume())
    }

    /// Send SIGINT. See [`TaskSignals::interrupt`].
    pub fn interrupt(&self) -> bool {
        self.signals().is_some_and(|signals| signals.interrupt())
    }

    /// Send SIGTERM. See [`TaskSignals::terminate`].
    pub fn terminate(&self) -> bool {
        self.signals().is_some_and(|signals| signals.terminate())
    }

    /// Replace the current process with this task's command.
    ///
    /// Only returns if the exec failed. Line streams have no reader once the
    /// current process is gone, so they are rejected.
    #[cfg(unix)]
    pub fn exec(self) -> TaskError {
        use std::os::unix::process::CommandExt;

        for (name, output) in [("stdout", &self.stdout), ("stderr", &self.stderr)] {
            if matches!(output, Output::Line(_)) {
                return TaskError::Stream {
                    stream: name,
                    executable: self.executable.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::Unsupported,
                        "line streams cannot be used with exec",
                    ),
                };
            }
        }

        let program = match self.resolve() {
            Ok(program) => program,
            Err(e) => return e,
        };
        let mut claims = Claims::default();
        let mut cmd = match self.command(&program, &mut claims) {
            Ok(cmd) => cmd,
            Err(e) => {
                claims.release();
                return e;
            }
        };

        tracing::debug!(executable = %program.display(), "replacing process image");
        let source = cmd.exec();
        drop(cmd);
        claims.release();
        TaskError::Spawn {
            executable: self.executable,
            source,
        }
    }

    fn resolve(&self) -> Result<PathBuf, TaskError> {
        let search_path = self
            .env
            .get("PATH")
            .map(OsString::from)
            .or_else(|| std::env::var_os("PATH"))
            .unwrap_or_default();

        let found = find_executable_in(&self.executable, &search_path).ok_or_else(|| {
            TaskError::ExecutableNotFound {
                name: self.executable.clone(),
            }
        })?;

        // A relative path names a file relative to our cwd, not the child's.
        std::path::absolute(&found).map_err(|source| TaskError::Spawn {
            executable: self.executable.clone(),
            source,
        })
    }

    fn command(
        &self,
        program: &Path,
        claims: &mut Claims,
    ) -> Result<std::process::Command, TaskError> {
        let mut cmd = std::process::Command::new(program);
        cmd.args(&self.args);

        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }

        cmd.envs(&self.env);

        cmd.stdin(self.stdin.to_stdio(&self.executable, claims)?);
        cmd.stdout(self.stdout.to_stdio(Channel::Stdout, &self.executable, claims)?);
        cmd.stderr(self.stderr.to_stdio(Channel::Stderr, &self.executable, claims)?);

        Ok(cmd)
    }

    fn observe(&mut self, status: ExitStatus) -> ExitStatus {
        *lock(&self.state) = TaskState::Exited(status);
        self.child = None;
        tracing::debug!(pid = self.pid, %status, "process exited");
        status
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.executable)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
