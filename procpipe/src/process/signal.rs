//! Signal delivery to running tasks.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::task::TaskState;

/// Control signals a task understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    Stop,
    Continue,
    Interrupt,
    Terminate,
}

impl Signal {
    #[cfg(unix)]
    const fn raw(self) -> libc::c_int {
        match self {
            Self::Stop => libc::SIGSTOP,
            Self::Continue => libc::SIGCONT,
            Self::Interrupt => libc::SIGINT,
            Self::Terminate => libc::SIGTERM,
        }
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn send(pid: u32, signal: Signal) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: kill(2) takes plain integers and touches no memory of ours.
    unsafe { libc::kill(pid, signal.raw()) == 0 }
}

#[cfg(not(unix))]
fn send(_pid: u32, _signal: Signal) -> bool {
    false
}

/// Cloneable handle for signalling a launched task.
///
/// Shares state with the [`Task`](super::Task) it came from, so a timer or
/// another tokio task can stop a process while its owner is blocked in
/// `finish()`. Every operation returns whether the signal was delivered;
/// none of them wait for the process to react.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use procpipe::process::Task;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let mut task = Task::new("sleep").arg("30");
///     task.spawn()?;
///
///     let signals = task.signals().expect("task is running");
///     tokio::spawn(async move {
///         tokio::time::sleep(Duration::from_secs(1)).await;
///         signals.terminate();
///     });
///
///     assert_eq!(task.finish().await?.code(), 15);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct TaskSignals {
    pid: u32,
    state: Arc<Mutex<TaskState>>,
}

impl TaskSignals {
    pub(crate) const fn new(pid: u32, state: Arc<Mutex<TaskState>>) -> Self {
        Self { pid, state }
    }

    /// Process id being signalled.
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Pause the process (SIGSTOP).
    pub fn suspend(&self) -> bool {
        self.deliver(Signal::Stop)
    }

    /// Continue a paused process (SIGCONT).
    pub fn resume(&self) -> bool {
        self.deliver(Signal::Continue)
    }

    /// Ask the process to stop (SIGINT).
    pub fn interrupt(&self) -> bool {
        self.deliver(Signal::Interrupt)
    }

    /// Ask the process to terminate (SIGTERM).
    pub fn terminate(&self) -> bool {
        self.deliver(Signal::Terminate)
    }

    /// Forward every SIGINT received by this process to the task.
    ///
    /// Forwarding stops at the first interrupt that can no longer be
    /// delivered. Abort the returned handle to stop earlier; the parent
    /// keeps ignoring SIGINT's default action for as long as the listener
    /// is registered.
    #[cfg(unix)]
    pub fn forward_interrupts(&self) -> std::io::Result<tokio::task::JoinHandle<()>> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupts = signal(SignalKind::interrupt())?;
        let signals = self.clone();

        Ok(tokio::spawn(async move {
            while interrupts.recv().await.is_some() {
                if !signals.interrupt() {
                    break;
                }
            }
            tracing::debug!(pid = signals.pid, "stopped forwarding interrupts");
        }))
    }

    fn deliver(&self, signal: Signal) -> bool {
        let mut state = lock(&self.state);
        if !state.is_live() {
            tracing::debug!(pid = self.pid, ?signal, state = ?*state, "signal skipped");
            return false;
        }

        let accepted = send(self.pid, signal);
        if accepted {
            match signal {
                Signal::Stop => *state = TaskState::Suspended,
                Signal::Continue => *state = TaskState::Running,
                Signal::Interrupt | Signal::Terminate => {}
            }
        }

        tracing::debug!(pid = self.pid, ?signal, accepted, "delivered signal");
        accepted
    }
}

pub(crate) fn lock(state: &Mutex<TaskState>) -> MutexGuard<'_, TaskState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
