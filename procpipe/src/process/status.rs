//! Exit status of a finished child process.

use serde::Serialize;
use std::fmt;

/// How a child process terminated.
///
/// Once observed a status never changes. A process killed by a signal
/// reports the raw signal number, not the shell's `128 + n` encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ExitStatus {
    /// The process called `exit` with this code.
    Exited(i32),
    /// The process was terminated by this signal.
    Signaled(i32),
}

impl ExitStatus {
    /// Exit code, or the raw signal number for signal-terminated processes.
    pub const fn code(self) -> i32 {
        match self {
            Self::Exited(code) | Self::Signaled(code) => code,
        }
    }

    /// Check if the process exited normally with status 0.
    pub const fn success(self) -> bool {
        matches!(self, Self::Exited(0))
    }

    /// The terminating signal, if any.
    pub const fn signal(self) -> Option<i32> {
        match self {
            Self::Signaled(signal) => Some(signal),
            Self::Exited(_) => None,
        }
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    #[cfg(unix)]
    fn from(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        match (status.code(), status.signal()) {
            (Some(code), _) => Self::Exited(code),
            (None, Some(signal)) => Self::Signaled(signal),
            // Stopped/continued statuses are never produced by wait(),
            // which only reports terminations.
            (None, None) => Self::Exited(status.into_raw()),
        }
    }

    #[cfg(not(unix))]
    fn from(status: std::process::ExitStatus) -> Self {
        Self::Exited(status.code().unwrap_or(1))
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exit status {code}"),
            Self::Signaled(signal) => write!(f, "terminated by signal {signal}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_for_signal_is_raw_number() {
        assert_eq!(ExitStatus::Signaled(15).code(), 15);
        assert_eq!(ExitStatus::Signaled(15).signal(), Some(15));
        assert!(!ExitStatus::Signaled(2).success());
    }

    #[test]
    fn test_success() {
        assert!(ExitStatus::Exited(0).success());
        assert!(!ExitStatus::Exited(1).success());
        assert_eq!(ExitStatus::Exited(42).signal(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_from_std_status() {
        use std::os::unix::process::ExitStatusExt;

        // wait(2) encoding: exit code in the high byte, signal in the low bits.
        assert_eq!(
            ExitStatus::from(std::process::ExitStatus::from_raw(3 << 8)),
            ExitStatus::Exited(3)
        );
        assert_eq!(
            ExitStatus::from(std::process::ExitStatus::from_raw(libc::SIGTERM)),
            ExitStatus::Signaled(15)
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitStatus::Exited(1).to_string(), "exit status 1");
        assert_eq!(
            ExitStatus::Signaled(9).to_string(),
            "terminated by signal 9"
        );
    }

    #[test]
    fn test_serialize() {
        let json = serde_json::to_string(&ExitStatus::Exited(0)).unwrap();
        assert_eq!(json, r#"{"kind":"exited","value":0}"#);
    }
}
