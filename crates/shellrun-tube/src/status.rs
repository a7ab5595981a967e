//! Terminal disposition of a process

use std::fmt;
use std::os::unix::process::ExitStatusExt;

use nix::sys::signal::Signal;
use serde::Serialize;

/// How a process terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ExitStatus {
    /// Normal exit with a status code
    Exited(i32),
    /// Terminated by a signal
    Signaled(i32),
}

impl ExitStatus {
    /// Exit code, if the process exited normally
    pub fn code(&self) -> Option<i32> {
        match self {
            ExitStatus::Exited(code) => Some(*code),
            ExitStatus::Signaled(_) => None,
        }
    }

    /// Terminating signal number, if any
    pub fn signal(&self) -> Option<i32> {
        match self {
            ExitStatus::Exited(_) => None,
            ExitStatus::Signaled(sig) => Some(*sig),
        }
    }

    pub fn success(&self) -> bool {
        *self == ExitStatus::Exited(0)
    }

    /// Single integer form: the exit code, or the negated signal number
    pub fn poll_code(&self) -> i32 {
        match self {
            ExitStatus::Exited(code) => *code,
            ExitStatus::Signaled(sig) => -sig,
        }
    }

    /// Shell convention: 128 + signal for signaled processes
    pub fn shell_code(&self) -> i32 {
        match self {
            ExitStatus::Exited(code) => *code,
            ExitStatus::Signaled(sig) => 128 + sig,
        }
    }

    /// Name of the terminating signal, e.g. `SIGSEGV`
    pub fn signal_name(&self) -> Option<&'static str> {
        self.signal()
            .and_then(|sig| Signal::try_from(sig).ok())
            .map(|sig| sig.as_str())
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            ExitStatus::Exited(code)
        } else if let Some(sig) = status.signal() {
            ExitStatus::Signaled(sig)
        } else {
            ExitStatus::Exited(status.into_raw())
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Exited(code) => write!(f, "exited with code {}", code),
            ExitStatus::Signaled(sig) => match self.signal_name() {
                Some(name) => write!(f, "killed by signal {} ({})", name, sig),
                None => write!(f, "killed by signal {}", sig),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exited_accessors() {
        let status = ExitStatus::Exited(3);
        assert_eq!(status.code(), Some(3));
        assert_eq!(status.signal(), None);
        assert_eq!(status.poll_code(), 3);
        assert!(!status.success());
        assert!(ExitStatus::Exited(0).success());
    }

    #[test]
    fn signaled_accessors() {
        let status = ExitStatus::Signaled(11);
        assert_eq!(status.code(), None);
        assert_eq!(status.poll_code(), -11);
        assert_eq!(status.shell_code(), 139);
        assert_eq!(status.signal_name(), Some("SIGSEGV"));
    }

    #[test]
    fn display_names_signal() {
        assert_eq!(ExitStatus::Exited(1).to_string(), "exited with code 1");
        assert_eq!(
            ExitStatus::Signaled(9).to_string(),
            "killed by signal SIGKILL (9)"
        );
    }

    #[test]
    fn converts_from_std_status() {
        // Raw wait statuses: exit code in the high byte, signal in the low bits.
        let exited = std::process::ExitStatus::from_raw(3 << 8);
        assert_eq!(ExitStatus::from(exited), ExitStatus::Exited(3));

        let signaled = std::process::ExitStatus::from_raw(11);
        assert_eq!(ExitStatus::from(signaled), ExitStatus::Signaled(11));
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_string(&ExitStatus::Exited(3)).unwrap();
        assert_eq!(json, r#"{"kind":"exited","value":3}"#);
    }
}
