use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use nix::sys::signal::Signal;

/// How a worker process ended.
///
/// Exactly one of `code` and `signal` is set for a reaped process; both are
/// `None` when the status could not be collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitInfo {
    /// Exit status code, for a normal exit.
    pub code: Option<i32>,
    /// Terminating signal number, for a signalled exit.
    pub signal: Option<i32>,
}

impl ExitInfo {
    /// A normal exit with the given status code.
    pub const fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// A signalled exit.
    pub const fn signaled(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    /// Status could not be collected.
    pub const fn unknown() -> Self {
        Self {
            code: None,
            signal: None,
        }
    }

    /// True for exit code 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ExitInfo {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
            signal: status.signal(),
        }
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "code {code}"),
            (None, Some(sig)) => match Signal::try_from(sig) {
                Ok(signal) => write!(f, "signal {}", signal.as_str()),
                Err(_) => write!(f, "signal {sig}"),
            },
            (None, None) => f.write_str("unknown status"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefers_code() {
        assert_eq!(ExitInfo::code(100).to_string(), "code 100");
        assert_eq!(ExitInfo::signaled(15).to_string(), "signal SIGTERM");
        assert_eq!(ExitInfo::unknown().to_string(), "unknown status");
    }

    #[test]
    fn converts_from_raw_wait_status() {
        // Raw wait(2) encoding: exit code in the high byte, signal in the low bits.
        let exited = ExitInfo::from(ExitStatus::from_raw(3 << 8));
        assert_eq!(exited, ExitInfo::code(3));

        let killed = ExitInfo::from(ExitStatus::from_raw(9));
        assert_eq!(killed, ExitInfo::signaled(9));
        assert!(!killed.success());
    }
}
