//! Process-tree termination.
//!
//! Workers are spawned as leaders of their own process group, so one `killpg`
//! reaches every descendant that did not move itself to another group.

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill, killpg};
use nix::unistd::Pid;
use tracing::debug;

use crate::error::WorkerError;

/// Sends SIGTERM to the process group led by `pid`.
///
/// Falls back to signalling the single process when no such group exists.
/// A process that is already gone is not an error.
pub fn terminate_tree(pid: u32) -> Result<(), WorkerError> {
    let raw = i32::try_from(pid).map_err(|_| WorkerError::Kill {
        pid,
        reason: "pid out of range".into(),
    })?;
    let target = Pid::from_raw(raw);

    match killpg(target, Signal::SIGTERM) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => match kill(target, Signal::SIGTERM) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => {
                debug!(pid, "process already gone");
                Ok(())
            }
            Err(e) => Err(WorkerError::Kill {
                pid,
                reason: e.to_string(),
            }),
        },
        Err(e) => Err(WorkerError::Kill {
            pid,
            reason: e.to_string(),
        }),
    }
}
