use std::fmt;
use std::sync::Arc;

use tokio::time::Instant;

use crate::process::{ExitInfo, WorkerLink};

use super::timers::ScopedTimer;

/// Identity of one spawn.
///
/// Sequence numbers are reused; worker ids never are. Events tagged with an id
/// that no longer owns its sequence are stale and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw id value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle status of a worker.
///
/// ```text
/// Launching ──started──► Online ──stop──► Stopping
///     │                    │                 │
///     └──stop──────────────┴─────────────────┴──exit──► Stopped (slot freed)
/// Launching ──spawn error──► Errored (slot freed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Spawned, the process is not known to be running yet.
    Launching,
    /// Running; subject to liveness checks.
    Online,
    /// Asked to stop; waiting for exit (force kill after the graceful timeout).
    Stopping,
    /// Process exited.
    Stopped,
    /// Could not be spawned.
    Errored,
}

impl WorkerStatus {
    /// Lowercase name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Launching => "launching",
            WorkerStatus::Online => "online",
            WorkerStatus::Stopping => "stopping",
            WorkerStatus::Stopped => "stopped",
            WorkerStatus::Errored => "errored",
        }
    }
}

/// Why a worker's exit will count as an error, recorded before it exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// The worker sent `error-report` with this message.
    Reported(String),
    /// The controller stopped it as faulty (zombie or explicit).
    Flagged,
}

/// Classification of a worker exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitClass {
    /// Exit after a requested stop with no fault.
    Clean,
    /// Exit nobody asked for, with no error indication.
    Unrequested,
    /// Error exit.
    Failed {
        /// Reported message, or a description of why it counts as failed.
        cause: Arc<str>,
    },
}

impl ExitClass {
    /// True for [`ExitClass::Failed`].
    pub fn is_error(&self) -> bool {
        matches!(self, ExitClass::Failed { .. })
    }
}

/// Controller-side record of one running worker.
pub(super) struct WorkerSlot {
    pub sequence: usize,
    pub id: WorkerId,
    pub status: WorkerStatus,
    pub link: Box<dyn WorkerLink>,
    pub last_heartbeat: Instant,
    pub fault: Option<Fault>,
    pub stop_requested: bool,
    /// Armed only while `Stopping` with a non-zero graceful timeout.
    pub shutdown_timer: Option<ScopedTimer>,
}

impl WorkerSlot {
    pub fn new(sequence: usize, id: WorkerId, link: Box<dyn WorkerLink>) -> Self {
        Self {
            sequence,
            id,
            status: WorkerStatus::Launching,
            link,
            last_heartbeat: Instant::now(),
            fault: None,
            stop_requested: false,
            shutdown_timer: None,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.link.pid()
    }

    /// Whether `stop_worker` may act on this slot.
    pub fn is_stoppable(&self) -> bool {
        matches!(self.status, WorkerStatus::Launching | WorkerStatus::Online)
    }

    /// Classifies this worker's exit.
    ///
    /// A reported message wins as the cause, then a flag, then the reserved
    /// exit code. Without any of those the exit is clean only if it was requested.
    pub fn classify(&self, exit: &ExitInfo, uncaught_exception_exit_code: i32) -> ExitClass {
        match &self.fault {
            Some(Fault::Reported(msg)) => ExitClass::Failed {
                cause: msg.as_str().into(),
            },
            Some(Fault::Flagged) => ExitClass::Failed {
                cause: "stopped as faulty".into(),
            },
            None if exit.code == Some(uncaught_exception_exit_code) => ExitClass::Failed {
                cause: format!("uncaught exception (exit code {uncaught_exception_exit_code})")
                    .into(),
            },
            None if self.stop_requested => ExitClass::Clean,
            None => ExitClass::Unrequested,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkerError;
    use crate::ipc::Outbound;

    struct NoopLink;

    impl WorkerLink for NoopLink {
        fn pid(&self) -> Option<u32> {
            None
        }
        fn send(&mut self, _msg: &Outbound) -> Result<(), WorkerError> {
            Ok(())
        }
        fn disconnect(&mut self) -> Result<(), WorkerError> {
            Ok(())
        }
        fn terminate(&mut self) -> Result<(), WorkerError> {
            Ok(())
        }
    }

    fn slot() -> WorkerSlot {
        WorkerSlot::new(0, WorkerId::new(1), Box::new(NoopLink))
    }

    #[tokio::test]
    async fn reported_message_wins_over_exit_code() {
        let mut s = slot();
        s.fault = Some(Fault::Reported("boom".into()));
        let class = s.classify(&ExitInfo::code(100), 100);
        assert_eq!(class, ExitClass::Failed { cause: "boom".into() });
    }

    #[tokio::test]
    async fn reserved_code_is_failure_even_when_requested() {
        let mut s = slot();
        s.stop_requested = true;
        assert!(s.classify(&ExitInfo::code(100), 100).is_error());
        assert_eq!(s.classify(&ExitInfo::code(0), 100), ExitClass::Clean);
    }

    #[tokio::test]
    async fn unrequested_exit_without_fault() {
        let s = slot();
        assert_eq!(s.classify(&ExitInfo::code(0), 100), ExitClass::Unrequested);
        assert_eq!(s.classify(&ExitInfo::signaled(9), 100), ExitClass::Unrequested);
    }

    #[tokio::test]
    async fn flagged_is_failure() {
        let mut s = slot();
        s.stop_requested = true;
        s.fault = Some(Fault::Flagged);
        assert!(s.classify(&ExitInfo::signaled(15), 100).is_error());
    }
}
