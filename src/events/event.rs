//! # Runtime events emitted by the supervisor and its controller.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Worker events**: one worker's lifecycle (forked, online, stopping, exited)
//! - **Fleet events**: decisions about the whole pool (kill-all, threshold, drained)
//! - **Subscriber events**: problems inside the observability fan-out
//!
//! The [`Event`] struct carries additional metadata such as the worker sequence,
//! pid, exit information and a human-readable reason.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Events about one worker are published by the single controller task, in order.
//!
//! ## Example
//! ```rust
//! use procvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::KillFailed)
//!     .with_worker(3)
//!     .with_pid(4242)
//!     .with_reason("ESRCH");
//!
//! assert_eq!(ev.kind, EventKind::KillFailed);
//! assert_eq!(ev.worker, Some(3));
//! assert_eq!(ev.reason.as_deref(), Some("ESRCH"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::controller::{ExitClass, WorkerStatus};
use crate::process::ExitInfo;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `reason`: subscriber name and panic info
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `reason`: subscriber name and cause ("full", "closed")
    SubscriberOverflow,

    // === Fleet events ===
    /// OS termination signal observed; a kill-all follows.
    ShutdownRequested,

    /// Every occupied slot is being asked to stop.
    KillingAllWorkers,

    /// The circuit breaker crossed its threshold; the fleet is being stopped.
    ///
    /// Sets:
    /// - `count`: failures counted in the window
    ThresholdReached,

    /// Every slot is free after a stop; terminal event, published once.
    AllWorkersStopped,

    // === Worker events ===
    /// Worker process spawned.
    ///
    /// Sets:
    /// - `worker`: sequence
    /// - `pid`: process id (when known)
    WorkerForked,

    /// Worker could not be spawned; its sequence is freed.
    ///
    /// Sets:
    /// - `worker`: sequence
    /// - `status`: `Errored`
    /// - `reason`: spawn error
    SpawnFailed,

    /// Worker process is running.
    ///
    /// Sets:
    /// - `worker`, `pid`
    WorkerOnline,

    /// Worker was asked to stop.
    ///
    /// Sets:
    /// - `worker`, `pid`
    KillingWorker,

    /// Graceful timeout elapsed; the worker is force-killed.
    ///
    /// Sets:
    /// - `worker`, `pid`
    ForceKillWorker,

    /// Termination signal could not be delivered.
    ///
    /// Sets:
    /// - `worker`, `pid`
    /// - `reason`: OS error
    KillFailed,

    /// Online worker stopped heartbeating and is being stopped with an error.
    ///
    /// Sets:
    /// - `worker`, `pid`
    ZombieDetected,

    /// Worker process exited.
    ///
    /// Sets:
    /// - `worker`, `pid`
    /// - `exit`: exit code / signal
    /// - `class`: clean, unrequested or failed (with cause)
    WorkerExited,

    /// An abnormal exit did not lead to a replacement.
    ///
    /// Sets:
    /// - `worker`: sequence of the exited worker
    /// - `reason`: "breaker_open" or "fleet_draining"
    RestartSuppressed,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Worker sequence number, if applicable.
    pub worker: Option<usize>,
    /// OS process id, if known.
    pub pid: Option<u32>,
    /// Worker status attached to the event.
    pub status: Option<WorkerStatus>,
    /// Raw exit information for [`EventKind::WorkerExited`].
    pub exit: Option<ExitInfo>,
    /// Exit classification for [`EventKind::WorkerExited`].
    pub class: Option<ExitClass>,
    /// Failure count for [`EventKind::ThresholdReached`].
    pub count: Option<u32>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            worker: None,
            pid: None,
            status: None,
            exit: None,
            class: None,
            count: None,
            reason: None,
        }
    }

    /// Attaches a worker sequence number.
    #[inline]
    pub fn with_worker(mut self, sequence: usize) -> Self {
        self.worker = Some(sequence);
        self
    }

    /// Attaches a process id when one is known.
    #[inline]
    pub fn with_pid(mut self, pid: impl Into<Option<u32>>) -> Self {
        self.pid = pid.into();
        self
    }

    /// Attaches a worker status.
    #[inline]
    pub fn with_status(mut self, status: WorkerStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Attaches exit information and its classification.
    #[inline]
    pub fn with_exit(mut self, exit: ExitInfo, class: ExitClass) -> Self {
        self.exit = Some(exit);
        self.class = Some(class);
        self
    }

    /// Attaches a failure count.
    #[inline]
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} info={info}"))
    }

    /// True for the exit of a worker classified as failed.
    #[inline]
    pub fn is_error_exit(&self) -> bool {
        matches!(self.class, Some(ExitClass::Failed { .. }))
    }
}
