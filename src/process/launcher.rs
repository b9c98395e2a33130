//! # Seams between the controller and OS processes.
//!
//! The controller never touches `tokio::process` directly. It asks a [`Launcher`]
//! for a worker and gets back a [`WorkerLink`]; everything the process says or
//! does afterwards (messages, exit) flows back through [`WorkerEvents`].
//!
//! ```text
//! Controller ── launch(spec, events) ──► Launcher
//!     ▲                                     │
//!     │                              Box<dyn WorkerLink>  (send / disconnect / terminate)
//!     │
//!     └── ControlEvent::{Online, Message, Exited} ◄── WorkerEvents (held by the worker's tasks)
//! ```
//!
//! ## Rules
//! - `launch` is synchronous and must not block; I/O happens in spawned tasks.
//! - `WorkerLink::send` fails fast with [`WorkerError::ChannelClosed`] once the
//!   channel is gone; it never waits for the worker.
//! - A launcher reports `online` once the process is running. Launchers that
//!   never do still get their worker marked online by its first message.
//! - Exactly one `Exited` event is delivered per successfully launched worker.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::controller::{ControlEvent, WorkerId};
use crate::error::WorkerError;
use crate::ipc::{Envelope, Outbound};

use super::exit::ExitInfo;

/// Sequence number of the worker.
pub const ENV_WORKER_ID: &str = "WORKER_ID";
/// Heartbeat interval in milliseconds (0 disables pings).
pub const ENV_HEARTBEAT_MS: &str = "WORKER_HEARTBEAT_MS";
/// Pings to send per heartbeat interval.
pub const ENV_HEARTBEAT_PINGS: &str = "WORKER_HEARTBEAT_PINGS";
/// Exit code a worker uses after an unhandled failure.
pub const ENV_UNCAUGHT_EXIT_CODE: &str = "WORKER_UNCAUGHT_EXIT_CODE";

/// What a launcher needs to know about the worker it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Sequence number (identity) of the worker.
    pub sequence: usize,
    /// Interval the master expects heartbeats within.
    pub heartbeat_interval: Duration,
    /// Pings per interval.
    pub heartbeat_pings: u32,
    /// Reserved "uncaught exception" exit code.
    pub uncaught_exception_exit_code: i32,
}

impl LaunchSpec {
    /// Environment injected into the worker process.
    pub fn env(&self) -> Vec<(&'static str, String)> {
        vec![
            (ENV_WORKER_ID, self.sequence.to_string()),
            (
                ENV_HEARTBEAT_MS,
                self.heartbeat_interval.as_millis().to_string(),
            ),
            (ENV_HEARTBEAT_PINGS, self.heartbeat_pings.to_string()),
            (
                ENV_UNCAUGHT_EXIT_CODE,
                self.uncaught_exception_exit_code.to_string(),
            ),
        ]
    }
}

/// Back-channel from one worker's background tasks into the controller.
///
/// Every event is tagged with the [`WorkerId`] of this particular spawn, so
/// anything arriving after the sequence was reused is recognised as stale.
#[derive(Clone, Debug)]
pub struct WorkerEvents {
    id: WorkerId,
    sequence: usize,
    tx: mpsc::UnboundedSender<ControlEvent>,
}

impl WorkerEvents {
    pub(crate) fn new(
        id: WorkerId,
        sequence: usize,
        tx: mpsc::UnboundedSender<ControlEvent>,
    ) -> Self {
        Self { id, sequence, tx }
    }

    /// Spawn identity.
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Sequence number the worker was launched with.
    pub fn sequence(&self) -> usize {
        self.sequence
    }

    /// Reports that the worker process is up.
    pub fn online(&self) -> bool {
        self.tx.send(ControlEvent::Online { id: self.id }).is_ok()
    }

    /// Delivers an inbound envelope. Returns `false` once the controller is gone.
    pub fn message(&self, envelope: Envelope) -> bool {
        self.tx
            .send(ControlEvent::Message {
                id: self.id,
                envelope,
            })
            .is_ok()
    }

    /// Reports process exit. Call exactly once.
    pub fn exited(&self, exit: ExitInfo) {
        let _ = self.tx.send(ControlEvent::Exited { id: self.id, exit });
    }
}

/// Starts worker processes.
pub trait Launcher: Send + Sync + 'static {
    /// Starts one worker.
    ///
    /// On success the launcher owns delivering the worker's messages and its
    /// single exit notification through `events`.
    fn launch(
        &self,
        spec: &LaunchSpec,
        events: WorkerEvents,
    ) -> Result<Box<dyn WorkerLink>, WorkerError>;
}

/// Exclusive handle on one running worker.
pub trait WorkerLink: Send + 'static {
    /// OS process id, if known.
    fn pid(&self) -> Option<u32>;

    /// Queues a message for the worker.
    fn send(&mut self, msg: &Outbound) -> Result<(), WorkerError>;

    /// Closes the master side of the IPC channel after queued messages are flushed.
    fn disconnect(&mut self) -> Result<(), WorkerError>;

    /// Sends SIGTERM to the worker's process tree.
    fn terminate(&mut self) -> Result<(), WorkerError>;
}
