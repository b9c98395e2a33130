//! # Handle to a running supervisor.
//!
//! [`SupervisorHandle`] is how the rest of the host process talks to the fleet
//! while [`Supervisor::run`](crate::Supervisor::run) owns it. Each call becomes a
//! [`Command`] on a bounded queue; the supervisor loop applies it to the
//! controller between control events and answers on a oneshot channel.
//!
//! ```text
//! handle.stop_worker(2) ──► mpsc<Command> ──► Supervisor loop ──► Controller::stop_worker(2, false)
//!          ▲                                                              │
//!          └──────────────────────── oneshot reply ◄──────────────────────┘
//! ```
//!
//! Once the fleet has drained and `run` returned, every call fails with
//! [`HandleError::Closed`].

use std::fmt;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::controller::{Controller, FleetReport, WorkerStatus};
use crate::error::HandleError;
use crate::events::{Bus, Event};
use crate::ipc::{Envelope, Outbound};

/// Request applied by the supervisor loop.
pub(crate) enum Command {
    StartWorkers {
        n: usize,
        reply: oneshot::Sender<usize>,
    },
    StopWorker {
        sequence: usize,
        reply: oneshot::Sender<bool>,
    },
    KillAll {
        reply: oneshot::Sender<()>,
    },
    Broadcast {
        msg: Outbound,
        reply: oneshot::Sender<usize>,
    },
    SendTo {
        sequence: usize,
        msg: Outbound,
        reply: oneshot::Sender<bool>,
    },
    Status {
        sequence: usize,
        reply: oneshot::Sender<Option<WorkerStatus>>,
    },
    Statuses {
        reply: oneshot::Sender<Vec<(usize, WorkerStatus)>>,
    },
    IsReady {
        reply: oneshot::Sender<bool>,
    },
    Report {
        reply: oneshot::Sender<FleetReport>,
    },
}

impl Command {
    /// Applies the request and answers it. A caller that gave up is ignored.
    pub(crate) fn apply(self, ctrl: &mut Controller) {
        match self {
            Command::StartWorkers { n, reply } => {
                let _ = reply.send(ctrl.start_workers(n));
            }
            Command::StopWorker { sequence, reply } => {
                let _ = reply.send(ctrl.stop_worker(sequence, false));
            }
            Command::KillAll { reply } => {
                ctrl.kill_all();
                let _ = reply.send(());
            }
            Command::Broadcast { msg, reply } => {
                let _ = reply.send(ctrl.broadcast(&msg));
            }
            Command::SendTo {
                sequence,
                msg,
                reply,
            } => {
                let _ = reply.send(ctrl.send_to(sequence, &msg));
            }
            Command::Status { sequence, reply } => {
                let _ = reply.send(ctrl.status(sequence));
            }
            Command::Statuses { reply } => {
                let _ = reply.send(ctrl.statuses());
            }
            Command::IsReady { reply } => {
                let _ = reply.send(ctrl.is_ready());
            }
            Command::Report { reply } => {
                let _ = reply.send(ctrl.report());
            }
        }
    }
}

/// Applies a log level to the master process itself.
pub(crate) type LogLevelHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Cloneable async handle to a running [`Supervisor`](crate::Supervisor).
#[derive(Clone)]
pub struct SupervisorHandle {
    tx: mpsc::Sender<Command>,
    bus: Bus,
    shutdown: CancellationToken,
    log_level: Option<LogLevelHook>,
}

impl fmt::Debug for SupervisorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisorHandle")
            .field("tx", &self.tx)
            .field("bus", &self.bus)
            .field("shutdown", &self.shutdown)
            .field("log_level_hook", &self.log_level.is_some())
            .finish()
    }
}

impl SupervisorHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<Command>,
        bus: Bus,
        shutdown: CancellationToken,
        log_level: Option<LogLevelHook>,
    ) -> Self {
        Self {
            tx,
            bus,
            shutdown,
            log_level,
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, HandleError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| HandleError::Closed)?;
        rx.await.map_err(|_| HandleError::Closed)
    }

    /// Spawns `n` more workers. Returns how many were launched (0 once stopping).
    pub async fn start_workers(&self, n: usize) -> Result<usize, HandleError> {
        self.request(|reply| Command::StartWorkers { n, reply }).await
    }

    /// Gracefully stops one worker. Its clean exit is not replaced.
    pub async fn stop_worker(&self, sequence: usize) -> Result<bool, HandleError> {
        self.request(|reply| Command::StopWorker { sequence, reply })
            .await
    }

    /// Stops the whole fleet. `run` returns once every worker has exited.
    pub async fn kill_all(&self) -> Result<(), HandleError> {
        self.request(|reply| Command::KillAll { reply }).await
    }

    /// Sends an application message to every worker. Returns how many got it.
    pub async fn broadcast(&self, envelope: Envelope) -> Result<usize, HandleError> {
        let msg = Outbound::Payload(envelope);
        self.request(|reply| Command::Broadcast { msg, reply }).await
    }

    /// Sends an application message to one worker.
    pub async fn send_to(&self, sequence: usize, envelope: Envelope) -> Result<bool, HandleError> {
        let msg = Outbound::Payload(envelope);
        self.request(|reply| Command::SendTo {
            sequence,
            msg,
            reply,
        })
        .await
    }

    /// Changes the log level of the master and of every worker.
    ///
    /// The master's own level changes through the hook given to
    /// [`SupervisorBuilder::with_log_level_hook`](crate::SupervisorBuilder::with_log_level_hook);
    /// without one only the workers are told. Returns how many workers got it.
    pub async fn set_log_level(&self, level: impl Into<String>) -> Result<usize, HandleError> {
        let level = level.into();
        if let Some(hook) = &self.log_level {
            hook(&level);
        }
        let msg = Outbound::SetLogLevel(level);
        self.request(|reply| Command::Broadcast { msg, reply }).await
    }

    /// Status of one worker.
    pub async fn status(&self, sequence: usize) -> Result<Option<WorkerStatus>, HandleError> {
        self.request(|reply| Command::Status { sequence, reply })
            .await
    }

    /// Status of every worker, by sequence.
    pub async fn statuses(&self) -> Result<Vec<(usize, WorkerStatus)>, HandleError> {
        self.request(|reply| Command::Statuses { reply }).await
    }

    /// True when every worker is online.
    pub async fn is_ready(&self) -> Result<bool, HandleError> {
        self.request(|reply| Command::IsReady { reply }).await
    }

    /// Counters collected so far.
    pub async fn report(&self) -> Result<FleetReport, HandleError> {
        self.request(|reply| Command::Report { reply }).await
    }

    /// Same as receiving a termination signal: publishes
    /// [`EventKind::ShutdownRequested`](crate::EventKind::ShutdownRequested) and stops
    /// the fleet. Never blocks.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Receiver of runtime events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }
}
