//! # LogWriter: runtime events as `tracing` records.
//!
//! A subscriber that turns every [`Event`] into one log line under the
//! `procvisor::events` target. Pair it with [`logging::init`](crate::logging::init)
//! or any other `tracing` subscriber.
//!
//! ## Example output
//! ```text
//! INFO  procvisor::events: worker(0), forked. pid=4242
//! INFO  procvisor::events: worker(0), online. pid=4242
//! ERROR procvisor::events: worker(0), exit unexpected. exit=code 100 cause="uncaught exception (exit code 100)"
//! ERROR procvisor::events: exception occurred 3 times within the failure window, exiting ...
//! INFO  procvisor::events: killing all worker process ...
//! INFO  procvisor::events: all workers killed, really exiting now ...
//! ```

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::controller::ExitClass;
use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

const TARGET: &str = "procvisor::events";

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let worker = e.worker.map(|w| w as i64).unwrap_or(-1);
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::ShutdownRequested => {
                info!(target: TARGET, via = reason, "received kill or Ctrl-C signal.");
            }
            EventKind::KillingAllWorkers => {
                info!(target: TARGET, "killing all worker process ...");
            }
            EventKind::ThresholdReached => {
                error!(
                    target: TARGET,
                    "exception occurred {} times within the failure window, exiting ...",
                    e.count.unwrap_or_default()
                );
            }
            EventKind::AllWorkersStopped => {
                info!(target: TARGET, "all workers killed, really exiting now ...");
            }
            EventKind::WorkerForked => {
                info!(target: TARGET, pid = e.pid, "worker({worker}), forked.");
            }
            EventKind::SpawnFailed => {
                error!(target: TARGET, error = reason, "worker({worker}), fork failed.");
            }
            EventKind::WorkerOnline => {
                info!(target: TARGET, pid = e.pid, "worker({worker}), online.");
            }
            EventKind::KillingWorker => {
                info!(target: TARGET, pid = e.pid, "killing worker({worker}) ...");
            }
            EventKind::ForceKillWorker => {
                warn!(
                    target: TARGET,
                    pid = e.pid,
                    "exceeded the graceful timeout, force kill worker({worker}) ..."
                );
            }
            EventKind::KillFailed => {
                error!(target: TARGET, pid = e.pid, "kill worker({worker}) failed, {reason}.");
            }
            EventKind::ZombieDetected => {
                warn!(target: TARGET, pid = e.pid, "detected zombie worker({worker}).");
            }
            EventKind::WorkerExited => {
                let exit = e.exit.map(|x| x.to_string()).unwrap_or_default();
                match &e.class {
                    Some(ExitClass::Failed { cause }) => {
                        error!(
                            target: TARGET,
                            %exit,
                            cause = &**cause,
                            "worker({worker}), exit unexpected."
                        );
                    }
                    Some(ExitClass::Unrequested) => {
                        warn!(target: TARGET, %exit, "worker({worker}), exit normally, unrequested.");
                    }
                    _ => {
                        info!(target: TARGET, %exit, "worker({worker}), exit normally.");
                    }
                }
            }
            EventKind::RestartSuppressed => {
                info!(target: TARGET, reason, "worker({worker}) not restarted.");
            }
            EventKind::SubscriberOverflow => {
                warn!(target: TARGET, detail = reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                error!(target: TARGET, detail = reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
