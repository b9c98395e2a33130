//! # Supervisor: runs the controller loop, fans events out, reacts to signals.
//!
//! The [`Supervisor`] owns the event bus, a [`SubscriberSet`] and the runtime
//! configuration. [`Supervisor::run`] builds the [`Controller`], starts
//! `cfg.instances` workers and then drives the controller from a single task until
//! the fleet has drained.
//!
//! ## High-level architecture
//! ```text
//! Preparation:
//!   - cfg.validate()
//!   - subscriber_listener(): Bus.subscribe() ─► SubscriberSet::emit(&Event)   (fire-and-forget)
//!   - ShutdownSignals::register()   (SIGINT / SIGTERM / SIGQUIT, optional)
//!   - Controller::new(cfg, launcher, bus) → start_workers(cfg.instances)
//!
//! Loop (until Controller::is_drained):
//!   select! {
//!     control_rx   ─► controller.handle(ControlEvent)   (messages, exits, timers)
//!     commands     ─► Command::apply(&mut controller)    (SupervisorHandle calls)
//!     signal/token ─► Bus.publish(ShutdownRequested) ─► controller.kill_all()
//!   }
//!
//! Teardown:
//!   - stop the listener (drains what is already on the bus)
//!   - SubscriberSet::shutdown()  (waits for every subscriber queue to empty)
//!   - return FleetReport
//! ```
//!
//! The host picks its exit status from the report: [`FleetReport::is_abnormal`]
//! is the usual "exit 1" condition.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use procvisor::{Config, ProcessLauncher, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config { instances: 4, ..Config::default() };
//!     let launcher = Arc::new(ProcessLauncher::new("./worker"));
//!
//!     let (sup, _handle) = Supervisor::builder(cfg, launcher).build();
//!     let report = sup.run().await?;
//!     std::process::exit(if report.is_abnormal() { 1 } else { 0 });
//! }
//! ```

use std::sync::Arc;

use tokio::{sync::broadcast, sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::controller::{Controller, FleetReport};
use crate::core::{
    Config,
    builder::SupervisorBuilder,
    handle::Command,
    shutdown::{self, ShutdownSignals},
};
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::process::Launcher;
use crate::subscribers::SubscriberSet;

/// Drives one worker fleet from start until every worker has exited.
pub struct Supervisor {
    cfg: Config,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    launcher: Arc<dyn Launcher>,
    commands: mpsc::Receiver<Command>,
    shutdown: CancellationToken,
    handle_signals: bool,
}

impl Supervisor {
    /// Creates a builder for constructing a Supervisor.
    pub fn builder(cfg: Config, launcher: Arc<dyn Launcher>) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg, launcher)
    }

    pub(crate) fn new_internal(
        cfg: Config,
        bus: Bus,
        subs: SubscriberSet,
        launcher: Arc<dyn Launcher>,
        commands: mpsc::Receiver<Command>,
        shutdown: CancellationToken,
        handle_signals: bool,
    ) -> Self {
        Self {
            cfg,
            bus,
            subs: Arc::new(subs),
            launcher,
            commands,
            shutdown,
            handle_signals,
        }
    }

    /// Receiver of runtime events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Starts the fleet and supervises it until it has fully drained.
    ///
    /// The fleet drains after a termination signal,
    /// [`SupervisorHandle::shutdown`](crate::SupervisorHandle::shutdown),
    /// [`SupervisorHandle::kill_all`](crate::SupervisorHandle::kill_all), a tripped
    /// circuit breaker, or when no worker could be started at all.
    ///
    /// # Errors
    /// - [`RuntimeError::InvalidConfig`] before anything is spawned
    /// - [`RuntimeError::Signal`] when signal handlers cannot be installed
    pub async fn run(mut self) -> Result<FleetReport, RuntimeError> {
        self.cfg.validate()?;

        let mut signals = if self.handle_signals {
            Some(ShutdownSignals::register().map_err(|source| RuntimeError::Signal { source })?)
        } else {
            None
        };

        let done = CancellationToken::new();
        let listener = self.subscriber_listener(done.clone());

        let (mut ctrl, mut control_rx) =
            Controller::new(self.cfg.clone(), Arc::clone(&self.launcher), self.bus.clone());
        info!(instances = self.cfg.instances, "starting worker fleet");
        ctrl.start_workers(self.cfg.instances);

        let mut commands_open = true;
        let mut shutting_down = false;

        while !ctrl.is_drained() {
            tokio::select! {
                Some(ev) = control_rx.recv() => ctrl.handle(ev),

                cmd = self.commands.recv(), if commands_open => match cmd {
                    Some(cmd) => cmd.apply(&mut ctrl),
                    None => commands_open = false,
                },

                reason = shutdown::next_signal(&mut signals), if !shutting_down => {
                    shutting_down = true;
                    self.request_shutdown(&mut ctrl, reason);
                }

                _ = self.shutdown.cancelled(), if !shutting_down => {
                    shutting_down = true;
                    self.request_shutdown(&mut ctrl, "handle");
                }
            }
        }

        let report = ctrl.report();
        debug!(?report, "fleet drained");
        drop(ctrl);

        done.cancel();
        let _ = listener.await;
        if let Ok(subs) = Arc::try_unwrap(self.subs) {
            subs.shutdown().await;
        }
        Ok(report)
    }

    fn request_shutdown(&self, ctrl: &mut Controller, reason: &'static str) {
        info!(reason, "shutdown requested");
        self.bus
            .publish(Event::new(EventKind::ShutdownRequested).with_reason(reason));
        ctrl.kill_all();
    }

    /// Subscribes to the bus and forwards events to the subscriber set (fire-and-forget).
    ///
    /// On `done`, whatever is already buffered on the bus is still forwarded.
    fn subscriber_listener(&self, done: CancellationToken) -> JoinHandle<()> {
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    ev = rx.recv() => match ev {
                        Ok(ev) => set.emit(&ev),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            debug!(skipped = n, "subscriber listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                    },
                    _ = done.cancelled() => break,
                }
            }
            loop {
                match rx.try_recv() {
                    Ok(ev) => set.emit(&ev),
                    Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
        })
    }
}
