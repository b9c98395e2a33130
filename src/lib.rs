//! # procvisor
//!
//! **Procvisor** supervises a fixed-size pool of worker processes.
//!
//! It forks N copies of a worker program, gives each a stable sequence number,
//! watches their heartbeats, relays messages between them, replaces the ones
//! that die, and stops the whole fleet when failures pile up faster than a
//! configured rate or when the host process receives a termination signal.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  worker #0   │   │  worker #1   │   │  worker #N   │
//!     │ (OS process) │   │ (OS process) │   │ (OS process) │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            │ stdin/stdout: newline-delimited JSON envelopes
//!            ▼                  ▼                  ▼
//!     ┌─────────────────────────────────────────────────────┐
//!     │  writer / reader / waiter tasks (ProcessLauncher)   │
//!     └──────────────────────────┬──────────────────────────┘
//!                                ▼ ControlEvent (one unbounded channel)
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor loop (single task)                                    │
//! │  - Controller: slot table, exit policy, breaker, liveness         │
//! │  - SupervisorHandle commands                                      │
//! │  - SIGINT / SIGTERM / SIGQUIT                                     │
//! └──────────────────────────────┬────────────────────────────────────┘
//!                                ▼ Event
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │  subscriber_listener   │
//!                       └───────────┬────────────┘
//!                                   ▼
//!                             SubscriberSet
//!                          ┌────────┼────────┐
//!                          ▼        ▼        ▼
//!                     LogWriter  metrics  custom
//! ```
//!
//! ### Worker lifecycle
//! ```text
//! start_workers(n) ──► lowest free sequence ──► Launcher::launch ──► Launching
//!
//! process started ──► Online (liveness-checked from now on)
//! "liveness-ping"   ──► heartbeat refreshed
//! "error-report"    ──► fault recorded, exit will count as failed
//!
//! exit ──► classify:
//!   ├─ fault / reserved exit code  ──► Failed     ─┐
//!   ├─ not requested               ──► Unrequested ├─► CircuitBreaker
//!   │                                              │     ├─ Restart   ─► spawn one
//!   │                                              │     ├─ Escalate  ─► kill_all
//!   │                                              │     └─ Suppressed
//!   └─ requested stop, no fault    ──► Clean (slot stays free)
//!
//! all slots free after kill_all ──► AllWorkersStopped ──► run() returns FleetReport
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                              |
//! |-------------------|---------------------------------------------------------------|-------------------------------------------------|
//! | **Supervision**   | Run the fleet, talk to it while it runs.                      | [`Supervisor`], [`SupervisorHandle`]            |
//! | **Processes**     | Spawn workers, or plug in another launcher.                   | [`ProcessLauncher`], [`Launcher`], [`WorkerLink`] |
//! | **Protocol**      | Typed IPC messages.                                           | [`Envelope`], [`Inbound`], [`Outbound`]         |
//! | **Subscriber API**| Hook into worker and fleet events.                            | [`Subscribe`], [`Event`], [`EventKind`]         |
//! | **Worker side**   | Helper for worker binaries.                                   | [`worker::WorkerContext`]                       |
//! | **Errors**        | Typed errors.                                                 | [`RuntimeError`], [`WorkerError`], [`HandleError`] |
//! | **Configuration** | Centralize runtime settings.                                  | [`Config`]                                      |
//!
//! ## Optional features
//! - `logging` (default): exports [`LogWriter`] and [`logging::init`].
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use procvisor::{Config, ProcessLauncher, Subscribe, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config { instances: 2, ..Config::default() };
//!     let launcher = Arc::new(ProcessLauncher::new("./my-worker").arg("--serve"));
//!
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(procvisor::LogWriter::new())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn Subscribe>> = Vec::new();
//!
//!     let (sup, handle) = Supervisor::builder(cfg, launcher)
//!         .with_subscribers(subs)
//!         .build();
//!
//!     tokio::spawn(async move {
//!         let _ = handle.set_log_level("debug").await;
//!     });
//!
//!     let report = sup.run().await?;
//!     std::process::exit(if report.is_abnormal() { 1 } else { 0 });
//! }
//! ```
pub mod controller;
mod core;
mod error;
mod events;
pub mod ipc;
mod policies;
pub mod process;
mod subscribers;
pub mod worker;

#[cfg(feature = "logging")]
pub mod logging;

// ---- Public re-exports ----

pub use controller::{ExitClass, FleetReport, WorkerId, WorkerStatus};
pub use self::core::{Config, Supervisor, SupervisorBuilder, SupervisorHandle};
pub use error::{HandleError, RuntimeError, WorkerError};
pub use events::{Bus, Event, EventKind};
pub use ipc::{Envelope, Inbound, Outbound, Target};
pub use policies::{CircuitBreaker, Verdict};
pub use process::{ExitInfo, LaunchSpec, Launcher, ProcessLauncher, WorkerEvents, WorkerLink};
pub use subscribers::{Subscribe, SubscriberSet};

// Built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
