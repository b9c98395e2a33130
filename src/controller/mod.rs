//! Worker lifecycle controller and its building blocks.
//!
//! ## Contents
//! - [`Controller`] owns the fleet and implements the exit policy
//! - [`SlotTable`] sequence-number occupancy with lowest-first reuse
//! - [`LivenessMonitor`] zombie detection over worker heartbeats
//! - [`ScopedTimer`] / [`TimerEvent`] timers delivered as [`ControlEvent`]s
//! - [`WorkerStatus`], [`ExitClass`], [`Fault`], [`WorkerId`] per-worker state
//!
//! ## Quick wiring
//! ```text
//! Supervisor::run
//!   └─► Controller::new(cfg, launcher, bus) → (controller, control_rx)
//!        loop: control_rx.recv() → controller.handle(ev)
//! ```

mod control;
mod core;
mod liveness;
mod slot;
mod table;
mod timers;

pub use control::ControlEvent;
pub use self::core::{Controller, FleetReport};
pub use liveness::LivenessMonitor;
pub use slot::{ExitClass, Fault, WorkerId, WorkerStatus};
pub use table::SlotTable;
pub use timers::{ScopedTimer, TimerEvent};
