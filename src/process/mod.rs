//! Worker process plumbing: launching, IPC pipes, exit status and tree kill.
//!
//! - [`Launcher`] / [`WorkerLink`] are the seams the controller talks through.
//! - [`ProcessLauncher`] is the `tokio::process` implementation.
//! - [`ExitInfo`] is the raw exit status reported back to the controller.
//! - [`terminate_tree`] sends SIGTERM to a worker's process group.

mod child;
mod exit;
mod kill;
mod launcher;

pub use child::ProcessLauncher;
pub use exit::ExitInfo;
pub use kill::terminate_tree;
pub use launcher::{
    ENV_HEARTBEAT_MS, ENV_HEARTBEAT_PINGS, ENV_UNCAUGHT_EXIT_CODE, ENV_WORKER_ID, LaunchSpec,
    Launcher, WorkerEvents, WorkerLink,
};
