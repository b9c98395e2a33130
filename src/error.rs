//! Error types used by the procvisor runtime, its process plumbing and handles.
//!
//! This module defines three enums:
//!
//! - [`RuntimeError`] errors raised by the supervisor loop itself.
//! - [`WorkerError`] errors raised while spawning, messaging or killing a worker process.
//! - [`HandleError`] errors returned by [`SupervisorHandle`](crate::SupervisorHandle) calls.
//!
//! Worker failures are never fatal to the supervisor: the controller turns them into
//! [`Event`](crate::Event)s and keeps going. Only [`RuntimeError`] ends [`Supervisor::run`](crate::Supervisor::run).

use thiserror::Error;

/// # Errors produced by the supervisor runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration rejected by [`Config::validate`](crate::Config::validate).
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What was wrong with the configuration.
        reason: String,
    },

    /// OS signal listeners could not be registered.
    #[error("failed to register shutdown signal handlers: {source}")]
    Signal {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use procvisor::RuntimeError;
    ///
    /// let err = RuntimeError::InvalidConfig { reason: "failure_threshold must be >= 1".into() };
    /// assert_eq!(err.as_label(), "runtime_invalid_config");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::InvalidConfig { .. } => "runtime_invalid_config",
            RuntimeError::Signal { .. } => "runtime_signal",
        }
    }
}

/// # Errors produced by worker process plumbing.
///
/// `ChannelClosed` is the expected, fast failure when sending to a worker whose IPC
/// channel is already gone; callers swallow it or fall back to a force kill.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The worker process could not be started.
    #[error("failed to spawn worker: {reason}")]
    Spawn {
        /// Launcher-provided failure message.
        reason: String,
    },

    /// The IPC channel to the worker is closed (disconnected or process gone).
    #[error("worker ipc channel closed")]
    ChannelClosed,

    /// Delivering the termination signal failed.
    #[error("failed to kill worker process group {pid}: {reason}")]
    Kill {
        /// Process (group) id the signal was addressed to.
        pid: u32,
        /// OS error description.
        reason: String,
    },

    /// A required worker environment variable is not set.
    #[error("environment variable {var} is not set")]
    MissingEnv {
        /// Variable name.
        var: &'static str,
    },

    /// A worker environment variable has an unparseable value.
    #[error("environment variable {var} has invalid value {value:?}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// The raw value.
        value: String,
    },

    /// I/O error on the IPC pipes.
    #[error("ipc i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed IPC envelope.
    #[error("ipc decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl WorkerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use procvisor::WorkerError;
    ///
    /// assert_eq!(WorkerError::ChannelClosed.as_label(), "worker_channel_closed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerError::Spawn { .. } => "worker_spawn",
            WorkerError::ChannelClosed => "worker_channel_closed",
            WorkerError::Kill { .. } => "worker_kill",
            WorkerError::MissingEnv { .. } => "worker_missing_env",
            WorkerError::InvalidEnv { .. } => "worker_invalid_env",
            WorkerError::Io(_) => "worker_io",
            WorkerError::Decode(_) => "worker_decode",
        }
    }
}

/// # Errors returned by [`SupervisorHandle`](crate::SupervisorHandle).
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleError {
    /// The supervisor loop has finished (fleet drained) or was dropped.
    #[error("supervisor is no longer running")]
    Closed,
}
