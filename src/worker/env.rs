use std::time::Duration;

use crate::error::WorkerError;
use crate::process::{ENV_HEARTBEAT_MS, ENV_HEARTBEAT_PINGS, ENV_UNCAUGHT_EXIT_CODE, ENV_WORKER_ID};

/// Settings the master passes to a worker through its environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEnv {
    /// Sequence number of this worker.
    pub sequence: usize,
    /// Heartbeat interval expected by the master (zero = no pings).
    pub heartbeat_interval: Duration,
    /// Pings per interval.
    pub heartbeat_pings: u32,
    /// Exit code for unrecoverable failures.
    pub uncaught_exception_exit_code: i32,
}

impl WorkerEnv {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, WorkerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`.
    ///
    /// Only `WORKER_ID` is required; the rest fall back to "no heartbeat" and
    /// exit code 100.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, WorkerError> {
        let sequence = lookup(ENV_WORKER_ID).ok_or(WorkerError::MissingEnv { var: ENV_WORKER_ID })?;
        let sequence = parse(ENV_WORKER_ID, sequence)?;

        let heartbeat_ms: u64 = lookup(ENV_HEARTBEAT_MS)
            .map(|v| parse(ENV_HEARTBEAT_MS, v))
            .transpose()?
            .unwrap_or(0);
        let heartbeat_pings = lookup(ENV_HEARTBEAT_PINGS)
            .map(|v| parse(ENV_HEARTBEAT_PINGS, v))
            .transpose()?
            .unwrap_or(1);
        let uncaught_exception_exit_code = lookup(ENV_UNCAUGHT_EXIT_CODE)
            .map(|v| parse(ENV_UNCAUGHT_EXIT_CODE, v))
            .transpose()?
            .unwrap_or(100);

        Ok(Self {
            sequence,
            heartbeat_interval: Duration::from_millis(heartbeat_ms),
            heartbeat_pings,
            uncaught_exception_exit_code,
        })
    }

    /// Period between two `liveness-ping`s, `None` when pings are off.
    pub fn ping_period(&self) -> Option<Duration> {
        if self.heartbeat_interval.is_zero() {
            None
        } else {
            Some(self.heartbeat_interval / self.heartbeat_pings.max(1))
        }
    }
}

fn parse<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, WorkerError> {
    value
        .trim()
        .parse()
        .map_err(|_| WorkerError::InvalidEnv { var, value })
}
