//! # Global runtime configuration.
//!
//! Provides [`Config`] centralized settings for the supervisor, controller, circuit breaker
//! and liveness monitor.
//!
//! ## Sentinel values
//! - `graceful_timeout = 0s` → stop requests force-kill immediately (no shutdown timer)
//! - `heartbeat_interval = 0s` → liveness monitor disabled, workers do not ping

use std::time::Duration;

use crate::error::RuntimeError;

/// Global configuration for the supervisor runtime.
///
/// ## Field semantics
/// - `instances`: Workers started by [`Supervisor::run`](crate::Supervisor::run)
/// - `graceful_timeout`: Time a stopping worker gets before it is force-killed
/// - `failure_threshold`: Abnormal exits within `failure_window` that stop the whole fleet
/// - `failure_window`: Rolling window of the circuit breaker
/// - `heartbeat_interval`: Liveness monitor tick (`0s` = disabled)
/// - `zombie_factor`: An online worker silent for `heartbeat_interval × zombie_factor` is a zombie
/// - `heartbeat_pings`: Pings a worker sends per `heartbeat_interval`
/// - `uncaught_exception_exit_code`: Exit status reserved for crashed workers
/// - `bus_capacity`: Event bus ring buffer size (min 1)
/// - `command_capacity`: Handle command queue size (min 1)
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of workers spawned when the supervisor starts.
    pub instances: usize,

    /// Maximum time a worker gets to exit after a shutdown command.
    ///
    /// - `Duration::ZERO` = SIGTERM the process group right away
    /// - `> 0` = send `shutdown`, disconnect, force-kill when the timer fires
    pub graceful_timeout: Duration,

    /// Number of abnormal exits inside one window that escalates to a fleet stop.
    ///
    /// Must be at least 1.
    pub failure_threshold: u32,

    /// Length of the circuit breaker window, started by the first failure.
    pub failure_window: Duration,

    /// Liveness detection interval.
    ///
    /// - `Duration::ZERO` = no liveness monitor
    /// - `> 0` = scan every interval
    pub heartbeat_interval: Duration,

    /// Multiplier of `heartbeat_interval` after which a silent online worker is a zombie.
    pub zombie_factor: u32,

    /// Pings per interval requested from workers (passed via environment).
    pub heartbeat_pings: u32,

    /// Exit status a worker uses after an unrecoverable crash.
    pub uncaught_exception_exit_code: i32,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Capacity of the handle command queue.
    pub command_capacity: usize,
}

impl Config {
    /// Returns the graceful timeout as an `Option`.
    ///
    /// - `None` → kill immediately
    /// - `Some(d)` → wait up to `d`
    #[inline]
    pub fn graceful_timeout(&self) -> Option<Duration> {
        if self.graceful_timeout.is_zero() {
            None
        } else {
            Some(self.graceful_timeout)
        }
    }

    /// Returns the liveness tick interval as an `Option` (`None` = disabled).
    #[inline]
    pub fn liveness_interval(&self) -> Option<Duration> {
        if self.heartbeat_interval.is_zero() {
            None
        } else {
            Some(self.heartbeat_interval)
        }
    }

    /// Returns how long an online worker may stay silent before it is a zombie.
    #[inline]
    pub fn zombie_after(&self) -> Duration {
        self.heartbeat_interval
            .saturating_mul(self.zombie_factor.max(1))
    }

    /// Returns the period at which workers send `liveness-ping`.
    ///
    /// `None` when the liveness monitor is disabled.
    #[inline]
    pub fn ping_period(&self) -> Option<Duration> {
        self.liveness_interval()
            .map(|every| every / self.heartbeat_pings.max(1))
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns a command queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn command_capacity_clamped(&self) -> usize {
        self.command_capacity.max(1)
    }

    /// Checks the values that have no meaningful sentinel.
    ///
    /// # Errors
    /// [`RuntimeError::InvalidConfig`] when `instances` or `failure_threshold`
    /// is 0, or `failure_window` is zero.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.instances == 0 {
            return Err(RuntimeError::InvalidConfig {
                reason: "instances must be >= 1".into(),
            });
        }
        if self.failure_threshold == 0 {
            return Err(RuntimeError::InvalidConfig {
                reason: "failure_threshold must be >= 1".into(),
            });
        }
        if self.failure_window.is_zero() {
            return Err(RuntimeError::InvalidConfig {
                reason: "failure_window must be > 0".into(),
            });
        }
        Ok(())
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `instances = 1`
    /// - `graceful_timeout = 8s`
    /// - `failure_threshold = 100` within `failure_window = 10s`
    /// - `heartbeat_interval = 60s`, `zombie_factor = 1`, `heartbeat_pings = 5`
    /// - `uncaught_exception_exit_code = 100`
    /// - `bus_capacity = 1024`, `command_capacity = 64`
    fn default() -> Self {
        Self {
            instances: 1,
            graceful_timeout: Duration::from_secs(8),
            failure_threshold: 100,
            failure_window: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(60),
            zombie_factor: 1,
            heartbeat_pings: 5,
            uncaught_exception_exit_code: 100,
            bus_capacity: 1024,
            command_capacity: 64,
        }
    }
}
