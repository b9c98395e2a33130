//! Zombie detection.
//!
//! On every [`TimerEvent::LivenessTick`] the controller asks the monitor which
//! `Online` workers have been silent for longer than `zombie_after`. Workers
//! still `Launching` are never flagged; they have not had a chance to ping yet.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::control::ControlEvent;
use super::slot::WorkerStatus;
use super::timers::{ScopedTimer, TimerEvent};

/// Periodic heartbeat scanner. Disabled when constructed without an interval.
#[derive(Debug)]
pub struct LivenessMonitor {
    interval: Option<Duration>,
    zombie_after: Duration,
    ticker: Option<ScopedTimer>,
}

impl LivenessMonitor {
    /// Creates a stopped monitor.
    pub fn new(interval: Option<Duration>, zombie_after: Duration) -> Self {
        Self {
            interval,
            zombie_after,
            ticker: None,
        }
    }

    /// Starts ticking. No-op when disabled or already running.
    pub fn start(&mut self, tx: &mpsc::UnboundedSender<ControlEvent>) {
        if self.ticker.is_some() {
            return;
        }
        if let Some(interval) = self.interval {
            self.ticker = Some(ScopedTimer::every(interval, TimerEvent::LivenessTick, tx));
        }
    }

    /// Stops ticking.
    pub fn stop(&mut self) {
        self.ticker = None;
    }

    /// True while the tick timer is running.
    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Sequences of online workers whose last heartbeat is older than the threshold.
    pub fn scan<I>(&self, workers: I, now: Instant) -> Vec<usize>
    where
        I: IntoIterator<Item = (usize, WorkerStatus, Instant)>,
    {
        workers
            .into_iter()
            .filter(|(_, status, last)| {
                *status == WorkerStatus::Online
                    && now.saturating_duration_since(*last) > self.zombie_after
            })
            .map(|(sequence, _, _)| sequence)
            .collect()
    }
}
