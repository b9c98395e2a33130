//! # Failure circuit breaker.
//!
//! Counts abnormal worker exits in a rolling window and decides whether a
//! replacement may be spawned or the whole fleet must be stopped.
//!
//! ```text
//! record_failure()
//!   count == 0          → arm window timer (generation g)
//!   count += 1
//!   count <  threshold  → Verdict::Restart
//!   count >= threshold  → first time: disarm window, Verdict::Escalate
//!                         afterwards: Verdict::Suppressed
//!
//! ControlEvent::Timer(FailureWindow(g)) → window_elapsed(g) → count = 0
//! ```
//!
//! ## Rules
//! - The window timer is armed iff `count > 0` and no escalation happened.
//! - Escalation is reported once. Exits arriving while the kill-all drains
//!   are suppressed instead of triggering another kill-all.
//! - A window event from an earlier generation is ignored.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::controller::{ControlEvent, ScopedTimer, TimerEvent};

/// Decision for one abnormal exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Under the threshold: spawn one replacement.
    Restart,
    /// Threshold reached: stop the whole fleet.
    Escalate,
    /// Escalation already in flight: do nothing.
    Suppressed,
}

/// Rolling-window counter of abnormal exits.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    window: Duration,
    count: u32,
    timer: Option<ScopedTimer>,
    generation: u64,
    escalated: bool,
}

impl CircuitBreaker {
    /// Creates a breaker that escalates on the `threshold`-th failure within `window`.
    ///
    /// A threshold of 0 behaves like 1.
    pub fn new(threshold: u32, window: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            window,
            count: 0,
            timer: None,
            generation: 0,
            escalated: false,
        }
    }

    /// Records one abnormal exit and returns what to do about it.
    ///
    /// The window timer posts into `tx`.
    pub fn record_failure(&mut self, tx: &mpsc::UnboundedSender<ControlEvent>) -> Verdict {
        if self.escalated {
            self.count = self.count.saturating_add(1);
            return Verdict::Suppressed;
        }

        if self.count == 0 {
            self.generation += 1;
            self.timer = Some(ScopedTimer::once(
                self.window,
                TimerEvent::FailureWindow(self.generation),
                tx,
            ));
        }
        self.count += 1;

        if self.count >= self.threshold {
            self.timer = None;
            self.escalated = true;
            Verdict::Escalate
        } else {
            Verdict::Restart
        }
    }

    /// Resets the count if `generation` is the currently armed window.
    ///
    /// Returns `true` if the count was reset.
    pub fn window_elapsed(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.timer.is_none() {
            return false;
        }
        self.timer = None;
        self.count = 0;
        true
    }

    /// Failures counted in the current window.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// True once the threshold was reached.
    pub fn is_escalated(&self) -> bool {
        self.escalated
    }

    /// True while a window timer is pending.
    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }
}
