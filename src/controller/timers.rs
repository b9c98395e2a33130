//! Controller timers as channel events.
//!
//! A timer is a spawned task that sleeps and then posts [`ControlEvent::Timer`]
//! into the controller channel. The returned [`ScopedTimer`] aborts the task when
//! dropped, so a timer can never outlive the state that owns it.
//!
//! An abort can race with a timer that already fired and is sitting in the
//! channel; receivers check the event's [`WorkerId`] or breaker generation and
//! drop stale ones.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::control::ControlEvent;
use super::slot::WorkerId;

/// What fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Graceful shutdown of this worker timed out.
    GracefulTimeout(WorkerId),
    /// The breaker window armed with this generation elapsed.
    FailureWindow(u64),
    /// Liveness scan is due.
    LivenessTick,
}

/// Owned handle of a pending timer. Dropping it cancels the timer.
#[derive(Debug)]
pub struct ScopedTimer {
    task: JoinHandle<()>,
}

impl ScopedTimer {
    /// Fires `event` once after `after`.
    pub fn once(
        after: Duration,
        event: TimerEvent,
        tx: &mpsc::UnboundedSender<ControlEvent>,
    ) -> Self {
        let tx = tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(ControlEvent::Timer(event));
        });
        Self { task }
    }

    /// Fires `event` every `period`, first after one period.
    pub fn every(
        period: Duration,
        event: TimerEvent,
        tx: &mpsc::UnboundedSender<ControlEvent>,
    ) -> Self {
        let tx = tx.clone();
        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(ControlEvent::Timer(event)).is_err() {
                    return;
                }
            }
        });
        Self { task }
    }

    /// Cancels the timer. Same as dropping it.
    pub fn cancel(self) {}
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn once_fires_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _timer = ScopedTimer::once(Duration::from_secs(8), TimerEvent::LivenessTick, &tx);

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(matches!(
            rx.try_recv(),
            Ok(ControlEvent::Timer(TimerEvent::LivenessTick))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_cancels() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timer = ScopedTimer::once(Duration::from_secs(1), TimerEvent::FailureWindow(3), &tx);
        timer.cancel();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn every_ticks_repeatedly() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _timer = ScopedTimer::every(Duration::from_secs(10), TimerEvent::LivenessTick, &tx);

        tokio::time::sleep(Duration::from_secs(35)).await;
        let mut ticks = 0;
        while rx.try_recv().is_ok() {
            ticks += 1;
        }
        assert_eq!(ticks, 3);
    }
}
