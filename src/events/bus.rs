//! Broadcast bus carrying [`Event`]s out of the controller.
//!
//! ```text
//!   Controller ─────┐
//!   Supervisor ─────┼──► Bus ──► subscriber_listener ──► SubscriberSet
//!   SubscriberSet ──┘        └──► Supervisor::subscribe / SupervisorHandle::subscribe
//! ```
//!
//! Publishing never waits. All receivers share one ring buffer of
//! `Config::bus_capacity` events; a receiver that falls behind gets
//! `RecvError::Lagged` and loses the oldest ones. Nothing is stored when there
//! are no receivers.

use tokio::sync::broadcast;

use super::event::Event;

/// Cloneable publishing end of the event stream.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Bus holding up to `capacity` undelivered events (at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Sends `ev` to every current receiver. Dropped silently if there are none.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Receiver for events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
