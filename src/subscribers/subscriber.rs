//! The [`Subscribe`] extension point.
//!
//! Implement it to get every runtime [`Event`] delivered to your own code
//! (metrics, alerting, audit). [`SubscriberSet`](super::SubscriberSet) gives
//! each implementation its own queue and worker task, so a slow or panicking
//! subscriber only hurts itself. Events arrive in publish order.
//!
//! A full queue drops the event for that subscriber only and publishes
//! `EventKind::SubscriberOverflow`.
//!
//! ```rust
//! use async_trait::async_trait;
//! use procvisor::{Event, EventKind, Subscribe};
//!
//! struct CrashCounter;
//!
//! #[async_trait]
//! impl Subscribe for CrashCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::WorkerExited && ev.is_error_exit() {
//!             // bump a counter, page someone, etc.
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "crash-counter" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Receiver of runtime events.
///
/// `on_event` runs on the subscriber's own task, never on the controller's.
/// Keep it non-blocking; a panic is caught and reported as
/// `EventKind::SubscriberPanicked`.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow/panic events. Defaults to the type name.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Queue length for this subscriber (at least 1). Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
