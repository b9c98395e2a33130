//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by the controller, the supervisor loop
//! and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Controller` (worker and fleet decisions), `Supervisor` (shutdown signal),
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: `Supervisor::subscriber_listener()` fans out to `SubscriberSet`;
//!   embedders may call [`Supervisor::subscribe`](crate::Supervisor::subscribe) directly.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
