//! IPC protocol between the master and its workers.
//!
//! Messages are newline-delimited JSON [`Envelope`]s. The master writes to the
//! worker's stdin and reads the worker's stdout; stderr is left to the application.
//! Envelopes are decoded into [`Inbound`] / [`Outbound`] at the boundary so the
//! controller matches on enums, never on strings.
//!
//! Routing of inbound messages lives in [`Controller::dispatch`](crate::controller::Controller).

mod envelope;
mod message;

pub use envelope::Envelope;
pub use message::{
    DIRECTED_PREFIX, ERROR_REPORT, Inbound, LIVENESS_PING, Outbound, SET_LOG_LEVEL,
    SHUTDOWN, Target,
};
