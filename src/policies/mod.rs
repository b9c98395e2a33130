//! Restart policies.
//!
//! ## Contents
//! - [`CircuitBreaker`] rolling-window failure counter deciding restart vs fleet stop
//! - [`Verdict`] its decision for one abnormal exit
//!
//! ## Defaults
//! - threshold 100 failures within a 10s window (see [`Config`](crate::Config)).

mod breaker;

pub use breaker::{CircuitBreaker, Verdict};
