//! Runtime core: configuration, supervisor loop and its handle.
//!
//! The public API from this module is [`Supervisor`] (built through
//! [`SupervisorBuilder`]), its [`SupervisorHandle`] and [`Config`].
//!
//! Internal modules:
//! - [`supervisor`]: drives the controller, fans out events, reacts to signals;
//! - [`handle`]: commands sent from [`SupervisorHandle`] into the loop;
//! - [`shutdown`]: unix termination signal listeners.

mod builder;
mod config;
mod handle;
mod shutdown;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use config::Config;
pub use handle::SupervisorHandle;
pub use supervisor::Supervisor;
