//! Worker-side runtime.
//!
//! A worker binary started by [`ProcessLauncher`](crate::ProcessLauncher) calls
//! [`WorkerContext::from_env`] once and then serves [`Delivery`]s until its
//! shutdown token fires.
//!
//! ```no_run
//! use procvisor::worker::{Delivery, WorkerContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut ctx = WorkerContext::from_env()?;
//!     ctx.install_panic_hook();
//!     let stop = ctx.shutdown_token();
//!     loop {
//!         tokio::select! {
//!             _ = stop.cancelled() => break,
//!             msg = ctx.recv() => match msg {
//!                 Some(Delivery::Payload(env)) => eprintln!("got {}", env.cmd),
//!                 Some(Delivery::LogLevel(level)) => eprintln!("log level {level}"),
//!                 None => break,
//!             },
//!         }
//!     }
//!     ctx.close().await;
//!     Ok(())
//! }
//! ```

mod context;
mod env;

pub use context::{Delivery, WorkerContext};
pub use env::WorkerEnv;
