//! # Example: circuit breaker stopping a crash-looping fleet
//!
//! Every worker is `/bin/sh` exiting with the reserved uncaught-exception code.
//! With a threshold of 5 failures per 10 seconds the master gives up quickly and
//! `run` returns a report with `threshold_reached = true`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use procvisor::{Config, Event, EventKind, ProcessLauncher, Subscribe, Supervisor};

struct Printer;

#[async_trait]
impl Subscribe for Printer {
    async fn on_event(&self, ev: &Event) {
        match ev.kind {
            EventKind::WorkerForked => println!("[forked] worker={:?} pid={:?}", ev.worker, ev.pid),
            EventKind::WorkerExited => {
                println!("[exited] worker={:?} class={:?}", ev.worker, ev.class)
            }
            EventKind::ThresholdReached => println!("[threshold] count={:?}", ev.count),
            EventKind::AllWorkersStopped => println!("[all-stopped]"),
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "printer"
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cfg = Config {
        instances: 2,
        failure_threshold: 5,
        failure_window: Duration::from_secs(10),
        ..Config::default()
    };
    let launcher = Arc::new(
        ProcessLauncher::new("/bin/sh")
            .arg("-c")
            .arg("sleep 0.2; exit \"$WORKER_UNCAUGHT_EXIT_CODE\""),
    );

    let (sup, _handle) = Supervisor::builder(cfg, launcher)
        .with_subscriber(Arc::new(Printer))
        .build();

    let report = sup.run().await?;
    println!("{report:?}");
    Ok(())
}
