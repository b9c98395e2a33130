//! # Example: a small fleet that re-executes this binary as its workers
//!
//! Run with `cargo run --example fleet` and press Ctrl-C to stop.
//!
//! - The master starts 3 workers and logs every event through `LogWriter`.
//! - Each worker greets worker 0 through a directed message, echoes what it
//!   receives to stderr, and exits when the master says so.
//! - Worker 2 crashes 3 seconds after every start to show replacements being forked.

use std::sync::Arc;
use std::time::Duration;

use procvisor::worker::{Delivery, WorkerContext};
use procvisor::{Config, Envelope, LogWriter, ProcessLauncher, Subscribe, Supervisor, Target};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    if std::env::var_os(procvisor::process::ENV_WORKER_ID).is_some() {
        return worker().await;
    }

    let reload =
        procvisor::logging::init(procvisor::logging::LogConfig::default().with_env_overrides());

    let cfg = Config {
        instances: 3,
        graceful_timeout: Duration::from_secs(3),
        heartbeat_interval: Duration::from_secs(5),
        ..Config::default()
    };
    let launcher = Arc::new(ProcessLauncher::current_exe()?);
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];

    let (sup, handle) = Supervisor::builder(cfg, launcher)
        .with_subscribers(subs)
        .with_log_level_hook(move |level| {
            if let Err(e) = reload.set_level(level) {
                eprintln!("[master] {e}");
            }
        })
        .build();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        if let Ok(n) = handle.set_log_level("debug").await {
            println!("[master] log level changed here and in {n} workers");
        }
        if let Ok(n) = handle
            .broadcast(Envelope::new("announce").with_data("hello from master"))
            .await
        {
            println!("[master] broadcast reached {n} workers");
        }
        if let Ok(statuses) = handle.statuses().await {
            println!("[master] statuses: {statuses:?}");
        }
    });

    let report = sup.run().await?;
    println!("[master] done: {report:?}");
    std::process::exit(if report.is_abnormal() { 1 } else { 0 });
}

async fn worker() -> anyhow::Result<()> {
    let mut ctx = WorkerContext::from_env()?;
    ctx.install_panic_hook();
    let me = ctx.sequence();
    let stop = ctx.shutdown_token();

    if me != 0 {
        ctx.send_to(Target::Sequence(0), format!("hi from worker {me}"))?;
    }

    let crash = tokio::time::sleep(Duration::from_secs(3));
    tokio::pin!(crash);

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = &mut crash, if me == 2 => ctx.crash("demo crash"),
            msg = ctx.recv() => match msg {
                Some(Delivery::Payload(env)) => {
                    eprintln!("[worker {me}] {} {:?}", env.cmd, env.data);
                }
                Some(Delivery::LogLevel(level)) => eprintln!("[worker {me}] log level -> {level}"),
                None => break,
            },
        }
    }
    ctx.close().await;
    Ok(())
}
