use std::io::Write;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::WorkerError;
use crate::ipc::{Envelope, Inbound, Outbound, Target};

use super::env::WorkerEnv;

/// Something the master sent to this worker.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// Application message (broadcast or directed).
    Payload(Envelope),
    /// New log level requested by the master.
    LogLevel(String),
}

/// Worker end of the IPC channel.
///
/// Created once per worker process. Keeps the master's liveness monitor fed
/// and turns incoming lines into [`Delivery`] values. The master marks the
/// worker online on its own once the process runs.
/// The [`shutdown_token`](Self::shutdown_token) fires when the master asks the
/// worker to stop or goes away; the worker should then finish and exit.
pub struct WorkerContext {
    env: WorkerEnv,
    outbox: mpsc::UnboundedSender<String>,
    inbox: mpsc::UnboundedReceiver<Delivery>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl WorkerContext {
    /// Connects over stdin/stdout using the environment set by the master.
    ///
    /// Must be called inside a tokio runtime.
    pub fn from_env() -> Result<Self, WorkerError> {
        let env = WorkerEnv::from_env()?;
        Ok(Self::connect(env, tokio::io::stdin(), tokio::io::stdout()))
    }

    /// Connects over an arbitrary reader/writer pair.
    pub fn connect<R, W>(env: WorkerEnv, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbox, out_rx) = mpsc::unbounded_channel();
        let (in_tx, inbox) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let mut tasks = vec![
            tokio::spawn(write_loop(writer, out_rx)),
            tokio::spawn(read_loop(reader, in_tx, shutdown.clone())),
        ];
        if let Some(period) = env.ping_period() {
            tasks.push(tokio::spawn(ping_loop(
                period,
                outbox.clone(),
                shutdown.clone(),
            )));
        }

        Self {
            env,
            outbox,
            inbox,
            shutdown,
            tasks,
        }
    }

    /// Sequence number of this worker.
    pub fn sequence(&self) -> usize {
        self.env.sequence
    }

    /// Settings received from the master.
    pub fn env(&self) -> &WorkerEnv {
        &self.env
    }

    /// Cancelled on `shutdown` or when the master disconnects.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Next message from the master. `None` once the master disconnected.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.inbox.recv().await
    }

    /// Sends a raw envelope to the master.
    pub fn send(&self, envelope: Envelope) -> Result<(), WorkerError> {
        let line = envelope.to_line()?;
        self.outbox
            .send(line)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    /// Asks the master to forward `data` to `target`.
    pub fn send_to(&self, target: Target, data: impl Into<Value>) -> Result<(), WorkerError> {
        self.send(Envelope::new(target.command()).with_data(data))
    }

    /// Reports a fatal error. The master will count this worker's exit as failed.
    pub fn report_error(&self, message: impl Into<String>) -> Result<(), WorkerError> {
        self.send(Inbound::ErrorReport(message.into()).to_envelope())
    }

    /// Exits the process with the uncaught-exception code after reporting `message`.
    ///
    /// Writes straight to stdout so the report is not lost in the outbox.
    pub fn crash(&self, message: &str) -> ! {
        report_and_exit(message, self.env.uncaught_exception_exit_code)
    }

    /// Installs a panic hook that reports the panic and exits with the
    /// uncaught-exception code.
    pub fn install_panic_hook(&self) {
        let code = self.env.uncaught_exception_exit_code;
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            previous(info);
            report_and_exit(&info.to_string(), code);
        }));
    }

    /// Flushes pending output and stops the background tasks.
    pub async fn close(self) {
        let Self {
            outbox,
            shutdown,
            mut tasks,
            ..
        } = self;
        shutdown.cancel();
        drop(outbox);

        // The writer ends once every outbox clone is gone; the rest are aborted.
        let writer = tasks.remove(0);
        for task in &tasks {
            task.abort();
        }
        let _ = writer.await;
    }
}

fn report_and_exit(message: &str, code: i32) -> ! {
    if let Ok(line) = Inbound::ErrorReport(message.to_string()).to_envelope().to_line() {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(line.as_bytes());
        let _ = out.flush();
    }
    std::process::exit(code)
}

async fn write_loop<W: AsyncWrite + Unpin>(mut writer: W, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = rx.recv().await {
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            debug!(error = %e, "master channel closed");
            return;
        }
        let _ = writer.flush().await;
    }
}

async fn read_loop<R: AsyncRead + Unpin>(
    reader: R,
    tx: mpsc::UnboundedSender<Delivery>,
    shutdown: CancellationToken,
) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "failed to read from master");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let envelope = match Envelope::from_line(&line) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "malformed message from master");
                continue;
            }
        };
        let delivery = match Outbound::decode(envelope) {
            Outbound::Shutdown => {
                debug!("shutdown requested by master");
                shutdown.cancel();
                continue;
            }
            Outbound::SetLogLevel(level) => Delivery::LogLevel(level),
            Outbound::Payload(envelope) => Delivery::Payload(envelope),
        };
        let _ = tx.send(delivery);
    }
    debug!("master disconnected");
    shutdown.cancel();
}

async fn ping_loop(
    period: std::time::Duration,
    outbox: mpsc::UnboundedSender<String>,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {
                let Ok(line) = Inbound::LivenessPing.to_envelope().to_line() else {
                    return;
                };
                if outbox.send(line).is_err() {
                    return;
                }
            }
        }
    }
}
