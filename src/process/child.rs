//! [`Launcher`] backed by real OS processes.
//!
//! Each worker gets three tasks:
//! - **writer**: drains the outbox into the child's stdin; dropping the outbox
//!   closes stdin, which the worker sees as a disconnect.
//! - **reader**: splits stdout into lines; envelopes go to the controller, any
//!   other line is logged as worker output.
//! - **waiter**: reaps the child, lets the reader drain, then reports the exit.
//!
//! `online` is reported as soon as the process is spawned. Once the waiter has
//! reaped the child its pid may be reused, so the link stops signalling it.
//!
//! stderr is inherited so worker diagnostics land next to the master's.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::WorkerError;
use crate::ipc::{Envelope, Outbound};

use super::exit::ExitInfo;
use super::kill::terminate_tree;
use super::launcher::{LaunchSpec, Launcher, WorkerEvents, WorkerLink};

/// How long the waiter lets the reader flush stdout after the process exits.
const OUTPUT_DRAIN: Duration = Duration::from_secs(1);

/// Spawns workers from a program path, arguments and extra environment.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    current_dir: Option<PathBuf>,
}

impl ProcessLauncher {
    /// Launcher for `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
        }
    }

    /// Launcher that re-executes the current binary (worker mode is selected by args).
    pub fn current_exe() -> Result<Self, WorkerError> {
        let exe = std::env::current_exe().map_err(|e| WorkerError::Spawn {
            reason: format!("failed to get current executable: {e}"),
        })?;
        Ok(Self::new(exe))
    }

    /// Appends an argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Adds an environment variable for every worker.
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Working directory of the workers.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    fn command(&self, spec: &LaunchSpec) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .envs(spec.env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .process_group(0);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl Launcher for ProcessLauncher {
    fn launch(
        &self,
        spec: &LaunchSpec,
        events: WorkerEvents,
    ) -> Result<Box<dyn WorkerLink>, WorkerError> {
        let mut child = self.command(spec).spawn().map_err(|e| WorkerError::Spawn {
            reason: format!("{}: {e}", self.program.display()),
        })?;
        let pid = child.id();

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.start_kill();
                return Err(WorkerError::Spawn {
                    reason: "child stdio not captured".into(),
                });
            }
        };

        events.online();

        let (outbox, rx) = mpsc::unbounded_channel();
        let reaped = Arc::new(AtomicBool::new(false));
        tokio::spawn(write_loop(stdin, rx, spec.sequence));
        let reader = tokio::spawn(read_loop(stdout, events.clone()));
        tokio::spawn(wait_loop(child, reader, events, reaped.clone()));

        debug!(sequence = spec.sequence, pid, program = %self.program.display(), "worker process spawned");
        Ok(Box::new(ChildLink {
            pid,
            outbox: Some(outbox),
            reaped,
        }))
    }
}

struct ChildLink {
    pid: Option<u32>,
    outbox: Option<mpsc::UnboundedSender<String>>,
    /// Set by the waiter right after `wait` returns.
    reaped: Arc<AtomicBool>,
}

impl WorkerLink for ChildLink {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn send(&mut self, msg: &Outbound) -> Result<(), WorkerError> {
        let outbox = self.outbox.as_ref().ok_or(WorkerError::ChannelClosed)?;
        let line = msg.to_envelope().to_line()?;
        outbox.send(line).map_err(|_| WorkerError::ChannelClosed)
    }

    fn disconnect(&mut self) -> Result<(), WorkerError> {
        match self.outbox.take() {
            Some(outbox) if !outbox.is_closed() => Ok(()),
            _ => Err(WorkerError::ChannelClosed),
        }
    }

    fn terminate(&mut self) -> Result<(), WorkerError> {
        match self.pid {
            Some(pid) if !self.reaped.load(Ordering::Acquire) => terminate_tree(pid),
            Some(pid) => {
                debug!(pid, "worker already reaped; not signalling");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

async fn write_loop(
    mut stdin: ChildStdin,
    mut rx: mpsc::UnboundedReceiver<String>,
    sequence: usize,
) {
    while let Some(line) = rx.recv().await {
        let written = match stdin.write_all(line.as_bytes()).await {
            Ok(()) => stdin.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            debug!(sequence, error = %e, "worker stdin closed");
            return;
        }
    }
}

async fn read_loop(stdout: ChildStdout, events: WorkerEvents) {
    let sequence = events.sequence();
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match Envelope::from_line(&line) {
                    Ok(envelope) => {
                        if !events.message(envelope) {
                            return;
                        }
                    }
                    Err(_) => info!(target: "procvisor::worker", sequence, "{line}"),
                }
            }
            Ok(None) => return,
            Err(e) => {
                debug!(sequence, error = %e, "worker stdout read failed");
                return;
            }
        }
    }
}

async fn wait_loop(
    mut child: Child,
    reader: JoinHandle<()>,
    events: WorkerEvents,
    reaped: Arc<AtomicBool>,
) {
    let exit = match child.wait().await {
        Ok(status) => ExitInfo::from(status),
        Err(e) => {
            warn!(sequence = events.sequence(), error = %e, "failed to reap worker");
            ExitInfo::unknown()
        }
    };
    reaped.store(true, Ordering::Release);

    // Messages written right before exit (an error report) must reach the
    // controller before the exit does.
    let abort = reader.abort_handle();
    if tokio::time::timeout(OUTPUT_DRAIN, reader).await.is_err() {
        abort.abort();
    }
    events.exited(exit);
}
