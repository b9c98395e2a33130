use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    core::Config,
    events::Bus,
    process::Launcher,
    subscribers::{Subscribe, SubscriberSet},
};

use super::{
    handle::{LogLevelHook, SupervisorHandle},
    supervisor::Supervisor,
};

/// Builder for constructing a Supervisor with optional features.
pub struct SupervisorBuilder {
    cfg: Config,
    launcher: Arc<dyn Launcher>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    handle_signals: bool,
    log_level: Option<LogLevelHook>,
}

impl SupervisorBuilder {
    /// Creates a new builder with the given configuration and worker launcher.
    pub fn new(cfg: Config, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            cfg,
            launcher,
            subscribers: Vec::new(),
            handle_signals: true,
            log_level: None,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (worker lifecycle, fleet decisions)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Adds one subscriber.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Whether SIGINT/SIGTERM/SIGQUIT stop the fleet (default `true`).
    ///
    /// Embedders that handle signals themselves can turn this off and call
    /// [`SupervisorHandle::shutdown`] instead.
    pub fn with_signals(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    /// Called with the new level whenever
    /// [`SupervisorHandle::set_log_level`] runs, before workers are told.
    ///
    /// With the `logging` feature, call `LogReload::set_level` from it
    /// (the value returned by `logging::init`).
    pub fn with_log_level_hook(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.log_level = Some(Arc::new(hook));
        self
    }

    /// Builds the supervisor and its handle.
    ///
    /// Must be called inside a tokio runtime (subscriber workers are spawned here).
    pub fn build(self) -> (Supervisor, SupervisorHandle) {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(self.subscribers, bus.clone());
        let (tx, rx) = mpsc::channel(self.cfg.command_capacity_clamped());
        let shutdown = CancellationToken::new();

        let handle = SupervisorHandle::new(tx, bus.clone(), shutdown.clone(), self.log_level);
        let sup = Supervisor::new_internal(
            self.cfg,
            bus,
            subs,
            self.launcher,
            rx,
            shutdown,
            self.handle_signals,
        );
        (sup, handle)
    }
}
