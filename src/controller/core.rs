//! # Worker lifecycle controller.
//!
//! [`Controller`] owns every piece of mutable fleet state: the slot table, the
//! worker records, the circuit breaker and the liveness monitor. It is driven by
//! exactly one task (the supervisor loop), so none of it needs a lock.
//!
//! ## Architecture
//! ```text
//!  SupervisorHandle ──► start_workers / stop_worker / kill_all / broadcast
//!                                   │
//!  worker tasks ──► ControlEvent ───┤──► Controller ──► Launcher / WorkerLink
//!  timers      ──►  (one channel)   │        │
//!                                   │        └──► Bus (Event)
//!                                handle()
//! ```
//!
//! ## Exit policy
//! Every process exit goes through [`Controller::on_exit`]:
//! 1. classify ([`ExitClass`]): reported error, flag, or reserved exit code;
//! 2. publish [`EventKind::WorkerExited`];
//! 3. drop the slot (cancels its shutdown timer) and free the sequence;
//! 4. unless it was a clean requested stop, ask the breaker:
//!    restart one, escalate to [`Controller::kill_all`], or do nothing;
//! 5. if nothing is left, stop the liveness monitor and publish
//!    [`EventKind::AllWorkersStopped`] once.
//!
//! ## Rules
//! - Events carry the [`WorkerId`] of the spawn they belong to; events from a
//!   previous occupant of a reused sequence are ignored.
//! - A worker whose shutdown command cannot be delivered is killed right away and
//!   its shutdown timer is dropped first, so the timer never fires after that kill.
//! - Once [`Controller::kill_all`] ran, nothing is spawned anymore.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::core::Config;
use crate::events::{Bus, Event, EventKind};
use crate::ipc::{Envelope, Inbound, Outbound, Target};
use crate::policies::{CircuitBreaker, Verdict};
use crate::process::{ExitInfo, LaunchSpec, Launcher, WorkerEvents};

use super::control::ControlEvent;
use super::liveness::LivenessMonitor;
use super::slot::{ExitClass, Fault, WorkerId, WorkerSlot, WorkerStatus};
use super::table::SlotTable;
use super::timers::{ScopedTimer, TimerEvent};

/// Outcome of a supervisor run, for the host process to pick its exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FleetReport {
    /// Exits classified as failed.
    pub abnormal_exits: u64,
    /// Exits nobody requested that carried no error indication.
    pub unrequested_exits: u64,
    /// The circuit breaker escalated to a fleet stop.
    pub threshold_reached: bool,
}

impl FleetReport {
    /// True if any failed exit was observed or the breaker escalated.
    pub fn is_abnormal(&self) -> bool {
        self.abnormal_exits > 0 || self.threshold_reached
    }
}

/// Single-writer owner of the worker fleet.
pub struct Controller {
    cfg: Config,
    launcher: Arc<dyn Launcher>,
    bus: Bus,
    tx: mpsc::UnboundedSender<ControlEvent>,

    table: SlotTable,
    workers: BTreeMap<usize, WorkerSlot>,
    breaker: CircuitBreaker,
    liveness: LivenessMonitor,

    next_id: u64,
    started: bool,
    draining: bool,
    drained: bool,
    report: FleetReport,
}

impl Controller {
    /// Creates a controller and the receiving end of its event channel.
    ///
    /// Whoever owns the controller must feed every received [`ControlEvent`]
    /// back into [`Controller::handle`].
    pub fn new(
        cfg: Config,
        launcher: Arc<dyn Launcher>,
        bus: Bus,
    ) -> (Self, mpsc::UnboundedReceiver<ControlEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let breaker = CircuitBreaker::new(cfg.failure_threshold, cfg.failure_window);
        let liveness = LivenessMonitor::new(cfg.liveness_interval(), cfg.zombie_after());
        let controller = Self {
            cfg,
            launcher,
            bus,
            tx,
            table: SlotTable::new(),
            workers: BTreeMap::new(),
            breaker,
            liveness,
            next_id: 0,
            started: false,
            draining: false,
            drained: false,
            report: FleetReport::default(),
        };
        (controller, rx)
    }

    /// Routes one control event.
    pub fn handle(&mut self, ev: ControlEvent) {
        match ev {
            ControlEvent::Online { id } => self.on_online(id),
            ControlEvent::Message { id, envelope } => self.dispatch(id, envelope),
            ControlEvent::Exited { id, exit } => self.on_exit(id, exit),
            ControlEvent::Timer(timer) => self.on_timer(timer),
        }
    }

    /// Spawns `n` workers. Returns how many were launched.
    ///
    /// Refused once the fleet is stopping.
    pub fn start_workers(&mut self, n: usize) -> usize {
        if self.draining || self.drained {
            warn!(n, "fleet is stopping; not starting workers");
            return 0;
        }
        self.started = true;

        let launched = (0..n).filter(|_| self.spawn_worker()).count();
        if launched > 0 {
            self.liveness.start(&self.tx);
        }
        self.check_drained();
        launched
    }

    /// Asks one worker to stop. Returns `false` unless it was launching or online.
    ///
    /// With `mark_error` the eventual exit counts as failed.
    pub fn stop_worker(&mut self, sequence: usize, mark_error: bool) -> bool {
        let graceful = self.cfg.graceful_timeout();
        let Some(slot) = self.workers.get_mut(&sequence) else {
            return false;
        };
        if !slot.is_stoppable() {
            return false;
        }

        self.bus.publish(
            Event::new(EventKind::KillingWorker)
                .with_worker(sequence)
                .with_pid(slot.pid()),
        );
        slot.status = WorkerStatus::Stopping;
        slot.stop_requested = true;
        if mark_error && slot.fault.is_none() {
            slot.fault = Some(Fault::Flagged);
        }

        let Some(timeout) = graceful else {
            force_kill(&self.bus, slot);
            return true;
        };

        slot.shutdown_timer = Some(ScopedTimer::once(
            timeout,
            TimerEvent::GracefulTimeout(slot.id),
            &self.tx,
        ));
        let asked = slot
            .link
            .send(&Outbound::Shutdown)
            .and_then(|()| slot.link.disconnect());
        if let Err(e) = asked {
            debug!(sequence, error = %e, "shutdown not delivered; killing now");
            slot.shutdown_timer = None;
            force_kill(&self.bus, slot);
        }
        true
    }

    /// Stops every occupied slot. No worker is spawned afterwards.
    pub fn kill_all(&mut self) {
        self.bus.publish(Event::new(EventKind::KillingAllWorkers));
        self.draining = true;

        let occupied: Vec<usize> = self.table.occupied().collect();
        for sequence in occupied {
            self.stop_worker(sequence, false);
        }
        self.check_drained();
    }

    /// Sends `msg` to every occupied slot, best effort. Returns the number of
    /// workers it was queued for.
    pub fn broadcast(&mut self, msg: &Outbound) -> usize {
        let mut delivered = 0;
        for slot in self.workers.values_mut() {
            match slot.link.send(msg) {
                Ok(()) => delivered += 1,
                Err(e) => trace!(sequence = slot.sequence, error = %e, "broadcast skipped worker"),
            }
        }
        delivered
    }

    /// Sends `msg` to one slot, best effort.
    pub fn send_to(&mut self, sequence: usize, msg: &Outbound) -> bool {
        let Some(slot) = self.workers.get_mut(&sequence) else {
            return false;
        };
        match slot.link.send(msg) {
            Ok(()) => true,
            Err(e) => {
                trace!(sequence, error = %e, "send to worker failed");
                false
            }
        }
    }

    /// Applies one inbound worker message.
    pub fn dispatch(&mut self, id: WorkerId, envelope: Envelope) {
        let Some(sequence) = self.sequence_of(id) else {
            trace!(%id, cmd = %envelope.cmd, "message from stale worker dropped");
            return;
        };

        // Whatever a worker says proves it is running.
        self.mark_online(sequence);

        match Inbound::decode(envelope) {
            Inbound::LivenessPing => {
                if let Some(slot) = self.workers.get_mut(&sequence) {
                    slot.last_heartbeat = Instant::now();
                }
            }
            Inbound::ErrorReport(msg) => {
                debug!(sequence, error = %msg, "worker reported an error");
                if let Some(slot) = self.workers.get_mut(&sequence) {
                    slot.fault = Some(Fault::Reported(msg));
                }
            }
            Inbound::Directed {
                target: Target::All,
                envelope,
            } => {
                let n = self.broadcast(&Outbound::Payload(envelope));
                trace!(from = sequence, delivered = n, "directed message to all");
            }
            Inbound::Directed {
                target: Target::Sequence(to),
                envelope,
            } => {
                if !self.send_to(to, &Outbound::Payload(envelope)) {
                    debug!(from = sequence, to, "directed message not delivered");
                }
            }
            Inbound::Misaddressed(target) => {
                debug!(sequence, %target, "dropping directed message with bad target");
            }
            Inbound::Unrecognized(cmd) => {
                debug!(sequence, %cmd, "ignoring unrecognized worker message");
            }
        }
    }

    /// Marks a launching worker online once its transport saw it start.
    pub fn on_online(&mut self, id: WorkerId) {
        match self.sequence_of(id) {
            Some(sequence) => self.mark_online(sequence),
            None => trace!(%id, "online of stale worker ignored"),
        }
    }

    /// Exit policy. See the module docs.
    pub fn on_exit(&mut self, id: WorkerId, exit: ExitInfo) {
        let Some(sequence) = self.sequence_of(id) else {
            trace!(%id, %exit, "exit of stale worker ignored");
            return;
        };
        let Some(mut slot) = self.workers.remove(&sequence) else {
            return;
        };

        let class = slot.classify(&exit, self.cfg.uncaught_exception_exit_code);
        slot.status = WorkerStatus::Stopped;
        slot.shutdown_timer = None;
        match class {
            ExitClass::Failed { .. } => self.report.abnormal_exits += 1,
            ExitClass::Unrequested => self.report.unrequested_exits += 1,
            ExitClass::Clean => {}
        }
        let wants_breaker = !slot.stop_requested || class.is_error();

        self.bus.publish(
            Event::new(EventKind::WorkerExited)
                .with_worker(sequence)
                .with_pid(slot.pid())
                .with_status(WorkerStatus::Stopped)
                .with_exit(exit, class),
        );
        drop(slot);
        self.table.free(sequence);

        if wants_breaker {
            self.apply_verdict(sequence);
        }
        self.check_drained();
    }

    /// Handles a fired timer. Stale timers are ignored.
    pub fn on_timer(&mut self, timer: TimerEvent) {
        match timer {
            TimerEvent::GracefulTimeout(id) => {
                let Some(slot) = self.workers.values_mut().find(|s| s.id == id) else {
                    return;
                };
                if slot.shutdown_timer.take().is_none() {
                    return;
                }
                self.bus.publish(
                    Event::new(EventKind::ForceKillWorker)
                        .with_worker(slot.sequence)
                        .with_pid(slot.pid()),
                );
                force_kill(&self.bus, slot);
            }
            TimerEvent::FailureWindow(generation) => {
                if self.breaker.window_elapsed(generation) {
                    debug!(generation, "failure window elapsed; counter reset");
                }
            }
            TimerEvent::LivenessTick => self.scan_liveness(),
        }
    }

    /// Status of one slot.
    pub fn status(&self, sequence: usize) -> Option<WorkerStatus> {
        self.workers.get(&sequence).map(|s| s.status)
    }

    /// Status of every occupied slot, by sequence.
    pub fn statuses(&self) -> Vec<(usize, WorkerStatus)> {
        self.workers.iter().map(|(seq, s)| (*seq, s.status)).collect()
    }

    /// Spawn identity currently holding `sequence`.
    pub fn worker_id(&self, sequence: usize) -> Option<WorkerId> {
        self.workers.get(&sequence).map(|s| s.id)
    }

    /// True when at least one worker runs and all of them are online.
    pub fn is_ready(&self) -> bool {
        !self.workers.is_empty()
            && self
                .workers
                .values()
                .all(|s| s.status == WorkerStatus::Online)
    }

    /// True once [`EventKind::AllWorkersStopped`] was published.
    pub fn is_drained(&self) -> bool {
        self.drained
    }

    /// True once [`Controller::kill_all`] ran.
    pub fn is_draining(&self) -> bool {
        self.draining
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// True when no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Counters collected so far.
    pub fn report(&self) -> FleetReport {
        self.report
    }

    fn sequence_of(&self, id: WorkerId) -> Option<usize> {
        self.workers
            .values()
            .find(|s| s.id == id)
            .map(|s| s.sequence)
    }

    fn mark_online(&mut self, sequence: usize) {
        let Some(slot) = self.workers.get_mut(&sequence) else {
            return;
        };
        if slot.status != WorkerStatus::Launching {
            return;
        }
        slot.status = WorkerStatus::Online;
        slot.last_heartbeat = Instant::now();
        self.bus.publish(
            Event::new(EventKind::WorkerOnline)
                .with_worker(sequence)
                .with_pid(slot.pid())
                .with_status(WorkerStatus::Online),
        );
    }

    fn spawn_worker(&mut self) -> bool {
        let sequence = self.table.allocate();
        self.next_id += 1;
        let id = WorkerId::new(self.next_id);

        let spec = LaunchSpec {
            sequence,
            heartbeat_interval: self.cfg.heartbeat_interval,
            heartbeat_pings: self.cfg.heartbeat_pings,
            uncaught_exception_exit_code: self.cfg.uncaught_exception_exit_code,
        };
        let events = WorkerEvents::new(id, sequence, self.tx.clone());

        match self.launcher.launch(&spec, events) {
            Ok(link) => {
                let slot = WorkerSlot::new(sequence, id, link);
                let pid = slot.pid();
                self.workers.insert(sequence, slot);
                debug!(sequence, %id, ?pid, "worker forked");
                self.bus.publish(
                    Event::new(EventKind::WorkerForked)
                        .with_worker(sequence)
                        .with_pid(pid)
                        .with_status(WorkerStatus::Launching),
                );
                true
            }
            Err(e) => {
                self.table.free(sequence);
                self.bus.publish(
                    Event::new(EventKind::SpawnFailed)
                        .with_worker(sequence)
                        .with_status(WorkerStatus::Errored)
                        .with_reason(e.to_string()),
                );
                false
            }
        }
    }

    fn apply_verdict(&mut self, sequence: usize) {
        match self.breaker.record_failure(&self.tx) {
            Verdict::Restart if self.draining => {
                self.bus.publish(
                    Event::new(EventKind::RestartSuppressed)
                        .with_worker(sequence)
                        .with_reason("fleet_draining"),
                );
            }
            Verdict::Restart => {
                self.spawn_worker();
            }
            Verdict::Escalate => {
                self.report.threshold_reached = true;
                warn!(
                    count = self.breaker.count(),
                    threshold = self.cfg.failure_threshold,
                    "failure threshold reached; stopping all workers"
                );
                self.bus.publish(
                    Event::new(EventKind::ThresholdReached).with_count(self.breaker.count()),
                );
                self.kill_all();
            }
            Verdict::Suppressed => {
                self.bus.publish(
                    Event::new(EventKind::RestartSuppressed)
                        .with_worker(sequence)
                        .with_reason("breaker_open"),
                );
            }
        }
    }

    fn scan_liveness(&mut self) {
        let now = Instant::now();
        let zombies = self.liveness.scan(
            self.workers
                .values()
                .map(|s| (s.sequence, s.status, s.last_heartbeat)),
            now,
        );
        for sequence in zombies {
            let pid = self.workers.get(&sequence).and_then(|s| s.pid());
            self.bus.publish(
                Event::new(EventKind::ZombieDetected)
                    .with_worker(sequence)
                    .with_pid(pid),
            );
            self.stop_worker(sequence, true);
        }
    }

    fn check_drained(&mut self) {
        if self.drained || !(self.started || self.draining) || !self.table.all_free() {
            return;
        }
        self.drained = true;
        self.liveness.stop();
        self.bus.publish(Event::new(EventKind::AllWorkersStopped));
    }
}

fn force_kill(bus: &Bus, slot: &mut WorkerSlot) {
    if let Err(e) = slot.link.terminate() {
        warn!(sequence = slot.sequence, error = %e, "failed to kill worker");
        bus.publish(
            Event::new(EventKind::KillFailed)
                .with_worker(slot.sequence)
                .with_pid(slot.pid())
                .with_reason(e.to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio::sync::broadcast;

    use super::*;
    use crate::error::WorkerError;
    use crate::process::WorkerLink;

    #[derive(Default)]
    struct FakeState {
        launched: Vec<(usize, WorkerId)>,
        sent: Vec<(usize, Outbound)>,
        disconnected: Vec<usize>,
        terminated: Vec<usize>,
        fail_spawn: bool,
        fail_send: bool,
        fail_kill: bool,
    }

    #[derive(Clone, Default)]
    struct FakeLauncher {
        state: Arc<Mutex<FakeState>>,
    }

    impl FakeLauncher {
        fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
            f(&mut self.state.lock().unwrap())
        }

        fn launches(&self) -> usize {
            self.with(|s| s.launched.len())
        }

        fn terminated(&self) -> Vec<usize> {
            self.with(|s| s.terminated.clone())
        }

        fn sent_to(&self, sequence: usize) -> Vec<Outbound> {
            self.with(|s| {
                s.sent
                    .iter()
                    .filter(|(seq, _)| *seq == sequence)
                    .map(|(_, m)| m.clone())
                    .collect()
            })
        }
    }

    impl Launcher for FakeLauncher {
        fn launch(
            &self,
            spec: &LaunchSpec,
            events: WorkerEvents,
        ) -> Result<Box<dyn WorkerLink>, WorkerError> {
            let mut st = self.state.lock().unwrap();
            if st.fail_spawn {
                return Err(WorkerError::Spawn {
                    reason: "No such file or directory".into(),
                });
            }
            st.launched.push((spec.sequence, events.id()));
            Ok(Box::new(FakeLink {
                sequence: spec.sequence,
                open: true,
                state: self.state.clone(),
            }))
        }
    }

    struct FakeLink {
        sequence: usize,
        open: bool,
        state: Arc<Mutex<FakeState>>,
    }

    impl WorkerLink for FakeLink {
        fn pid(&self) -> Option<u32> {
            Some(1000 + self.sequence as u32)
        }

        fn send(&mut self, msg: &Outbound) -> Result<(), WorkerError> {
            let mut st = self.state.lock().unwrap();
            if st.fail_send || !self.open {
                return Err(WorkerError::ChannelClosed);
            }
            st.sent.push((self.sequence, msg.clone()));
            Ok(())
        }

        fn disconnect(&mut self) -> Result<(), WorkerError> {
            if !self.open {
                return Err(WorkerError::ChannelClosed);
            }
            self.open = false;
            self.state.lock().unwrap().disconnected.push(self.sequence);
            Ok(())
        }

        fn terminate(&mut self) -> Result<(), WorkerError> {
            let mut st = self.state.lock().unwrap();
            st.terminated.push(self.sequence);
            if st.fail_kill {
                return Err(WorkerError::Kill {
                    pid: 1000 + self.sequence as u32,
                    reason: "EPERM: Operation not permitted".into(),
                });
            }
            Ok(())
        }
    }

    struct Fixture {
        ctrl: Controller,
        rx: mpsc::UnboundedReceiver<ControlEvent>,
        launcher: FakeLauncher,
        events: broadcast::Receiver<Event>,
    }

    impl Fixture {
        fn new(cfg: Config) -> Self {
            let launcher = FakeLauncher::default();
            let bus = Bus::new(256);
            let events = bus.subscribe();
            let (ctrl, rx) = Controller::new(cfg, Arc::new(launcher.clone()), bus);
            Self {
                ctrl,
                rx,
                launcher,
                events,
            }
        }

        fn id(&self, sequence: usize) -> WorkerId {
            self.ctrl.worker_id(sequence).unwrap()
        }

        fn online(&mut self, sequence: usize) {
            let id = self.id(sequence);
            self.ctrl.handle(ControlEvent::Online { id });
        }

        fn exit(&mut self, sequence: usize, code: i32) {
            let id = self.id(sequence);
            self.ctrl.on_exit(id, ExitInfo::code(code));
        }

        fn drain_events(&mut self) -> Vec<Event> {
            let mut out = Vec::new();
            while let Ok(ev) = self.events.try_recv() {
                out.push(ev);
            }
            out
        }

        fn kinds(&mut self) -> Vec<EventKind> {
            self.drain_events().into_iter().map(|e| e.kind).collect()
        }

        /// Feeds every pending control event back into the controller.
        fn pump(&mut self) {
            while let Ok(ev) = self.rx.try_recv() {
                self.ctrl.handle(ev);
            }
        }

        fn graceful_timers_pending(&mut self) -> usize {
            let mut n = 0;
            while let Ok(ev) = self.rx.try_recv() {
                if matches!(ev, ControlEvent::Timer(TimerEvent::GracefulTimeout(_))) {
                    n += 1;
                }
            }
            n
        }
    }

    fn cfg() -> Config {
        Config {
            instances: 1,
            graceful_timeout: Duration::from_secs(8),
            failure_threshold: 3,
            failure_window: Duration::from_secs(10),
            heartbeat_interval: Duration::ZERO,
            ..Config::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_assigns_sequences_and_publishes_forked() {
        let mut fx = Fixture::new(cfg());
        assert_eq!(fx.ctrl.start_workers(3), 3);

        assert_eq!(
            fx.ctrl.statuses(),
            vec![
                (0, WorkerStatus::Launching),
                (1, WorkerStatus::Launching),
                (2, WorkerStatus::Launching),
            ]
        );
        let forked: Vec<_> = fx
            .drain_events()
            .into_iter()
            .filter(|e| e.kind == EventKind::WorkerForked)
            .map(|e| (e.worker, e.pid))
            .collect();
        assert_eq!(
            forked,
            vec![
                (Some(0), Some(1000)),
                (Some(1), Some(1001)),
                (Some(2), Some(1002))
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn started_process_moves_launching_to_online() {
        let mut fx = Fixture::new(cfg());
        fx.ctrl.start_workers(2);
        assert!(!fx.ctrl.is_ready());

        fx.online(0);
        assert_eq!(fx.ctrl.status(0), Some(WorkerStatus::Online));
        assert!(!fx.ctrl.is_ready());

        fx.online(1);
        assert!(fx.ctrl.is_ready());
        assert!(fx.kinds().contains(&EventKind::WorkerOnline));
    }

    #[tokio::test(start_paused = true)]
    async fn crash_under_threshold_spawns_one_replacement() {
        let mut fx = Fixture::new(cfg());
        fx.ctrl.start_workers(1);
        let first = fx.id(0);
        fx.drain_events();

        fx.exit(0, 100);

        assert_eq!(fx.launcher.launches(), 2);
        assert_eq!(fx.ctrl.status(0), Some(WorkerStatus::Launching));
        assert_ne!(fx.id(0), first);

        let events = fx.drain_events();
        let exited = events
            .iter()
            .find(|e| e.kind == EventKind::WorkerExited)
            .unwrap();
        assert!(exited.is_error_exit());
        assert_eq!(exited.exit, Some(ExitInfo::code(100)));
        assert!(!events.iter().any(|e| e.kind == EventKind::AllWorkersStopped));
        assert_eq!(fx.ctrl.report().abnormal_exits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unrequested_clean_code_still_restarts() {
        let mut fx = Fixture::new(cfg());
        fx.ctrl.start_workers(1);
        fx.exit(0, 0);

        assert_eq!(fx.launcher.launches(), 2);
        let report = fx.ctrl.report();
        assert_eq!(report.unrequested_exits, 1);
        assert!(!report.is_abnormal());
    }

    #[tokio::test(start_paused = true)]
    async fn requested_clean_exit_is_not_replaced() {
        let mut fx = Fixture::new(cfg());
        fx.ctrl.start_workers(1);
        fx.online(0);

        assert!(fx.ctrl.stop_worker(0, false));
        assert_eq!(fx.ctrl.status(0), Some(WorkerStatus::Stopping));
        assert_eq!(fx.launcher.sent_to(0), vec![Outbound::Shutdown]);
        assert_eq!(fx.launcher.with(|s| s.disconnected.clone()), vec![0]);
        fx.drain_events();

        fx.exit(0, 0);

        assert_eq!(fx.launcher.launches(), 1);
        let events = fx.drain_events();
        let exited = events
            .iter()
            .find(|e| e.kind == EventKind::WorkerExited)
            .unwrap();
        assert_eq!(exited.class, Some(ExitClass::Clean));
        assert_eq!(
            events.last().map(|e| e.kind),
            Some(EventKind::AllWorkersStopped)
        );
        assert!(fx.ctrl.is_drained());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_noop_unless_launching_or_online() {
        let mut fx = Fixture::new(cfg());
        fx.ctrl.start_workers(1);
        assert!(fx.ctrl.stop_worker(0, false));
        assert!(!fx.ctrl.stop_worker(0, true));
        assert!(!fx.ctrl.stop_worker(7, false));
        assert_eq!(fx.launcher.sent_to(0).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn third_failure_escalates_and_fourth_is_suppressed() {
        let mut fx = Fixture::new(cfg());
        fx.ctrl.start_workers(4);
        for seq in 0..4 {
            fx.online(seq);
        }
        fx.drain_events();

        // Three crashes within two seconds. The first two are replaced.
        fx.exit(0, 100);
        tokio::time::advance(Duration::from_millis(500)).await;
        fx.exit(1, 100);
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(fx.launcher.launches(), 6);
        fx.exit(2, 100);

        let kinds = fx.kinds();
        assert!(kinds.contains(&EventKind::ThresholdReached));
        assert!(kinds.contains(&EventKind::KillingAllWorkers));
        assert_eq!(fx.launcher.launches(), 6);
        assert!(fx.ctrl.report().threshold_reached);

        // Everyone still alive got a stop request.
        for (seq, status) in fx.ctrl.statuses() {
            assert_eq!(status, WorkerStatus::Stopping, "slot {seq}");
            assert!(fx.launcher.sent_to(seq).contains(&Outbound::Shutdown));
        }

        // A fourth crash a second later is suppressed, not escalated again.
        tokio::time::advance(Duration::from_secs(1)).await;
        fx.exit(3, 100);
        let events = fx.drain_events();
        let suppressed = events
            .iter()
            .find(|e| e.kind == EventKind::RestartSuppressed)
            .unwrap();
        assert_eq!(suppressed.reason.as_deref(), Some("breaker_open"));
        assert!(!events.iter().any(|e| e.kind == EventKind::ThresholdReached));
        assert_eq!(fx.launcher.launches(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_spread_beyond_the_window_keep_restarting() {
        let mut fx = Fixture::new(cfg());
        fx.ctrl.start_workers(1);

        for _ in 0..5 {
            fx.exit(0, 100);
            fx.exit(0, 100);
            tokio::time::sleep(Duration::from_secs(11)).await;
            fx.pump();
        }

        assert!(!fx.ctrl.report().threshold_reached);
        assert_eq!(fx.launcher.launches(), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_graceful_timeout_kills_without_timer() {
        let mut fx = Fixture::new(Config {
            graceful_timeout: Duration::ZERO,
            ..cfg()
        });
        fx.ctrl.start_workers(1);
        fx.online(0);

        fx.ctrl.stop_worker(0, false);

        assert_eq!(fx.launcher.terminated(), vec![0]);
        assert!(fx.launcher.sent_to(0).is_empty());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fx.graceful_timers_pending(), 0);

        // Requested stop, no fault: clean, not replaced.
        fx.exit(0, 0);
        assert_eq!(fx.launcher.launches(), 1);
        assert!(fx.ctrl.is_drained());
    }

    #[tokio::test(start_paused = true)]
    async fn send_failure_kills_synchronously_and_cancels_timer() {
        let mut fx = Fixture::new(cfg());
        fx.ctrl.start_workers(1);
        fx.online(0);
        fx.launcher.with(|s| s.fail_send = true);

        fx.ctrl.stop_worker(0, false);

        assert_eq!(fx.launcher.terminated(), vec![0]);
        assert_eq!(fx.ctrl.status(0), Some(WorkerStatus::Stopping));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fx.graceful_timers_pending(), 0);
        assert_eq!(fx.launcher.terminated(), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_timeout_force_kills_once() {
        let mut fx = Fixture::new(cfg());
        fx.ctrl.start_workers(1);
        fx.online(0);
        fx.ctrl.stop_worker(0, false);
        assert!(fx.launcher.terminated().is_empty());

        tokio::time::sleep(Duration::from_secs(9)).await;
        fx.pump();

        assert_eq!(fx.launcher.terminated(), vec![0]);
        assert!(fx.kinds().contains(&EventKind::ForceKillWorker));

        // A duplicate of the same timer event is ignored.
        let id = fx.id(0);
        fx.ctrl.on_timer(TimerEvent::GracefulTimeout(id));
        assert_eq!(fx.launcher.terminated(), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn exit_before_timeout_cancels_timer() {
        let mut fx = Fixture::new(cfg());
        fx.ctrl.start_workers(1);
        fx.ctrl.stop_worker(0, false);
        fx.exit(0, 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fx.graceful_timers_pending(), 0);
        assert!(fx.launcher.terminated().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn kill_failure_is_reported() {
        let mut fx = Fixture::new(Config {
            graceful_timeout: Duration::ZERO,
            ..cfg()
        });
        fx.ctrl.start_workers(1);
        fx.launcher.with(|s| s.fail_kill = true);

        fx.ctrl.stop_worker(0, false);

        let failed = fx
            .drain_events()
            .into_iter()
            .find(|e| e.kind == EventKind::KillFailed)
            .unwrap();
        assert_eq!(failed.worker, Some(0));
        assert!(failed.reason.as_deref().is_some_and(|r| r.contains("EPERM")));
        assert_eq!(fx.ctrl.status(0), Some(WorkerStatus::Stopping));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_online_worker_is_a_zombie() {
        let mut fx = Fixture::new(Config {
            heartbeat_interval: Duration::from_secs(10),
            ..cfg()
        });
        fx.ctrl.start_workers(3);
        fx.online(0);
        fx.online(1);
        // Slot 2 never comes online.

        tokio::time::advance(Duration::from_secs(11)).await;
        let id = fx.id(0);
        fx.ctrl.dispatch(id, Envelope::new("liveness-ping"));
        fx.drain_events();

        fx.ctrl.on_timer(TimerEvent::LivenessTick);

        let zombies: Vec<_> = fx
            .drain_events()
            .into_iter()
            .filter(|e| e.kind == EventKind::ZombieDetected)
            .map(|e| e.worker)
            .collect();
        assert_eq!(zombies, vec![Some(1)]);
        assert_eq!(fx.ctrl.status(0), Some(WorkerStatus::Online));
        assert_eq!(fx.ctrl.status(1), Some(WorkerStatus::Stopping));
        assert_eq!(fx.ctrl.status(2), Some(WorkerStatus::Launching));

        // Flagged: the exit counts as failed even with a clean code.
        fx.exit(1, 0);
        let exited = fx
            .drain_events()
            .into_iter()
            .find(|e| e.kind == EventKind::WorkerExited)
            .unwrap();
        assert!(exited.is_error_exit());
        assert_eq!(fx.launcher.launches(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn pinging_worker_goes_online_and_silence_makes_it_a_zombie() {
        let mut fx = Fixture::new(Config {
            heartbeat_interval: Duration::from_secs(10),
            ..cfg()
        });
        fx.ctrl.start_workers(1);
        let id = fx.id(0);

        // No start notification from this launcher, only a heartbeat.
        fx.ctrl.dispatch(id, Envelope::new("liveness-ping"));
        assert_eq!(fx.ctrl.status(0), Some(WorkerStatus::Online));
        assert!(fx.ctrl.is_ready());
        fx.drain_events();

        tokio::time::sleep(Duration::from_secs(120)).await;
        fx.pump();

        let zombies: Vec<_> = fx
            .drain_events()
            .into_iter()
            .filter(|e| e.kind == EventKind::ZombieDetected)
            .map(|e| e.worker)
            .collect();
        assert_eq!(zombies, vec![Some(0)]);
        assert_eq!(fx.ctrl.status(0), Some(WorkerStatus::Stopping));
    }

    #[tokio::test(start_paused = true)]
    async fn launching_worker_is_never_a_zombie() {
        let mut fx = Fixture::new(Config {
            heartbeat_interval: Duration::from_secs(1),
            ..cfg()
        });
        fx.ctrl.start_workers(1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        fx.pump();

        assert_eq!(fx.ctrl.status(0), Some(WorkerStatus::Launching));
        assert!(!fx.kinds().contains(&EventKind::ZombieDetected));
    }

    #[tokio::test(start_paused = true)]
    async fn kill_all_publishes_all_stopped_exactly_once() {
        let mut fx = Fixture::new(cfg());
        fx.ctrl.start_workers(3);
        for seq in 0..3 {
            fx.online(seq);
        }
        let ids: Vec<_> = (0..3).map(|seq| fx.id(seq)).collect();
        fx.drain_events();

        fx.ctrl.kill_all();
        assert!(fx.ctrl.is_draining());

        for &i in &[2usize, 0, 1] {
            fx.ctrl.on_exit(ids[i], ExitInfo::code(0));
            // Duplicate exit notifications are harmless.
            fx.ctrl.on_exit(ids[i], ExitInfo::code(0));
        }
        fx.ctrl.kill_all();

        let stopped = fx
            .kinds()
            .into_iter()
            .filter(|k| *k == EventKind::AllWorkersStopped)
            .count();
        assert_eq!(stopped, 1);
        assert_eq!(fx.launcher.launches(), 3);
        assert!(fx.ctrl.is_drained());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_while_draining_is_not_replaced() {
        let mut fx = Fixture::new(cfg());
        fx.ctrl.start_workers(2);
        fx.ctrl.kill_all();
        fx.drain_events();

        let id = fx.id(0);
        fx.ctrl
            .dispatch(id, Envelope::new("error-report").with_data("boom"));
        fx.exit(0, 1);

        let events = fx.drain_events();
        let suppressed = events
            .iter()
            .find(|e| e.kind == EventKind::RestartSuppressed)
            .unwrap();
        assert_eq!(suppressed.reason.as_deref(), Some("fleet_draining"));
        assert_eq!(fx.launcher.launches(), 2);
        assert_eq!(fx.ctrl.start_workers(1), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn error_report_becomes_exit_cause() {
        let mut fx = Fixture::new(cfg());
        fx.ctrl.start_workers(1);
        let id = fx.id(0);
        fx.ctrl.dispatch(
            id,
            Envelope::new("error-report").with_data("TypeError: boom"),
        );
        fx.ctrl.on_exit(id, ExitInfo::code(0));

        let exited = fx
            .drain_events()
            .into_iter()
            .find(|e| e.kind == EventKind::WorkerExited)
            .unwrap();
        assert_eq!(
            exited.class,
            Some(ExitClass::Failed {
                cause: "TypeError: boom".into()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stale_events_from_previous_occupant_are_ignored() {
        let mut fx = Fixture::new(cfg());
        fx.ctrl.start_workers(1);
        let old = fx.id(0);
        fx.exit(0, 100);
        let new = fx.id(0);
        assert_ne!(old, new);
        fx.drain_events();

        fx.ctrl.on_exit(old, ExitInfo::code(100));
        fx.ctrl.on_online(old);
        fx.ctrl.dispatch(old, Envelope::new("liveness-ping"));
        fx.ctrl.on_timer(TimerEvent::GracefulTimeout(old));

        assert_eq!(fx.ctrl.status(0), Some(WorkerStatus::Launching));
        assert!(fx.kinds().is_empty());
        assert_eq!(fx.launcher.launches(), 2);
        assert!(fx.launcher.terminated().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn directed_messages_are_routed() {
        let mut fx = Fixture::new(cfg());
        fx.ctrl.start_workers(3);
        let from = fx.id(0);

        let all = Envelope::new("directed-message:all").with_data("hi");
        fx.ctrl.dispatch(from, all.clone());
        for seq in 0..3 {
            assert_eq!(fx.launcher.sent_to(seq), vec![Outbound::Payload(all.clone())]);
        }

        let one = Envelope::new("directed-message:2").with_data(7);
        fx.ctrl.dispatch(from, one.clone());
        assert_eq!(fx.launcher.sent_to(2).len(), 2);
        assert_eq!(fx.launcher.sent_to(1).len(), 1);

        fx.ctrl
            .dispatch(from, Envelope::new("directed-message:nobody"));
        fx.ctrl.dispatch(from, Envelope::new("directed-message:9"));
        fx.ctrl.dispatch(from, Envelope::new("what-is-this"));
        assert_eq!(fx.launcher.with(|s| s.sent.len()), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn broadcast_skips_failing_workers() {
        let mut fx = Fixture::new(cfg());
        fx.ctrl.start_workers(3);
        fx.ctrl.stop_worker(1, false);

        let delivered = fx
            .ctrl
            .broadcast(&Outbound::SetLogLevel("debug".into()));
        assert_eq!(delivered, 2);
        assert!(fx
            .launcher
            .sent_to(2)
            .contains(&Outbound::SetLogLevel("debug".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn spawn_failure_frees_sequence_without_breaker() {
        let mut fx = Fixture::new(Config {
            failure_threshold: 1,
            ..cfg()
        });
        fx.launcher.with(|s| s.fail_spawn = true);

        assert_eq!(fx.ctrl.start_workers(2), 0);

        let events = fx.drain_events();
        let failed: Vec<_> = events
            .iter()
            .filter(|e| e.kind == EventKind::SpawnFailed)
            .collect();
        assert_eq!(failed.len(), 2);
        assert!(failed.iter().all(|e| e.status == Some(WorkerStatus::Errored)));
        // The table was freed after each failure, so both attempts used sequence 0.
        assert!(failed.iter().all(|e| e.worker == Some(0)));
        assert!(!events.iter().any(|e| e.kind == EventKind::ThresholdReached));
        assert!(fx.ctrl.is_drained());
    }
}
