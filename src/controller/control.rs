use crate::ipc::Envelope;
use crate::process::ExitInfo;

use super::slot::WorkerId;
use super::timers::TimerEvent;

/// Input to the controller from worker tasks and timers.
///
/// Everything that can change controller state from outside the supervisor loop
/// arrives as one of these, through a single channel.
#[derive(Debug)]
pub enum ControlEvent {
    /// The transport saw the worker process start.
    Online {
        /// Spawn that started.
        id: WorkerId,
    },
    /// A worker wrote an envelope to its stdout.
    Message {
        /// Spawn that sent it.
        id: WorkerId,
        /// Raw envelope, decoded by the controller.
        envelope: Envelope,
    },
    /// A worker process was reaped.
    Exited {
        /// Spawn that exited.
        id: WorkerId,
        /// Exit status.
        exit: ExitInfo,
    },
    /// A controller timer fired.
    Timer(TimerEvent),
}
