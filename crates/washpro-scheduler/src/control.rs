//! Script-originated task control.
//!
//! `startTask`/`stopTask` calls made by a script are turned into
//! [`ControlCommand`]s on a bounded queue. A dispatcher task applies them to
//! the scheduler, so a script never re-enters the scheduler on its own
//! stack and the sandbox does not own the scheduler.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use washpro_protocols::{TaskControl, TaskError, TaskId};

use crate::scheduler::{Scheduler, SchedulerInner};

/// A queued start/stop request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Start { origin: TaskId, target: String },
    Stop { origin: TaskId, target: String },
}

impl ControlCommand {
    pub fn origin(&self) -> &TaskId {
        match self {
            ControlCommand::Start { origin, .. } | ControlCommand::Stop { origin, .. } => origin,
        }
    }

    pub fn target(&self) -> &str {
        match self {
            ControlCommand::Start { target, .. } | ControlCommand::Stop { target, .. } => target,
        }
    }
}

/// Sending side of the control queue, handed to every sandbox.
///
/// Shares an in-flight counter with the scheduler: a command counts from
/// submission until the dispatcher has applied it, and the scheduler counts
/// each live execution. A command is submitted while its issuing execution
/// is still counted, so the counter only reaches zero when no work remains.
#[derive(Clone)]
pub struct ControlQueue {
    sender: mpsc::Sender<ControlCommand>,
    in_flight: Arc<AtomicUsize>,
}

impl ControlQueue {
    /// Create the queue and the receiver the dispatcher drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ControlCommand>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let queue = Self {
            sender,
            in_flight: Arc::new(AtomicUsize::new(0)),
        };
        (queue, receiver)
    }

    /// Queued commands and live executions not yet finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn begin_work(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn end_work(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Enqueue without waiting. A full queue drops the command.
    pub fn submit(&self, command: ControlCommand) {
        self.begin_work();
        let rejected = match self.sender.try_send(command) {
            Ok(()) => return,
            Err(rejected) => rejected,
        };
        self.end_work();

        match rejected {
            TrySendError::Full(command) => {
                warn!(
                    "Control queue full; dropping {:?} issued by task '{}'",
                    command,
                    command.origin()
                );
            }
            TrySendError::Closed(command) => {
                debug!("Scheduler stopped; ignoring {:?}", command);
            }
        }
    }
}

impl TaskControl for ControlQueue {
    fn start_task(&self, origin: &TaskId, target: &str) {
        self.submit(ControlCommand::Start {
            origin: origin.clone(),
            target: target.to_string(),
        });
    }

    fn stop_task(&self, origin: &TaskId, target: &str) {
        self.submit(ControlCommand::Stop {
            origin: origin.clone(),
            target: target.to_string(),
        });
    }
}

/// Spawn the dispatcher that applies queued commands in arrival order.
///
/// Holds only a weak reference to the scheduler and exits once the
/// scheduler is dropped, the queue closes or `shutdown` fires.
pub(crate) fn spawn_dispatcher(
    mut receiver: mpsc::Receiver<ControlCommand>,
    scheduler: Weak<SchedulerInner>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let command = tokio::select! {
                _ = shutdown.cancelled() => break,
                command = receiver.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            let Some(inner) = scheduler.upgrade() else {
                break;
            };
            let active = Scheduler::from_inner(inner);
            apply(&active, command).await;
            active.inner.control.end_work();
        }
        debug!("Control dispatcher stopped");
    })
}

async fn apply(scheduler: &Scheduler, command: ControlCommand) {
    let result = match &command {
        ControlCommand::Start { target, .. } => scheduler.run_task(target).await,
        ControlCommand::Stop { target, .. } => scheduler.stop_task(target).await,
    };

    match result {
        Ok(()) => debug!("Applied {:?}", command),
        Err(TaskError::Conflict(id)) => {
            info!(
                "Task '{}' asked to start '{}', which is already running",
                command.origin(),
                id
            );
        }
        Err(e) => {
            warn!(
                "Request from task '{}' targeting '{}' failed: {}",
                command.origin(),
                command.target(),
                e
            );
        }
    }
}
