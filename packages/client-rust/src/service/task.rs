//! One submitted operation and its phase machine.
//!
//! A task is touched by two parties: the worker running it and whoever calls
//! [`Task::stop`]. Both go through the same mutex, and whichever moves the task
//! into a terminal phase first takes the callback out of the slot. The
//! notification is posted after the lock is released, from that snapshot, so
//! the callback can neither fire twice nor be lost.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::callback::{Callback, CallbackContext, Outcome};
use super::operation::{Operation, OperationError, OperationKind, OperationResponse};
use crate::fetch::CallHandle;

/// Lifecycle phase of a [`Task`].
///
/// `Pending -> Running -> {Succeeded, Failed, Cancelled}`, or
/// `Pending -> {Cancelled, Failed}` without ever running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskPhase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

struct TaskState {
    phase: TaskPhase,
    operation: Option<Operation>,
    callback: Option<Box<dyn Callback>>,
    call: Option<CallHandle>,
}

/// A submitted operation bound to its callback and delivery context.
pub struct Task {
    id: u64,
    kind: OperationKind,
    context: Arc<dyn CallbackContext>,
    state: Mutex<TaskState>,
}

impl Task {
    #[must_use]
    pub fn new(
        id: u64,
        operation: Operation,
        callback: Box<dyn Callback>,
        context: Arc<dyn CallbackContext>,
    ) -> Self {
        Self {
            id,
            kind: operation.kind(),
            context,
            state: Mutex::new(TaskState {
                phase: TaskPhase::Pending,
                operation: Some(operation),
                callback: Some(callback),
                call: None,
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    #[must_use]
    pub fn phase(&self) -> TaskPhase {
        self.state.lock().phase
    }

    /// Whether the task has been cancelled.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.phase() == TaskPhase::Cancelled
    }

    /// Move `Pending -> Running` and hand the operation to the worker.
    ///
    /// Returns `None` when the task was cancelled (or rejected) while queued;
    /// the worker must then skip it.
    pub fn begin(&self) -> Option<Operation> {
        let mut state = self.state.lock();
        if state.phase != TaskPhase::Pending {
            return None;
        }
        state.phase = TaskPhase::Running;
        debug!(task_id = self.id, kind = %self.kind, "task running");
        state.operation.take()
    }

    /// Record the handle of the call about to be issued.
    ///
    /// Returns `false` if the task was stopped in the meantime, in which case
    /// the call must not be made.
    pub fn attach_call(&self, call: CallHandle) -> bool {
        let mut state = self.state.lock();
        if state.phase != TaskPhase::Running {
            return false;
        }
        state.call = Some(call);
        true
    }

    /// Commit the worker's result.
    ///
    /// Only a running task can complete. Returns `false` if a stop won the
    /// race, in which case the result is discarded.
    pub fn complete(&self, result: Result<OperationResponse, OperationError>) -> bool {
        let callback = {
            let mut state = self.state.lock();
            if state.phase != TaskPhase::Running {
                return false;
            }
            state.phase = if result.is_ok() {
                TaskPhase::Succeeded
            } else {
                TaskPhase::Failed
            };
            state.call = None;
            state.callback.take()
        };
        self.post(Outcome::from(result), callback);
        true
    }

    /// Cancel the task. Idempotent; a no-op once the task is terminal.
    ///
    /// Aborts the in-flight call, if any, and posts `on_cancel`. Returns
    /// whether this call performed the cancellation.
    pub fn stop(&self) -> bool {
        let (callback, call) = {
            let mut state = self.state.lock();
            if state.phase.is_terminal() {
                return false;
            }
            state.phase = TaskPhase::Cancelled;
            state.operation = None;
            (state.callback.take(), state.call.take())
        };
        debug!(task_id = self.id, kind = %self.kind, "task cancelled");
        if let Some(call) = call {
            call.cancel();
        }
        self.post(Outcome::Cancelled, callback);
        true
    }

    /// Fail a task that never reached a worker.
    pub fn reject(&self, error: OperationError) -> bool {
        let callback = {
            let mut state = self.state.lock();
            if state.phase != TaskPhase::Pending {
                return false;
            }
            state.phase = TaskPhase::Failed;
            state.operation = None;
            state.callback.take()
        };
        self.post(Outcome::Failure(error), callback);
        true
    }

    fn post(&self, outcome: Outcome, callback: Option<Box<dyn Callback>>) {
        match callback {
            Some(callback) => self
                .context
                .post(Box::new(move || outcome.deliver(callback))),
            None => debug!(task_id = self.id, "callback already consumed"),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}
