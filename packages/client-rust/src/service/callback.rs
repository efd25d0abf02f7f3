//! Caller-facing completion callbacks and the contexts they run on.
//!
//! A [`Callback`] is consumed by whichever of its three methods fires, so a
//! submission can resolve at most once by construction. Where it runs is
//! decided by a [`CallbackContext`]: [`Immediate`] runs it on the delivering
//! thread, a [`Mailbox`] queues it until the caller pumps it on its own thread
//! or task.

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::operation::{OperationError, OperationResponse};

// ---------------------------------------------------------------------------
// Callback
// ---------------------------------------------------------------------------

/// Receiver of exactly one terminal notification per submission.
pub trait Callback: Send + 'static {
    fn on_success(self: Box<Self>, response: OperationResponse);

    fn on_failure(self: Box<Self>, error: OperationError);

    fn on_cancel(self: Box<Self>);
}

/// Terminal result of a submission.
#[derive(Debug)]
pub enum Outcome {
    Success(OperationResponse),
    Failure(OperationError),
    Cancelled,
}

impl Outcome {
    /// Hand this outcome to the matching callback method.
    pub fn deliver(self, callback: Box<dyn Callback>) {
        match self {
            Self::Success(response) => callback.on_success(response),
            Self::Failure(error) => callback.on_failure(error),
            Self::Cancelled => callback.on_cancel(),
        }
    }

    /// Short label used in logs and spans.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "ok",
            Self::Failure(_) => "error",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<Result<OperationResponse, OperationError>> for Outcome {
    fn from(result: Result<OperationResponse, OperationError>) -> Self {
        match result {
            Ok(response) => Self::Success(response),
            Err(error) => Self::Failure(error),
        }
    }
}

/// Callback that forwards the outcome to an awaiting receiver.
impl Callback for oneshot::Sender<Outcome> {
    fn on_success(self: Box<Self>, response: OperationResponse) {
        let _ = (*self).send(Outcome::Success(response));
    }

    fn on_failure(self: Box<Self>, error: OperationError) {
        let _ = (*self).send(Outcome::Failure(error));
    }

    fn on_cancel(self: Box<Self>) {
        let _ = (*self).send(Outcome::Cancelled);
    }
}

/// Create a callback whose outcome can be awaited.
#[must_use]
pub fn outcome_channel() -> (Box<dyn Callback>, oneshot::Receiver<Outcome>) {
    let (tx, rx) = oneshot::channel();
    (Box::new(tx), rx)
}

/// Callback built from a closure over the [`Outcome`].
pub struct FnCallback<F>(F);

impl<F> Callback for FnCallback<F>
where
    F: FnOnce(Outcome) + Send + 'static,
{
    fn on_success(self: Box<Self>, response: OperationResponse) {
        let Self(f) = *self;
        f(Outcome::Success(response));
    }

    fn on_failure(self: Box<Self>, error: OperationError) {
        let Self(f) = *self;
        f(Outcome::Failure(error));
    }

    fn on_cancel(self: Box<Self>) {
        let Self(f) = *self;
        f(Outcome::Cancelled);
    }
}

/// Box a closure as a [`Callback`].
#[must_use]
pub fn callback_fn<F>(f: F) -> Box<dyn Callback>
where
    F: FnOnce(Outcome) + Send + 'static,
{
    Box::new(FnCallback(f))
}

// ---------------------------------------------------------------------------
// CallbackContext
// ---------------------------------------------------------------------------

/// A unit of callback work posted to a context.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Execution context on which callbacks are delivered.
pub trait CallbackContext: Send + Sync + 'static {
    fn post(&self, job: Job);
}

/// Runs every job on the thread that posts it (a worker, or the canceller).
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

impl CallbackContext for Immediate {
    fn post(&self, job: Job) {
        job();
    }
}

/// Posting side of a [`Mailbox`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MailboxSender {
    tx: mpsc::UnboundedSender<Job>,
}

impl CallbackContext for MailboxSender {
    fn post(&self, job: Job) {
        if self.tx.send(job).is_err() {
            debug!("callback mailbox closed, dropping notification");
        }
    }
}

/// Queue of callback jobs owned by the caller, which runs them on its own
/// thread or task.
#[derive(Debug)]
pub struct Mailbox {
    rx: mpsc::UnboundedReceiver<Job>,
}

/// Create a connected mailbox pair.
#[must_use]
pub fn mailbox() -> (MailboxSender, Mailbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MailboxSender { tx }, Mailbox { rx })
}

impl Mailbox {
    /// Run every job queued so far without waiting. Returns how many ran.
    pub fn drain(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Wait for the next job and run it. Returns `false` once every sender
    /// has been dropped and the queue is empty.
    pub async fn run_one(&mut self) -> bool {
        match self.rx.recv().await {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Run jobs until every sender has been dropped.
    pub async fn run(mut self) {
        while self.run_one().await {}
    }
}
