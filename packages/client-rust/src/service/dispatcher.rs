//! Bounded, cancellable operation dispatcher.
//!
//! Submissions go onto an unbounded queue drained by a fixed number of worker
//! tasks. Each worker takes one task at a time and runs it to completion, so at
//! most `worker_count` calls are in flight. Every submission is answered
//! through its [`Callback`] exactly once: success, failure or cancellation.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, info_span, warn, Instrument};

use super::callback::{Callback, CallbackContext, Outcome};
use super::operation::{Operation, OperationError, OperationKind, OperationResponse};
use super::registry::OperationRegistry;
use super::task::{Task, TaskPhase};
use crate::config::ClientConfig;
use crate::fetch::{HttpTransport, PreparedCall, Transport};

// ---------------------------------------------------------------------------
// Request / CancellationHandle
// ---------------------------------------------------------------------------

/// An operation paired with its callback and a cancellation handle that can be
/// used before the request is submitted.
pub struct Request {
    operation: Operation,
    callback: Box<dyn Callback>,
    handle: CancellationHandle,
}

impl Request {
    #[must_use]
    pub fn new(operation: Operation, callback: Box<dyn Callback>) -> Self {
        Self {
            operation,
            callback,
            handle: CancellationHandle::new(),
        }
    }

    /// Handle for this request. Cancelling it before submission makes the
    /// dispatcher answer with `on_cancel` without running anything.
    #[must_use]
    pub fn handle(&self) -> CancellationHandle {
        self.handle.clone()
    }

    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.operation.kind()
    }
}

type LiveTasks = DashMap<u64, Arc<Task>>;

#[derive(Default)]
struct HandleSlot {
    cancelled: bool,
    task: Option<Arc<Task>>,
    live: Weak<LiveTasks>,
}

/// Caller-side handle for cancelling one submission.
#[derive(Clone, Default)]
pub struct CancellationHandle {
    slot: Arc<Mutex<HandleSlot>>,
}

impl CancellationHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the submission. Idempotent, and a no-op once it has completed.
    ///
    /// A task still queued is never run. A running task has its in-flight call
    /// aborted and its result discarded. Either way it stops counting towards
    /// [`Dispatcher::in_flight_count`].
    pub fn cancel(&self) {
        let (task, live) = {
            let mut slot = self.slot.lock();
            if slot.cancelled {
                return;
            }
            slot.cancelled = true;
            (slot.task.clone(), slot.live.clone())
        };
        let Some(task) = task else {
            return;
        };
        task.stop();
        if let Some(live) = live.upgrade() {
            live.remove(&task.id());
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.slot.lock().cancelled
    }

    /// Phase of the submitted task, or `None` if nothing has been submitted
    /// through this handle.
    #[must_use]
    pub fn phase(&self) -> Option<TaskPhase> {
        self.slot.lock().task.as_ref().map(|task| task.phase())
    }
}

impl std::fmt::Debug for CancellationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.slot.lock();
        f.debug_struct("CancellationHandle")
            .field("cancelled", &slot.cancelled)
            .field("task", &slot.task)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Lifecycle of a [`Dispatcher`]: `Running -> Draining -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// Accepting submissions.
    Running,
    /// Shutting down; new submissions fail with `OperationError::ShutDown`.
    Draining,
    /// All workers have exited.
    Stopped,
}

struct Shared {
    registry: OperationRegistry,
    transport: Arc<dyn Transport>,
    context: Arc<dyn CallbackContext>,
    live: Arc<LiveTasks>,
    next_id: AtomicU64,
    state: ArcSwap<DispatcherState>,
}

type TaskReceiver = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Arc<Task>>>>;

/// Runs submitted operations on a fixed pool of worker tasks.
pub struct Dispatcher {
    shared: Arc<Shared>,
    queue: Mutex<Option<mpsc::UnboundedSender<Arc<Task>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Start `config.worker_count` workers on the current tokio runtime.
    ///
    /// Callbacks are delivered on `context`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(
        config: &ClientConfig,
        registry: OperationRegistry,
        transport: Arc<dyn Transport>,
        context: Arc<dyn CallbackContext>,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            registry,
            transport,
            context,
            live: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            state: ArcSwap::from_pointee(DispatcherState::Running),
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let rx: TaskReceiver = Arc::new(tokio::sync::Mutex::new(rx));
        let workers = (0..config.worker_count)
            .map(|worker| tokio::spawn(worker_loop(worker, Arc::clone(&shared), Arc::clone(&rx))))
            .collect();

        info!(workers = config.worker_count, "dispatcher started");

        Ok(Self {
            shared,
            queue: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        })
    }

    /// Start a dispatcher over an [`HttpTransport`] with a handler for every
    /// operation kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn with_http(
        config: &ClientConfig,
        context: Arc<dyn CallbackContext>,
    ) -> anyhow::Result<Self> {
        let transport = HttpTransport::new(&config.transport)?;
        let registry = OperationRegistry::with_site(Arc::new(config.site.clone()));
        Self::start(config, registry, Arc::new(transport), context)
    }

    /// Submit `operation`; `callback` is answered exactly once.
    pub fn submit(&self, operation: Operation, callback: Box<dyn Callback>) -> CancellationHandle {
        self.submit_request(Request::new(operation, callback))
    }

    /// Submit a prepared [`Request`].
    ///
    /// A request cancelled before submission is answered with `on_cancel`
    /// right away and never reaches a worker.
    pub fn submit_request(&self, request: Request) -> CancellationHandle {
        let Request {
            operation,
            callback,
            handle,
        } = request;

        let task = {
            let mut slot = handle.slot.lock();
            if slot.cancelled {
                drop(slot);
                debug!(kind = %operation.kind(), "request cancelled before submission");
                self.post(Outcome::Cancelled, callback);
                return handle;
            }
            if self.state() != DispatcherState::Running {
                drop(slot);
                self.post(Outcome::Failure(OperationError::ShutDown), callback);
                return handle;
            }

            let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
            let task = Arc::new(Task::new(
                id,
                operation,
                callback,
                Arc::clone(&self.shared.context),
            ));
            // Registered under the slot lock so a racing cancel always finds it.
            self.shared.live.insert(id, Arc::clone(&task));
            slot.task = Some(Arc::clone(&task));
            slot.live = Arc::downgrade(&self.shared.live);
            task
        };

        let sent = self
            .queue
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(Arc::clone(&task)).is_ok());
        if !sent {
            self.shared.live.remove(&task.id());
            task.reject(OperationError::ShutDown);
        }
        handle
    }

    /// Number of submitted tasks that are neither answered nor cancelled.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.shared.live.len()
    }

    #[must_use]
    pub fn state(&self) -> DispatcherState {
        **self.shared.state.load()
    }

    /// Stop accepting work, cancel every live task and wait for the workers to
    /// exit.
    pub async fn shutdown(&self) {
        if self.state() == DispatcherState::Stopped {
            return;
        }
        self.shared.state.store(Arc::new(DispatcherState::Draining));
        self.queue.lock().take();

        let live: Vec<Arc<Task>> = self
            .shared
            .live
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for task in &live {
            task.stop();
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "dispatcher worker panicked");
            }
        }

        self.shared.state.store(Arc::new(DispatcherState::Stopped));
        info!(cancelled = live.len(), "dispatcher stopped");
    }

    fn post(&self, outcome: Outcome, callback: Box<dyn Callback>) {
        self.shared
            .context
            .post(Box::new(move || outcome.deliver(callback)));
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("state", &self.state())
            .field("in_flight", &self.in_flight_count())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

async fn worker_loop(worker: usize, shared: Arc<Shared>, rx: TaskReceiver) {
    debug!(worker, "worker started");
    loop {
        let next = rx.lock().await.recv().await;
        let Some(task) = next else {
            break;
        };
        // Each run gets its own task so a panic ends only that operation.
        let run = tokio::spawn(Arc::clone(&shared).run(Arc::clone(&task)));
        if let Err(e) = run.await {
            recover(&task, e);
        }
        shared.live.remove(&task.id());
    }
    debug!(worker, "worker stopped");
}

/// Answer a task whose run did not return normally.
fn recover(task: &Task, error: JoinError) {
    if !error.is_panic() {
        debug!(task_id = task.id(), "operation run aborted by runtime");
        task.stop();
        return;
    }
    let message = panic_message(error.into_panic());
    warn!(
        kind = %task.kind(),
        task_id = task.id(),
        message = %message,
        "operation panicked"
    );
    let failed = task.complete(Err(OperationError::Panicked {
        kind: task.kind(),
        message,
    }));
    if !failed {
        // The panic came from the callback after the task was answered.
        debug!(task_id = task.id(), "panic after delivery");
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl Shared {
    async fn run(self: Arc<Self>, task: Arc<Task>) {
        let Some(operation) = task.begin() else {
            debug!(task_id = task.id(), "skipping task cancelled while queued");
            return;
        };

        let span = info_span!(
            "operation",
            kind = %task.kind(),
            task_id = task.id(),
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        async move {
            let start = Instant::now();
            let outcome = match self.execute(&task, operation).await {
                Some(result) => {
                    let label = if result.is_ok() { "ok" } else { "error" };
                    if let Err(e) = &result {
                        debug!(error = %e, "operation failed");
                    }
                    if task.complete(result) {
                        label
                    } else {
                        "cancelled"
                    }
                }
                None => "cancelled",
            };

            #[allow(clippy::cast_possible_truncation)]
            let duration_ms = start.elapsed().as_millis() as u64;
            tracing::Span::current().record("duration_ms", duration_ms);
            tracing::Span::current().record("outcome", outcome);

            info!(
                kind = %task.kind(),
                task_id = task.id(),
                duration_ms,
                outcome,
                "operation complete"
            );
        }
        .instrument(span)
        .await;
    }

    /// Prepare, fetch and decode. Returns `None` once cancellation is
    /// observed, so no result is produced for a stopped task.
    async fn execute(
        &self,
        task: &Task,
        operation: Operation,
    ) -> Option<Result<OperationResponse, OperationError>> {
        let Some(handler) = self.registry.get(operation.kind()) else {
            return Some(Err(OperationError::UnknownOperation {
                kind: operation.kind(),
            }));
        };

        let request = match handler.prepare(&operation) {
            Ok(request) => request,
            Err(e) => return Some(Err(e)),
        };

        let call = PreparedCall::new(request);
        if !task.attach_call(call.handle()) {
            return None;
        }
        let fetched = call.execute(self.transport.as_ref()).await;

        if task.is_stopped() {
            return None;
        }
        Some(match fetched {
            Ok(body) => handler.decode(&body),
            Err(e) => Err(e.into()),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::config::SiteConfig;
    use crate::fetch::{FetchRequest, TransportError};
    use crate::service::callback::{callback_fn, mailbox, outcome_channel, Immediate};
    use crate::service::registry::OperationHandler;

    const SIGNED_IN: &str = "<p>You are now logged in as: hippo<br></p>";

    /// In-memory transport returning a fixed reply. With a gate, every call
    /// waits for the gate to open or the call to be cancelled.
    struct ScriptedTransport {
        reply: Result<&'static str, u16>,
        gate: Option<CancellationToken>,
        started: Notify,
        executed: AtomicU32,
        aborted: AtomicU32,
        running: AtomicU32,
        peak: AtomicU32,
    }

    impl ScriptedTransport {
        fn replying(reply: Result<&'static str, u16>) -> Arc<Self> {
            Arc::new(Self::build(reply, None))
        }

        fn gated(reply: &'static str, gate: CancellationToken) -> Arc<Self> {
            Arc::new(Self::build(Ok(reply), Some(gate)))
        }

        fn build(reply: Result<&'static str, u16>, gate: Option<CancellationToken>) -> Self {
            Self {
                reply,
                gate,
                started: Notify::new(),
                executed: AtomicU32::new(0),
                aborted: AtomicU32::new(0),
                running: AtomicU32::new(0),
                peak: AtomicU32::new(0),
            }
        }

        fn executed(&self) -> u32 {
            self.executed.load(Ordering::SeqCst)
        }

        fn aborted(&self) -> u32 {
            self.aborted.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(
            &self,
            request: FetchRequest,
            cancel: CancellationToken,
        ) -> Result<String, TransportError> {
            self.executed.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.started.notify_one();

            let mut aborted = false;
            if let Some(gate) = &self.gate {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => { aborted = true; }
                    () = gate.cancelled() => {}
                }
            }
            self.running.fetch_sub(1, Ordering::SeqCst);

            if aborted {
                self.aborted.fetch_add(1, Ordering::SeqCst);
                return Err(TransportError::Aborted);
            }
            match self.reply {
                Ok(body) => Ok(body.to_string()),
                Err(status) => Err(TransportError::Status {
                    url: request.url,
                    status,
                }),
            }
        }
    }

    /// Transport that cancels the submission it serves just before replying.
    #[derive(Default)]
    struct CancelOnReply {
        handle: Mutex<Option<CancellationHandle>>,
        executed: AtomicU32,
    }

    #[async_trait]
    impl Transport for CancelOnReply {
        async fn execute(
            &self,
            _request: FetchRequest,
            _cancel: CancellationToken,
        ) -> Result<String, TransportError> {
            self.executed.fetch_add(1, Ordering::SeqCst);
            if let Some(handle) = self.handle.lock().take() {
                handle.cancel();
            }
            Ok(SIGNED_IN.to_string())
        }
    }

    /// Detail handler whose decoder panics.
    struct PanickingDetailHandler;

    impl OperationHandler for PanickingDetailHandler {
        fn kind(&self) -> OperationKind {
            OperationKind::GalleryDetail
        }

        fn prepare(&self, _op: &Operation) -> Result<FetchRequest, OperationError> {
            Ok(FetchRequest::get("https://host/g/1/abcdefabcd/"))
        }

        fn decode(&self, _body: &str) -> Result<OperationResponse, OperationError> {
            panic!("detail layout changed")
        }
    }

    fn config(worker_count: usize) -> ClientConfig {
        ClientConfig {
            worker_count,
            ..ClientConfig::default()
        }
    }

    fn registry() -> OperationRegistry {
        OperationRegistry::with_site(Arc::new(SiteConfig::default()))
    }

    fn dispatcher(workers: usize, transport: Arc<ScriptedTransport>) -> Dispatcher {
        Dispatcher::start(&config(workers), registry(), transport, Arc::new(Immediate)).unwrap()
    }

    fn logging_callback(log: &Arc<Mutex<Vec<&'static str>>>) -> Box<dyn Callback> {
        let log = Arc::clone(log);
        callback_fn(move |outcome| log.lock().push(outcome.label()))
    }

    async fn recv(rx: tokio::sync::oneshot::Receiver<Outcome>) -> Outcome {
        tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .expect("callback must fire")
            .expect("callback dropped without firing")
    }

    async fn wait_idle(dispatcher: &Dispatcher) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while dispatcher.in_flight_count() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("dispatcher must go idle");
    }

    #[tokio::test]
    async fn success_is_delivered_once() {
        let transport = ScriptedTransport::replying(Ok(SIGNED_IN));
        let dispatcher = dispatcher(3, transport.clone());

        let (callback, rx) = outcome_channel();
        dispatcher.submit(Operation::sign_in("hippo", "pw"), callback);

        match recv(rx).await {
            Outcome::Success(OperationResponse::SignedIn { username }) => {
                assert_eq!(username, "hippo");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(transport.executed(), 1);
        dispatcher.shutdown().await;
        assert_eq!(dispatcher.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn transport_failure_is_reported() {
        let transport = ScriptedTransport::replying(Err(503));
        let dispatcher = dispatcher(1, transport);

        let (callback, rx) = outcome_channel();
        dispatcher.submit(Operation::gallery_list("/"), callback);

        assert!(matches!(
            recv(rx).await,
            Outcome::Failure(OperationError::Transport(TransportError::Status {
                status: 503,
                ..
            }))
        ));
    }

    #[tokio::test]
    async fn structure_failure_is_reported() {
        let transport = ScriptedTransport::replying(Ok("<html><body></body></html>"));
        let dispatcher = dispatcher(1, transport);

        let (callback, rx) = outcome_channel();
        dispatcher.submit(Operation::gallery_list("/"), callback);

        assert!(matches!(
            recv(rx).await,
            Outcome::Failure(OperationError::Structure(_))
        ));
    }

    #[tokio::test]
    async fn argument_error_never_reaches_transport() {
        let transport = ScriptedTransport::replying(Ok(SIGNED_IN));
        let dispatcher = dispatcher(1, transport.clone());

        let (callback, rx) = outcome_channel();
        dispatcher.submit(Operation::rate_gallery(1, "abcdefabcd", 9.0), callback);

        assert!(matches!(
            recv(rx).await,
            Outcome::Failure(OperationError::Argument { .. })
        ));
        assert_eq!(transport.executed(), 0);
    }

    #[tokio::test]
    async fn unregistered_kind_fails() {
        let transport = ScriptedTransport::replying(Ok(SIGNED_IN));
        let dispatcher = Dispatcher::start(
            &config(1),
            OperationRegistry::new(),
            transport.clone(),
            Arc::new(Immediate),
        )
        .unwrap();

        let (callback, rx) = outcome_channel();
        dispatcher.submit(Operation::gallery_detail("/g/1/abcdefabcd/"), callback);

        assert!(matches!(
            recv(rx).await,
            Outcome::Failure(OperationError::UnknownOperation {
                kind: OperationKind::GalleryDetail
            })
        ));
        assert_eq!(transport.executed(), 0);
    }

    #[tokio::test]
    async fn cancel_before_dequeue_never_fetches() {
        let gate = CancellationToken::new();
        let transport = ScriptedTransport::gated(SIGNED_IN, gate.clone());
        let dispatcher = dispatcher(1, transport.clone());

        let (first, first_rx) = outcome_channel();
        dispatcher.submit(Operation::sign_in("hippo", "pw"), first);
        transport.started.notified().await;

        let (second, second_rx) = outcome_channel();
        let handle = dispatcher.submit(Operation::sign_in("hippo", "pw"), second);
        assert_eq!(handle.phase(), Some(TaskPhase::Pending));
        assert_eq!(dispatcher.in_flight_count(), 2);
        handle.cancel();
        assert!(recv(second_rx).await.is_cancelled());
        assert_eq!(dispatcher.in_flight_count(), 1);

        gate.cancel();
        assert!(matches!(recv(first_rx).await, Outcome::Success(_)));

        dispatcher.shutdown().await;
        assert_eq!(transport.executed(), 1);
        assert_eq!(handle.phase(), Some(TaskPhase::Cancelled));
    }

    #[tokio::test]
    async fn cancel_mid_fetch_aborts_call_once() {
        let transport = ScriptedTransport::gated(SIGNED_IN, CancellationToken::new());
        let dispatcher = dispatcher(1, transport.clone());

        let log = Arc::new(Mutex::new(Vec::new()));
        let handle = dispatcher.submit(Operation::sign_in("hippo", "pw"), logging_callback(&log));
        transport.started.notified().await;
        assert_eq!(handle.phase(), Some(TaskPhase::Running));

        handle.cancel();
        handle.cancel();
        dispatcher.shutdown().await;

        assert_eq!(transport.executed(), 1);
        assert_eq!(transport.aborted(), 1);
        assert_eq!(*log.lock(), vec!["cancelled"]);
    }

    #[tokio::test]
    async fn cancel_during_reply_discards_result() {
        let transport = Arc::new(CancelOnReply::default());
        let dispatcher =
            Dispatcher::start(&config(1), registry(), transport.clone(), Arc::new(Immediate))
                .unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        let handle = dispatcher.submit(Operation::sign_in("hippo", "pw"), logging_callback(&log));
        *transport.handle.lock() = Some(handle.clone());

        wait_idle(&dispatcher).await;
        dispatcher.shutdown().await;

        assert_eq!(transport.executed.load(Ordering::SeqCst), 1);
        assert_eq!(*log.lock(), vec!["cancelled"]);
        assert_eq!(handle.phase(), Some(TaskPhase::Cancelled));
    }

    #[tokio::test]
    async fn cancel_after_completion_is_noop() {
        let transport = ScriptedTransport::replying(Ok(SIGNED_IN));
        let dispatcher = dispatcher(1, transport);

        let (callback, rx) = outcome_channel();
        let handle = dispatcher.submit(Operation::sign_in("hippo", "pw"), callback);
        assert!(matches!(recv(rx).await, Outcome::Success(_)));

        handle.cancel();
        assert!(handle.is_cancelled());
        assert_eq!(handle.phase(), Some(TaskPhase::Succeeded));
    }

    #[tokio::test]
    async fn pre_cancelled_request_answers_immediately() {
        let transport = ScriptedTransport::replying(Ok(SIGNED_IN));
        let dispatcher = dispatcher(1, transport.clone());

        let log = Arc::new(Mutex::new(Vec::new()));
        let request = Request::new(Operation::sign_in("hippo", "pw"), logging_callback(&log));
        assert_eq!(request.kind(), OperationKind::SignIn);
        request.handle().cancel();

        let handle = dispatcher.submit_request(request);
        assert_eq!(*log.lock(), vec!["cancelled"]);
        assert_eq!(handle.phase(), None);

        dispatcher.shutdown().await;
        assert_eq!(transport.executed(), 0);
    }

    #[tokio::test]
    async fn mailbox_defers_delivery_until_drained() {
        let transport = ScriptedTransport::replying(Ok(SIGNED_IN));
        let (sender, mut mailbox) = mailbox();
        let dispatcher =
            Dispatcher::start(&config(2), registry(), transport, Arc::new(sender)).unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.submit(Operation::sign_in("hippo", "pw"), logging_callback(&log));
        wait_idle(&dispatcher).await;

        assert!(log.lock().is_empty());
        assert_eq!(mailbox.drain(), 1);
        assert_eq!(*log.lock(), vec!["ok"]);
    }

    #[tokio::test]
    async fn shutdown_cancels_live_and_rejects_new_work() {
        let transport = ScriptedTransport::gated(SIGNED_IN, CancellationToken::new());
        let dispatcher = dispatcher(1, transport.clone());

        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.submit(Operation::sign_in("a", "pw"), logging_callback(&log));
        dispatcher.submit(Operation::sign_in("b", "pw"), logging_callback(&log));
        transport.started.notified().await;
        assert_eq!(dispatcher.in_flight_count(), 2);

        dispatcher.shutdown().await;
        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
        assert_eq!(*log.lock(), vec!["cancelled", "cancelled"]);
        assert_eq!(transport.executed(), 1);

        let (callback, rx) = outcome_channel();
        dispatcher.submit(Operation::sign_in("c", "pw"), callback);
        assert!(matches!(
            recv(rx).await,
            Outcome::Failure(OperationError::ShutDown)
        ));
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_worker_count() {
        let gate = CancellationToken::new();
        let transport = ScriptedTransport::gated(SIGNED_IN, gate.clone());
        let dispatcher = dispatcher(2, transport.clone());

        let receivers: Vec<_> = (0..5)
            .map(|_| {
                let (callback, rx) = outcome_channel();
                dispatcher.submit(Operation::sign_in("hippo", "pw"), callback);
                rx
            })
            .collect();

        tokio::time::timeout(Duration::from_secs(5), async {
            while transport.executed() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(transport.executed(), 2);

        gate.cancel();
        for rx in receivers {
            assert!(matches!(recv(rx).await, Outcome::Success(_)));
        }
        assert_eq!(transport.executed(), 5);
        assert!(transport.peak.load(Ordering::SeqCst) <= 2);
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn handler_panic_fails_task_and_keeps_worker() {
        let transport = ScriptedTransport::replying(Ok(SIGNED_IN));
        let mut registry = registry();
        registry.register(PanickingDetailHandler);
        let dispatcher =
            Dispatcher::start(&config(1), registry, transport.clone(), Arc::new(Immediate))
                .unwrap();

        let (callback, rx) = outcome_channel();
        dispatcher.submit(Operation::gallery_detail("/g/1/abcdefabcd/"), callback);
        match recv(rx).await {
            Outcome::Failure(OperationError::Panicked { kind, message }) => {
                assert_eq!(kind, OperationKind::GalleryDetail);
                assert_eq!(message, "detail layout changed");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let (callback, rx) = outcome_channel();
        dispatcher.submit(Operation::sign_in("hippo", "pw"), callback);
        assert!(matches!(recv(rx).await, Outcome::Success(_)));

        wait_idle(&dispatcher).await;
        assert_eq!(transport.executed(), 2);
        dispatcher.shutdown().await;
        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
    }

    #[tokio::test]
    async fn callback_panic_keeps_worker() {
        let transport = ScriptedTransport::replying(Ok(SIGNED_IN));
        let dispatcher = dispatcher(1, transport.clone());

        dispatcher.submit(
            Operation::sign_in("hippo", "pw"),
            callback_fn(|_| panic!("callback failed")),
        );

        let (callback, rx) = outcome_channel();
        dispatcher.submit(Operation::sign_in("hippo", "pw"), callback);
        assert!(matches!(recv(rx).await, Outcome::Success(_)));

        wait_idle(&dispatcher).await;
        assert_eq!(transport.executed(), 2);
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn rejects_zero_workers() {
        let transport = ScriptedTransport::replying(Ok(SIGNED_IN));
        let result = Dispatcher::start(&config(0), registry(), transport, Arc::new(Immediate));
        assert!(result.is_err());
    }
}
