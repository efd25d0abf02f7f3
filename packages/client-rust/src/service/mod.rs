//! Operation dispatch.
//!
//! 1. **Operations** (`operation`): typed descriptors, responses and errors
//! 2. **Registry** (`registry`, `handlers`): `OperationKind` -> request preparation and decoding
//! 3. **Tasks** (`task`): per-submission phase machine owning the callback
//! 4. **Callbacks** (`callback`): completion notifications and the contexts they run on
//! 5. **Dispatcher** (`dispatcher`): bounded worker pool with cancellation and shutdown

pub mod callback;
pub mod dispatcher;
pub mod handlers;
pub mod operation;
pub mod registry;
pub mod task;

// Re-export key types for convenient access.
pub use callback::{
    callback_fn, mailbox, outcome_channel, Callback, CallbackContext, Immediate, Mailbox,
    MailboxSender, Outcome,
};
pub use dispatcher::{CancellationHandle, Dispatcher, DispatcherState, Request};
pub use operation::{
    Operation, OperationError, OperationKind, OperationResponse, PageArgs, RateArgs, SignInArgs,
};
pub use registry::{OperationHandler, OperationRegistry};
pub use task::{Task, TaskPhase};
