use std::collections::HashMap;
use std::sync::Arc;

use super::operation::{Operation, OperationError, OperationKind, OperationResponse};
use crate::config::SiteConfig;
use crate::fetch::FetchRequest;

// ---------------------------------------------------------------------------
// OperationHandler trait
// ---------------------------------------------------------------------------

/// Request preparation and response decoding for one operation kind.
///
/// Handlers are shared by every worker. Neither method blocks: the network
/// call between them is made by the task that owns the operation.
pub trait OperationHandler: Send + Sync + 'static {
    /// The kind this handler serves.
    fn kind(&self) -> OperationKind;

    /// Turn the operation's arguments into a transport request.
    ///
    /// # Errors
    ///
    /// Returns `OperationError::Argument` for invalid arguments and
    /// `OperationError::WrongHandler` for an operation of another kind.
    fn prepare(&self, op: &Operation) -> Result<FetchRequest, OperationError>;

    /// Decode a raw response body.
    ///
    /// # Errors
    ///
    /// Returns `OperationError::Structure` when the body does not have the
    /// expected page-level shape.
    fn decode(&self, body: &str) -> Result<OperationResponse, OperationError>;
}

// ---------------------------------------------------------------------------
// OperationRegistry
// ---------------------------------------------------------------------------

/// Closed table from [`OperationKind`] to its [`OperationHandler`].
///
/// Built once before the dispatcher starts and read-only afterwards. Adding an
/// operation means adding one handler and registering it here; the dispatcher
/// itself never inspects the kind.
pub struct OperationRegistry {
    handlers: HashMap<OperationKind, Arc<dyn OperationHandler>>,
}

impl OperationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Creates a registry with a handler for every [`OperationKind`].
    #[must_use]
    pub fn with_site(site: Arc<SiteConfig>) -> Self {
        use super::handlers::{
            GalleryDetailHandler, GalleryListHandler, LargePreviewSetHandler, RateGalleryHandler,
            SignInHandler,
        };

        let mut registry = Self::new();
        registry.register(SignInHandler::new(site.clone()));
        registry.register(GalleryListHandler::new(site.clone()));
        registry.register(GalleryDetailHandler::new(site.clone()));
        registry.register(LargePreviewSetHandler::new(site.clone()));
        registry.register(RateGalleryHandler::new(site));
        registry
    }

    /// Register a handler under its own kind, replacing any previous one.
    pub fn register<H: OperationHandler>(&mut self, handler: H) {
        self.handlers.insert(handler.kind(), Arc::new(handler));
    }

    /// Retrieve the handler for `kind`.
    #[must_use]
    pub fn get(&self, kind: OperationKind) -> Option<&Arc<dyn OperationHandler>> {
        self.handlers.get(&kind)
    }

    #[must_use]
    pub fn contains(&self, kind: OperationKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
