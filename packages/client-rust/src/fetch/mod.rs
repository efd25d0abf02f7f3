//! Document fetching over a cancellable transport.
//!
//! The transport is an external collaborator: it owns connection pooling, TLS
//! and redirects. This module only fixes the contract the dispatcher relies
//! on: a prepared call can be cancelled from another thread at any time, and
//! cancelling after completion is a no-op.

pub mod http;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use http::HttpTransport;

// ---------------------------------------------------------------------------
// FetchRequest
// ---------------------------------------------------------------------------

/// HTTP method of a prepared request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Payload of a prepared request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    /// `application/x-www-form-urlencoded` fields, in order.
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
}

/// Transport-level description of one outbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub body: RequestBody,
}

impl FetchRequest {
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: RequestBody::Empty,
        }
    }

    #[must_use]
    pub fn post_form(url: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: RequestBody::Form(fields),
        }
    }

    #[must_use]
    pub fn post_json(url: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: RequestBody::Json(value),
        }
    }
}

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

/// Failures reported by a [`Transport`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to {url} failed with status {status}")]
    Status { url: String, status: u16 },
    #[error("network error for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("call aborted")]
    Aborted,
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// Executes prepared calls. Shared by all workers, so implementations must be
/// safe for concurrent use.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Execute `request` and return the response body.
    ///
    /// Implementations must stop the call and release its resources as soon
    /// as `cancel` fires, returning [`TransportError::Aborted`].
    async fn execute(
        &self,
        request: FetchRequest,
        cancel: CancellationToken,
    ) -> Result<String, TransportError>;
}

// ---------------------------------------------------------------------------
// PreparedCall / CallHandle
// ---------------------------------------------------------------------------

/// A request bound to its own cancellation signal, not yet executed.
#[derive(Debug)]
pub struct PreparedCall {
    request: FetchRequest,
    token: CancellationToken,
}

impl PreparedCall {
    #[must_use]
    pub fn new(request: FetchRequest) -> Self {
        Self {
            request,
            token: CancellationToken::new(),
        }
    }

    /// Handle that can abort this call from any thread.
    #[must_use]
    pub fn handle(&self) -> CallHandle {
        CallHandle(self.token.clone())
    }

    #[must_use]
    pub fn request(&self) -> &FetchRequest {
        &self.request
    }

    /// Run the call on `transport`. Ownership of the cancellation signal
    /// passes to the transport for the duration of the call.
    ///
    /// # Errors
    ///
    /// Propagates the transport's error, including [`TransportError::Aborted`].
    pub async fn execute(self, transport: &dyn Transport) -> Result<String, TransportError> {
        transport.execute(self.request, self.token).await
    }
}

/// Cancellation handle for an in-flight call. Cancelling is idempotent and
/// harmless once the call has completed.
#[derive(Debug, Clone)]
pub struct CallHandle(CancellationToken);

impl CallHandle {
    pub fn cancel(&self) {
        self.0.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTransport;

    #[async_trait]
    impl Transport for EchoTransport {
        async fn execute(
            &self,
            request: FetchRequest,
            cancel: CancellationToken,
        ) -> Result<String, TransportError> {
            if cancel.is_cancelled() {
                return Err(TransportError::Aborted);
            }
            Ok(request.url)
        }
    }

    #[tokio::test]
    async fn prepared_call_executes_on_transport() {
        let call = PreparedCall::new(FetchRequest::get("https://host/a"));
        assert_eq!(call.request().method, Method::Get);
        let body = call.execute(&EchoTransport).await.unwrap();
        assert_eq!(body, "https://host/a");
    }

    #[tokio::test]
    async fn handle_cancels_before_execution() {
        let call = PreparedCall::new(FetchRequest::get("https://host/a"));
        let handle = call.handle();
        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());
        let err = call.execute(&EchoTransport).await.unwrap_err();
        assert!(matches!(err, TransportError::Aborted));
    }

    #[test]
    fn request_constructors() {
        let form = FetchRequest::post_form("u", vec![("k".to_string(), "v".to_string())]);
        assert_eq!(form.method, Method::Post);
        assert_eq!(
            form.body,
            RequestBody::Form(vec![("k".to_string(), "v".to_string())])
        );

        let json = FetchRequest::post_json("u", serde_json::json!({"a": 1}));
        assert!(matches!(json.body, RequestBody::Json(_)));
    }
}
