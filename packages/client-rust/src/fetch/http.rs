//! `reqwest`-backed transport.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{FetchRequest, Method, RequestBody, Transport, TransportError};
use crate::config::TransportConfig;

/// Transport over a shared `reqwest::Client` connection pool.
///
/// Cancellation drops the in-flight request future, which closes the
/// underlying connection instead of reading the rest of the response.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed (e.g. the TLS
    /// backend fails to initialise).
    pub fn new(config: &TransportConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an existing client, sharing its pool with other users.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn send(&self, request: FetchRequest) -> Result<String, TransportError> {
        let FetchRequest { method, url, body } = request;
        let builder = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        let builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Form(fields) => builder.form(&fields),
            RequestBody::Json(value) => builder.json(&value),
        };

        let response = builder
            .send()
            .await
            .map_err(|source| TransportError::Network {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url,
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|source| TransportError::Network { url, source })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        request: FetchRequest,
        cancel: CancellationToken,
    ) -> Result<String, TransportError> {
        let url = request.url.clone();
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(%url, "call aborted");
                Err(TransportError::Aborted)
            }
            result = self.send(request) => result,
        }
    }
}
