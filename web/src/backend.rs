//! reqwest-backed [`AsyncBackend`].
//!
//! Forwards a [`BackendCall`] to the downstream service and reads its
//! acknowledgement. The body is decoded as an [`Acceptance`] whatever the
//! HTTP status: the backend reports its own code inside the body.

use gateway_relay_core::{Acceptance, AsyncBackend, BackendCall, BackendError, CallMethod};
use reqwest::header::AUTHORIZATION;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// HTTP client for the async backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a backend client for `base_url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unreachable`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Unreachable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Base URL calls are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for `path`, with exactly one slash at the join.
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn send(&self, call: BackendCall) -> Result<Acceptance, BackendError> {
        let url = self.url_for(&call.path);
        let mut request = match call.method {
            CallMethod::Get => self.client.get(&url),
            CallMethod::Post => self.client.post(&url),
            CallMethod::Put => self.client.put(&url),
            CallMethod::Delete => self.client.delete(&url),
        };
        if let Some(authorization) = &call.authorization {
            request = request.header(AUTHORIZATION, authorization);
        }
        if let Some(body) = &call.body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Unreachable(format!("{} {url}: {e}", call.method)))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::Unreachable(format!("failed to read response: {e}")))?;

        tracing::debug!(method = %call.method, url = %url, status = %status, "Backend acknowledged call");

        serde_json::from_slice(&bytes).map_err(|e| {
            BackendError::InvalidResponse(format!("HTTP {status} body is not an acknowledgement: {e}"))
        })
    }
}

impl AsyncBackend for HttpBackend {
    fn submit(
        &self,
        call: BackendCall,
    ) -> Pin<Box<dyn Future<Output = Result<Acceptance, BackendError>> + Send + '_>> {
        Box::pin(self.send(call))
    }
}
