//! The outbound call that starts async work.
//!
//! The orchestrator asks the backend to start a unit of work. The backend
//! answers right away with an [`Acceptance`]: either a refusal, or a 202 with
//! the `requestId` the worker will later report on.

use crate::correlation::CorrelationId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Status code the backend uses for accepted async work.
pub const ACCEPTED_CODE: u16 = 202;

/// Errors from the outbound call itself (not from the async work).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend could not be reached.
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    /// The backend answered with something that is not an acknowledgement.
    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),
}

/// HTTP method of a proxied call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
}

impl fmt::Display for CallMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// One call to forward to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendCall {
    /// HTTP method.
    pub method: CallMethod,
    /// Path relative to the backend base URL (e.g. `/people/names`).
    pub path: String,
    /// Optional JSON body.
    pub body: Option<Value>,
    /// `Authorization` header to pass through.
    pub authorization: Option<String>,
}

impl BackendCall {
    /// Create a call without body or credentials.
    #[must_use]
    pub fn new(method: CallMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            authorization: None,
        }
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach an `Authorization` header value. Blank values are dropped.
    #[must_use]
    pub fn with_authorization(mut self, authorization: impl Into<String>) -> Self {
        let authorization = authorization.into();
        self.authorization = (!authorization.trim().is_empty()).then_some(authorization);
        self
    }
}

/// Acknowledgement returned by the backend when work is submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acceptance {
    /// Whether the backend accepted the work.
    #[serde(alias = "success", default)]
    pub accepted: bool,
    /// Backend status code (202 for accepted async work).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    /// Human readable message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Correlation id of the started work.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Any payload the backend attached to the acknowledgement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Acceptance {
    /// An accepted acknowledgement for `request_id` with code 202.
    #[must_use]
    pub fn accepted(request_id: impl Into<String>) -> Self {
        Self {
            accepted: true,
            code: Some(ACCEPTED_CODE),
            message: None,
            request_id: Some(request_id.into()),
            data: None,
        }
    }

    /// A refusal with the given code and message.
    #[must_use]
    pub fn rejected(code: u16, message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            code: Some(code),
            message: Some(message.into()),
            request_id: None,
            data: None,
        }
    }

    /// The correlation id to wait on, if the work was really accepted.
    ///
    /// Requires `accepted`, a code that is absent or 202, and a non-empty
    /// `requestId`.
    #[must_use]
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        if !self.accepted || self.code.is_some_and(|code| code != ACCEPTED_CODE) {
            return None;
        }
        self.request_id
            .as_deref()
            .and_then(|raw| CorrelationId::parse(raw).ok())
    }
}

/// The downstream service that starts async work.
///
/// Dyn-compatible for use as `Arc<dyn AsyncBackend>`.
pub trait AsyncBackend: Send + Sync {
    /// Submit a call and return the backend's acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the backend is unreachable or its answer
    /// cannot be read as an [`Acceptance`].
    fn submit(
        &self,
        call: BackendCall,
    ) -> Pin<Box<dyn Future<Output = Result<Acceptance, BackendError>> + Send + '_>>;
}
