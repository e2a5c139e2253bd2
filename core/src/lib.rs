//! # Gateway Relay Core
//!
//! Core types and boundary traits for the Gateway Relay.
//!
//! The relay lets a request-facing gateway start work that a downstream worker
//! finishes out of band, and hands the caller the result as if the call had
//! been synchronous. This crate holds everything the moving parts agree on:
//!
//! - **Correlation ids**: [`CorrelationId`], the opaque token issued by the backend
//! - **Completion records**: [`CompletionRecord`] and its [`Outcome`]
//! - **Wire shapes**: [`CompletionMessage`] (bus) and [`Acceptance`] (backend)
//! - **Boundaries**: the [`EventBus`](event_bus::EventBus) and
//!   [`AsyncBackend`](backend::AsyncBackend) traits
//!
//! ## Flow
//!
//! ```text
//! caller ──► orchestrator ──► backend ──► (requestId, 202)
//!                 │
//!                 ▼
//!        registry.await_result(id) ◄── registry.complete(record) ◄── listener ◄── bus
//! ```
//!
//! The registry itself lives in `gateway-relay-runtime`.

pub mod backend;
pub mod completion;
pub mod correlation;
pub mod event_bus;

pub use chrono::{DateTime, Utc};
pub use serde_json::Value;

pub use backend::{Acceptance, AsyncBackend, BackendCall, BackendError, CallMethod};
pub use completion::{CompletionMessage, CompletionRecord, MalformedNotification, Outcome};
pub use correlation::{CorrelationId, CorrelationIdError};
pub use event_bus::{BusMessage, EventBus, EventBusError, MessageStream};
