//! Completion records and their wire representation.
//!
//! A [`CompletionRecord`] is what the registry hands to a waiting caller. It is
//! built from a [`CompletionMessage`], the JSON shape the downstream worker
//! publishes on the message bus:
//!
//! ```json
//! {
//!   "requestId": "req-1",
//!   "status": "completed",
//!   "data": { "names": ["Ayaka", "Kuro"] },
//!   "error": null,
//!   "source": "people-consumer",
//!   "timestamp": "2025-01-01T00:00:00Z"
//! }
//! ```
//!
//! `id` is accepted as an alternative spelling of `requestId`; when both are
//! present `requestId` wins.

use crate::correlation::CorrelationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Error text used when a failed message carries no error description.
pub const DEFAULT_FAILURE_MESSAGE: &str = "async processing failed";

/// A notification that cannot be turned into a [`CompletionRecord`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedNotification {
    /// The message carried no usable correlation id.
    #[error("Notification has no usable correlation id")]
    MissingId,

    /// The payload was not valid JSON for a completion message.
    #[error("Notification could not be decoded: {0}")]
    Undecodable(String),
}

/// Application-level result of one unit of async work.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The work succeeded; carries the application payload.
    Succeeded(Value),
    /// The work failed; carries an error description.
    Failed(String),
}

/// The outcome of one correlated unit of work, as delivered to a waiter.
///
/// A `Failed` outcome is still a successful delivery: the transport worked,
/// the application did not. Callers branch on [`CompletionRecord::outcome`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRecord {
    /// Correlation id this record answers.
    pub id: CorrelationId,
    /// Success payload or failure description.
    pub outcome: Outcome,
    /// Producer of the notification (informational).
    pub source: Option<String>,
    /// When the producer created the notification (informational).
    pub produced_at: Option<DateTime<Utc>>,
}

impl CompletionRecord {
    /// Build a successful record.
    #[must_use]
    pub const fn succeeded(id: CorrelationId, data: Value) -> Self {
        Self {
            id,
            outcome: Outcome::Succeeded(data),
            source: None,
            produced_at: None,
        }
    }

    /// Build a failed record.
    #[must_use]
    pub fn failed(id: CorrelationId, error: impl Into<String>) -> Self {
        Self {
            id,
            outcome: Outcome::Failed(error.into()),
            source: None,
            produced_at: None,
        }
    }

    /// Attach the producer name.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attach the production timestamp.
    #[must_use]
    pub fn with_produced_at(mut self, produced_at: DateTime<Utc>) -> Self {
        self.produced_at = Some(produced_at);
        self
    }

    /// Whether the application work succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Succeeded(_))
    }
}

/// Wire shape of a completion notification on the message bus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionMessage {
    /// Correlation id as `requestId`. Preferred over `id` when both are set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Correlation id as `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// `completed` or `failed` (matched case-insensitively).
    #[serde(default)]
    pub status: Option<String>,
    /// Result payload, present when `status` is `completed`.
    #[serde(default)]
    pub data: Option<Value>,
    /// Error text, present when `status` is `failed`.
    #[serde(default)]
    pub error: Option<String>,
    /// Producer name.
    #[serde(default)]
    pub source: Option<String>,
    /// ISO-8601 production time.
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl CompletionMessage {
    /// Decode a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedNotification::Undecodable`] if the bytes are not a
    /// JSON object of the expected shape.
    pub fn from_json(payload: &[u8]) -> Result<Self, MalformedNotification> {
        serde_json::from_slice(payload)
            .map_err(|e| MalformedNotification::Undecodable(e.to_string()))
    }

    /// Encode as JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedNotification::Undecodable`] if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, MalformedNotification> {
        serde_json::to_vec(self).map_err(|e| MalformedNotification::Undecodable(e.to_string()))
    }
}

impl From<&CompletionRecord> for CompletionMessage {
    fn from(record: &CompletionRecord) -> Self {
        let (status, data, error) = match &record.outcome {
            Outcome::Succeeded(data) => ("completed", Some(data.clone()), None),
            Outcome::Failed(error) => ("failed", None, Some(error.clone())),
        };
        Self {
            request_id: Some(record.id.to_string()),
            id: None,
            status: Some(status.to_string()),
            data,
            error,
            source: record.source.clone(),
            timestamp: record.produced_at.map(|t| t.to_rfc3339()),
        }
    }
}

impl TryFrom<CompletionMessage> for CompletionRecord {
    type Error = MalformedNotification;

    fn try_from(message: CompletionMessage) -> Result<Self, Self::Error> {
        let id = [message.request_id, message.id]
            .into_iter()
            .flatten()
            .find_map(|raw| CorrelationId::parse(raw).ok())
            .ok_or(MalformedNotification::MissingId)?;

        let status = message.status.unwrap_or_default();
        let outcome = if status.eq_ignore_ascii_case("completed") {
            Outcome::Succeeded(message.data.unwrap_or(Value::Null))
        } else if status.eq_ignore_ascii_case("failed") {
            Outcome::Failed(
                message
                    .error
                    .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
            )
        } else {
            Outcome::Failed(message.error.unwrap_or_else(|| {
                format!("{DEFAULT_FAILURE_MESSAGE} (status '{status}')")
            }))
        };

        let produced_at = message
            .timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc));

        Ok(Self {
            id,
            outcome,
            source: message.source,
            produced_at,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn decode(value: &Value) -> Result<CompletionRecord, MalformedNotification> {
        let bytes = serde_json::to_vec(value).unwrap();
        CompletionRecord::try_from(CompletionMessage::from_json(&bytes)?)
    }

    #[test]
    fn test_completed_message_with_request_id() {
        let record = decode(&json!({
            "requestId": "req-1",
            "status": "completed",
            "data": 42,
            "source": "people-consumer",
            "timestamp": "2025-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(record.id.as_str(), "req-1");
        assert_eq!(record.outcome, Outcome::Succeeded(json!(42)));
        assert_eq!(record.source.as_deref(), Some("people-consumer"));
        assert!(record.produced_at.is_some());
    }

    #[test]
    fn test_id_alias_and_case_insensitive_status() {
        let record = decode(&json!({ "id": "req-2", "status": "FAILED", "error": "boom" })).unwrap();
        assert_eq!(record.id.as_str(), "req-2");
        assert_eq!(record.outcome, Outcome::Failed("boom".to_string()));
        assert!(!record.is_success());
    }

    #[test]
    fn test_both_id_spellings_decode() {
        let message = CompletionMessage::from_json(
            br#"{"id":"req-9","requestId":"req-9","status":"completed","data":1}"#,
        )
        .unwrap();
        let record = CompletionRecord::try_from(message).unwrap();
        assert_eq!(record.id.as_str(), "req-9");
        assert_eq!(record.outcome, Outcome::Succeeded(json!(1)));
    }

    #[test]
    fn test_request_id_wins_over_blank_or_different_id() {
        let record = decode(&json!({ "id": "legacy", "requestId": "req-10", "status": "completed" }))
            .unwrap();
        assert_eq!(record.id.as_str(), "req-10");

        let record = decode(&json!({ "id": "req-11", "requestId": " ", "status": "completed" }))
            .unwrap();
        assert_eq!(record.id.as_str(), "req-11");
    }

    #[test]
    fn test_failed_without_error_gets_default_text() {
        let record = decode(&json!({ "requestId": "r", "status": "failed" })).unwrap();
        assert_eq!(record.outcome, Outcome::Failed(DEFAULT_FAILURE_MESSAGE.to_string()));
    }

    #[test]
    fn test_unknown_status_is_failure() {
        let record = decode(&json!({ "requestId": "r", "status": "pending" })).unwrap();
        match record.outcome {
            Outcome::Failed(text) => assert!(text.contains("pending")),
            Outcome::Succeeded(_) => panic!("unknown status must not succeed"),
        }
    }

    #[test]
    fn test_bad_timestamp_is_ignored() {
        let record = decode(&json!({
            "requestId": "r",
            "status": "completed",
            "timestamp": "yesterday"
        }))
        .unwrap();
        assert!(record.produced_at.is_none());
        assert_eq!(record.outcome, Outcome::Succeeded(Value::Null));
    }

    #[test]
    fn test_missing_or_blank_id_is_malformed() {
        assert_eq!(
            decode(&json!({ "status": "completed" })),
            Err(MalformedNotification::MissingId)
        );
        assert_eq!(
            decode(&json!({ "requestId": "", "status": "completed" })),
            Err(MalformedNotification::MissingId)
        );
    }

    #[test]
    fn test_not_json_is_undecodable() {
        assert!(matches!(
            CompletionMessage::from_json(b"not json"),
            Err(MalformedNotification::Undecodable(_))
        ));
    }

    #[test]
    fn test_record_to_message_keeps_outcome() {
        let id = CorrelationId::parse("req-3").unwrap();
        let record = CompletionRecord::failed(id, "boom").with_source("worker");
        let message = CompletionMessage::from(&record);
        assert_eq!(message.status.as_deref(), Some("failed"));
        assert_eq!(message.error.as_deref(), Some("boom"));
        assert_eq!(CompletionRecord::try_from(message).unwrap(), record);
    }

    proptest! {
        #[test]
        fn prop_arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            if let Ok(message) = CompletionMessage::from_json(&bytes) {
                let _ = CompletionRecord::try_from(message);
            }
        }
    }
}
