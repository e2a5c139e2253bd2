//! Correlation identifiers.
//!
//! A correlation id links one unit of asynchronous work to the completion
//! notification that eventually reports on it. Ids are generated by the
//! downstream backend, never by the relay, so they are treated as untrusted
//! opaque strings: the only rule enforced is that they are not empty.

use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Borrow;
use std::fmt;
use thiserror::Error;

/// Errors raised when building a [`CorrelationId`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorrelationIdError {
    /// The id was empty or contained only whitespace.
    #[error("Correlation id must not be empty")]
    Empty,
}

/// Opaque, non-empty identifier of one unit of async work.
///
/// # Example
///
/// ```
/// use gateway_relay_core::CorrelationId;
///
/// let id = CorrelationId::parse("req-1").unwrap();
/// assert_eq!(id.as_str(), "req-1");
/// assert!(CorrelationId::parse("  ").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Parse a correlation id, rejecting empty and blank strings.
    ///
    /// The value is stored as given; surrounding whitespace is not trimmed
    /// because the backend may treat it as significant.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationIdError::Empty`] if the string is empty or blank.
    pub fn parse(value: impl Into<String>) -> Result<Self, CorrelationIdError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(CorrelationIdError::Empty);
        }
        Ok(Self(value))
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the id and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CorrelationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for CorrelationId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CorrelationId {
    type Error = CorrelationIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for CorrelationId {
    type Error = CorrelationIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl<'de> Deserialize<'de> for CorrelationId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(raw).map_err(serde::de::Error::custom)
    }
}
