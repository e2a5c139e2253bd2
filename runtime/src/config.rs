//! Registry configuration.
//!
//! # Example
//!
//! ```rust
//! use gateway_relay_runtime::config::{LateCompletionPolicy, RegistryConfig};
//! use std::time::Duration;
//!
//! let config = RegistryConfig::builder()
//!     .wait_timeout(Duration::from_secs(10))
//!     .retention(Duration::from_secs(120))
//!     .late_completion(LateCompletionPolicy::Retain)
//!     .build();
//!
//! assert!(config.validate().is_ok());
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default per-call wait before a caller gets a timeout.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time an unclaimed early result is kept.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60);

/// Default number of map shards.
pub const DEFAULT_SHARDS: usize = 32;

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A value failed validation.
    #[error("Configuration validation failed: {0}")]
    Invalid(String),

    /// A value could not be parsed.
    #[error("Failed to parse configuration value '{value}' for {field}")]
    Parse {
        /// Name of the setting.
        field: &'static str,
        /// Raw value that failed.
        value: String,
    },
}

/// What to do with a completion that arrives after its waiter timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LateCompletionPolicy {
    /// Drop it and log. The id is remembered for one retention window so
    /// the late record is recognised instead of being parked.
    #[default]
    Drop,
    /// Park it as an early result, so a retry that awaits the same id
    /// within the retention window still gets it.
    Retain,
}

impl fmt::Display for LateCompletionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drop => write!(f, "drop"),
            Self::Retain => write!(f, "retain"),
        }
    }
}

impl FromStr for LateCompletionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "retain" | "store" => Ok(Self::Retain),
            _ => Err(ConfigError::Parse {
                field: "late_completion",
                value: s.to_string(),
            }),
        }
    }
}

/// Correlation registry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Default wait used by [`CorrelationRegistry::await_default`](crate::CorrelationRegistry::await_default).
    pub wait_timeout: Duration,
    /// How long an early result (and a settled-id marker) is kept.
    pub retention: Duration,
    /// Handling of completions that arrive after their waiter gave up.
    pub late_completion: LateCompletionPolicy,
    /// Number of independently locked map shards (a power of two).
    pub shards: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            retention: DEFAULT_RETENTION,
            late_completion: LateCompletionPolicy::Drop,
            shards: DEFAULT_SHARDS,
        }
    }
}

impl RegistryConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub const fn builder() -> RegistryConfigBuilder {
        RegistryConfigBuilder {
            wait_timeout: None,
            retention: None,
            late_completion: None,
            shards: None,
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a duration is zero or there are no shards.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wait_timeout.is_zero() {
            return Err(ConfigError::Invalid("wait_timeout must be > 0".to_string()));
        }
        if self.retention.is_zero() {
            return Err(ConfigError::Invalid("retention must be > 0".to_string()));
        }
        if self.shards == 0 {
            return Err(ConfigError::Invalid("shards must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Builder for [`RegistryConfig`].
#[derive(Debug, Clone)]
pub struct RegistryConfigBuilder {
    wait_timeout: Option<Duration>,
    retention: Option<Duration>,
    late_completion: Option<LateCompletionPolicy>,
    shards: Option<usize>,
}

impl RegistryConfigBuilder {
    /// Set the default per-call wait.
    #[must_use]
    pub const fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    /// Set the early-result retention window.
    #[must_use]
    pub const fn retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    /// Set the late completion policy.
    #[must_use]
    pub const fn late_completion(mut self, policy: LateCompletionPolicy) -> Self {
        self.late_completion = Some(policy);
        self
    }

    /// Set the shard count. Rounded up to the next power of two.
    #[must_use]
    pub const fn shards(mut self, shards: usize) -> Self {
        self.shards = Some(shards);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> RegistryConfig {
        RegistryConfig {
            wait_timeout: self.wait_timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT),
            retention: self.retention.unwrap_or(DEFAULT_RETENTION),
            late_completion: self.late_completion.unwrap_or_default(),
            shards: self.shards.unwrap_or(DEFAULT_SHARDS).max(1).next_power_of_two(),
        }
    }
}
