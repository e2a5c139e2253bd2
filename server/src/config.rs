//! Configuration management for the gateway relay server.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Numeric values that fail to parse fall back to their default; the late
//! completion policy is checked by [`Config::validate`].

use gateway_relay_runtime::config::{ConfigError, LateCompletionPolicy, RegistryConfig};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Async backend configuration
    pub backend: BackendConfig,
    /// Call-and-wait configuration
    pub gateway: GatewayConfig,
    /// RedPanda/Kafka configuration
    pub redpanda: RedpandaConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Expose Prometheus metrics on `/metrics`
    pub metrics_enabled: bool,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

/// Async backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL calls are forwarded to
    pub base_url: String,
    /// Per-request timeout for the acknowledgement, in seconds
    pub timeout_secs: u64,
}

/// Call-and-wait configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// How long a caller waits for the async result, in seconds
    pub async_timeout_secs: u64,
    /// How long an unclaimed early result is kept, in seconds
    pub result_retention_secs: u64,
    /// `drop` or `retain`
    pub late_completion_policy: String,
}

/// RedPanda/Kafka configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedpandaConfig {
    /// Broker addresses (comma-separated)
    pub brokers: String,
    /// Topic carrying completion notifications
    pub topic: String,
    /// Consumer group of the notification listener
    pub consumer_group: String,
}

fn parsed_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn string_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_string())
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            server: ServerConfig {
                host: string_or(&lookup, "HOST", "0.0.0.0"),
                port: parsed_or(&lookup, "PORT", 8080),
                metrics_enabled: parsed_or(&lookup, "METRICS_ENABLED", true),
                shutdown_timeout: parsed_or(&lookup, "SHUTDOWN_TIMEOUT", 30),
            },
            backend: BackendConfig {
                base_url: string_or(&lookup, "BACKEND_BASE_URL", "http://localhost:8081"),
                timeout_secs: parsed_or(&lookup, "BACKEND_TIMEOUT_SECS", 10),
            },
            gateway: GatewayConfig {
                async_timeout_secs: parsed_or(&lookup, "GATEWAY_ASYNC_TIMEOUT_SECS", 30),
                result_retention_secs: parsed_or(&lookup, "GATEWAY_RESULT_RETENTION_SECS", 60),
                late_completion_policy: string_or(&lookup, "GATEWAY_LATE_COMPLETION_POLICY", "drop"),
            },
            redpanda: RedpandaConfig {
                brokers: string_or(&lookup, "REDPANDA_BROKERS", "localhost:9092"),
                topic: string_or(&lookup, "ASYNC_RESULT_TOPIC", "async-result"),
                consumer_group: string_or(&lookup, "CONSUMER_GROUP", "gateway-relay"),
            },
        }
    }

    /// Address the HTTP server binds to.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Per-request backend timeout.
    #[must_use]
    pub const fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.timeout_secs)
    }

    /// Graceful shutdown budget.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout)
    }

    /// Registry configuration derived from the gateway settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the late completion policy is unknown or a
    /// duration is zero.
    pub fn registry_config(&self) -> Result<RegistryConfig, ConfigError> {
        let policy: LateCompletionPolicy = self.gateway.late_completion_policy.parse()?;
        let config = RegistryConfig::builder()
            .wait_timeout(Duration::from_secs(self.gateway.async_timeout_secs))
            .retention(Duration::from_secs(self.gateway.result_retention_secs))
            .late_completion(policy)
            .build();
        config.validate()?;
        Ok(config)
    }

    /// Validate the whole configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("PORT must be > 0".to_string()));
        }
        let base_url = self.backend.base_url.trim();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "BACKEND_BASE_URL must start with http:// or https://, got '{base_url}'"
            )));
        }
        if self.backend.timeout_secs == 0 {
            return Err(ConfigError::Invalid("BACKEND_TIMEOUT_SECS must be > 0".to_string()));
        }
        if self.redpanda.brokers.trim().is_empty() {
            return Err(ConfigError::Invalid("REDPANDA_BROKERS must not be empty".to_string()));
        }
        if self.redpanda.topic.trim().is_empty() {
            return Err(ConfigError::Invalid("ASYNC_RESULT_TOPIC must not be empty".to_string()));
        }
        self.registry_config().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.backend.base_url, "http://localhost:8081");
        assert_eq!(config.redpanda.topic, "async-result");
        assert!(config.server.metrics_enabled);
        assert!(config.validate().is_ok());

        let registry = config.registry_config().unwrap();
        assert_eq!(registry.wait_timeout, Duration::from_secs(30));
        assert_eq!(registry.retention, Duration::from_secs(60));
        assert_eq!(registry.late_completion, LateCompletionPolicy::Drop);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "9000"),
            ("GATEWAY_ASYNC_TIMEOUT_SECS", "5"),
            ("GATEWAY_RESULT_RETENTION_SECS", "120"),
            ("GATEWAY_LATE_COMPLETION_POLICY", "Retain"),
            ("METRICS_ENABLED", "false"),
        ]);
        assert_eq!(config.server.port, 9000);
        assert!(!config.server.metrics_enabled);

        let registry = config.registry_config().unwrap();
        assert_eq!(registry.wait_timeout, Duration::from_secs(5));
        assert_eq!(registry.retention, Duration::from_secs(120));
        assert_eq!(registry.late_completion, LateCompletionPolicy::Retain);
    }

    #[test]
    fn test_unparseable_number_falls_back_to_default() {
        let config = config_from(&[("BACKEND_TIMEOUT_SECS", "ten")]);
        assert_eq!(config.backend_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        let config = config_from(&[("GATEWAY_LATE_COMPLETION_POLICY", "maybe")]);
        assert!(matches!(config.validate(), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_zero_wait_is_rejected() {
        let config = config_from(&[("GATEWAY_ASYNC_TIMEOUT_SECS", "0")]);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_backend_url_must_be_http() {
        let config = config_from(&[("BACKEND_BASE_URL", "backend:8081")]);
        assert!(config.validate().is_err());
    }
}
