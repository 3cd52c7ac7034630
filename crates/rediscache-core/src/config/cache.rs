//! Store connection configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Connection parameters shared by every named cache client.
///
/// Bound once at startup and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfiguration {
    /// Store address in `host:port` form.
    pub endpoint: String,
    /// Authentication credential.
    pub secret: String,
    /// Transport tuning; defaults match the production policy.
    #[serde(default)]
    pub connection: ConnectionTuning,
}

impl CacheConfiguration {
    /// Name of the configuration section.
    pub const SECTION_NAME: &'static str = "cache";

    /// Create a configuration with the default transport tuning.
    pub fn new(endpoint: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            secret: secret.into(),
            connection: ConnectionTuning::default(),
        }
    }

    /// Check that the endpoint has a usable `host:port` form.
    pub fn validate(&self) -> Result<(), AppError> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(AppError::configuration("Cache endpoint must not be empty"));
        }

        let Some((host, port)) = endpoint.rsplit_once(':') else {
            return Err(AppError::configuration(format!(
                "Cache endpoint '{endpoint}' must be in host:port form"
            )));
        };

        if host.is_empty() || port.parse::<u16>().is_err() {
            return Err(AppError::configuration(format!(
                "Cache endpoint '{endpoint}' must be in host:port form"
            )));
        }

        Ok(())
    }
}

/// Transport-level settings for a store connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionTuning {
    /// Connect over TLS (TLS 1.2 or newer).
    #[serde(default = "default_true")]
    pub use_tls: bool,
    /// Allow administrative commands through the raw command pass-through.
    #[serde(default)]
    pub allow_admin: bool,
    /// Fail the registration when the first connect attempt fails, instead
    /// of returning a disconnected handle that keeps retrying.
    #[serde(default)]
    pub abort_on_connect_fail: bool,
    /// Base reconnect delay in milliseconds.
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
    /// Growth factor applied to the reconnect delay after each attempt.
    #[serde(default = "default_retry_factor")]
    pub retry_factor: u64,
    /// Upper bound for a single reconnect delay in milliseconds.
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_ms: u64,
    /// Timeout for a single store command in milliseconds.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_ms: u64,
    /// Timeout for establishing a connection in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Wire protocol version to speak: `"resp2"` or `"resp3"`.
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

impl ConnectionTuning {
    /// Command timeout as a [`Duration`].
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    /// Connect timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for ConnectionTuning {
    fn default() -> Self {
        Self {
            use_tls: default_true(),
            allow_admin: false,
            abort_on_connect_fail: false,
            retry_base_delay_ms: default_retry_base_delay(),
            retry_factor: default_retry_factor(),
            retry_max_delay_ms: default_retry_max_delay(),
            operation_timeout_ms: default_operation_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            protocol: default_protocol(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_retry_base_delay() -> u64 {
    30
}

fn default_retry_factor() -> u64 {
    2
}

fn default_retry_max_delay() -> u64 {
    500
}

fn default_operation_timeout() -> u64 {
    500
}

fn default_connect_timeout() -> u64 {
    2000
}

fn default_protocol() -> String {
    "resp2".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let tuning = ConnectionTuning::default();
        assert!(tuning.use_tls);
        assert!(!tuning.allow_admin);
        assert!(!tuning.abort_on_connect_fail);
        assert_eq!(tuning.operation_timeout(), Duration::from_millis(500));
        assert_eq!(tuning.connect_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_validate_endpoint() {
        assert!(CacheConfiguration::new("cache.example:6380", "s3cr3t").validate().is_ok());
        assert!(CacheConfiguration::new("", "s3cr3t").validate().is_err());
        assert!(CacheConfiguration::new("cache.example", "s3cr3t").validate().is_err());
        assert!(CacheConfiguration::new(":6380", "s3cr3t").validate().is_err());
        assert!(CacheConfiguration::new("cache.example:port", "s3cr3t").validate().is_err());
    }
}
