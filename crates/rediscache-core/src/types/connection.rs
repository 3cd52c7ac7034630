//! Connection parameters handed to a [`StoreConnector`](crate::traits::StoreConnector).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::cache::CacheConfiguration;
use crate::error::AppError;
use crate::types::ClientName;

/// Wire protocol version the store client is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    /// RESP2.
    #[default]
    Resp2,
    /// RESP3.
    Resp3,
}

impl FromStr for ProtocolVersion {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "resp2" | "2" => Ok(Self::Resp2),
            "resp3" | "3" => Ok(Self::Resp3),
            other => Err(AppError::configuration(format!(
                "Unknown protocol version: '{other}'. Supported: resp2, resp3"
            ))),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resp2 => write!(f, "resp2"),
            Self::Resp3 => write!(f, "resp3"),
        }
    }
}

/// Exponential backoff used for transport-level reconnection.
///
/// The n-th delay is `base_delay * factor^n`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first reconnect attempt.
    pub base_delay: Duration,
    /// Growth factor between attempts.
    pub factor: u64,
    /// Cap for a single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before reconnect attempt number `attempt` (zero based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = self.factor.max(1).saturating_pow(attempt);
        let millis = (self.base_delay.as_millis() as u64).saturating_mul(multiplier);
        Duration::from_millis(millis).min(self.max_delay)
    }
}

/// Everything a connector needs to open one named store connection.
#[derive(Clone)]
pub struct ConnectionOptions {
    /// Identity the client reports to the server.
    pub client_name: ClientName,
    /// Store address in `host:port` form.
    pub endpoint: String,
    /// Authentication credential.
    pub secret: String,
    /// Connect over TLS.
    pub use_tls: bool,
    /// Allow administrative commands.
    pub allow_admin: bool,
    /// Fail instead of returning a disconnected, retrying handle.
    pub abort_on_connect_fail: bool,
    /// Reconnect backoff.
    pub retry: RetryPolicy,
    /// Timeout for a single command.
    pub operation_timeout: Duration,
    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,
    /// Pinned wire protocol version.
    pub protocol: ProtocolVersion,
}

impl ConnectionOptions {
    /// Derive the options for the client named `client_name`.
    pub fn from_config(config: &CacheConfiguration, client_name: ClientName) -> Result<Self, AppError> {
        config.validate()?;
        let tuning = &config.connection;

        Ok(Self {
            client_name,
            endpoint: config.endpoint.trim().to_string(),
            secret: config.secret.clone(),
            use_tls: tuning.use_tls,
            allow_admin: tuning.allow_admin,
            abort_on_connect_fail: tuning.abort_on_connect_fail,
            retry: RetryPolicy {
                base_delay: Duration::from_millis(tuning.retry_base_delay_ms),
                factor: tuning.retry_factor,
                max_delay: Duration::from_millis(tuning.retry_max_delay_ms),
            },
            operation_timeout: tuning.operation_timeout(),
            connect_timeout: tuning.connect_timeout(),
            protocol: tuning.protocol.parse()?,
        })
    }
}

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("client_name", &self.client_name)
            .field("endpoint", &self.endpoint)
            .field("secret", &"****")
            .field("use_tls", &self.use_tls)
            .field("allow_admin", &self.allow_admin)
            .field("abort_on_connect_fail", &self.abort_on_connect_fail)
            .field("retry", &self.retry)
            .field("operation_timeout", &self.operation_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("protocol", &self.protocol)
            .finish()
    }
}
