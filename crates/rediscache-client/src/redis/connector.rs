//! Redis connection management.

use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{Client, ConnectionInfo, IntoConnectionInfo};
use tracing::{info, warn};

use rediscache_core::error::{AppError, ErrorKind};
use rediscache_core::result::AppResult;
use rediscache_core::traits::{KeyValueStore, StoreConnector};
use rediscache_core::types::{ConnectionOptions, ProtocolVersion};

use super::store::RedisStore;

/// Opens [`RedisStore`] connections with the redis crate's
/// [`ConnectionManager`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisConnector;

impl RedisConnector {
    /// Create a new connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StoreConnector for RedisConnector {
    async fn connect(&self, options: &ConnectionOptions) -> AppResult<Arc<dyn KeyValueStore>> {
        info!(
            client = %options.client_name,
            endpoint = %options.endpoint,
            tls = options.use_tls,
            "Connecting to Redis"
        );

        let client = Client::open(connection_info(options)?).map_err(|e| {
            AppError::with_source(ErrorKind::Connection, "Failed to create Redis client", e)
        })?;

        match open_manager(&client, options).await {
            Ok(conn) => {
                info!(client = %options.client_name, "Successfully connected to Redis");
                Ok(RedisStore::connected(client, options.clone(), conn))
            }
            Err(e) if options.abort_on_connect_fail => Err(AppError::with_source(
                ErrorKind::Connection,
                format!("Failed to connect to Redis at {}", options.endpoint),
                e,
            )),
            Err(e) => {
                warn!(
                    client = %options.client_name,
                    endpoint = %options.endpoint,
                    error = %e,
                    "Redis is unreachable, returning a disconnected handle that keeps retrying"
                );
                Ok(RedisStore::pending(client, options.clone()))
            }
        }
    }
}

/// Build the connection target from the options.
///
/// The secret is placed on the parsed [`ConnectionInfo`] rather than in the
/// URL so it never needs escaping.
pub(crate) fn connection_info(options: &ConnectionOptions) -> AppResult<ConnectionInfo> {
    let scheme = if options.use_tls { "rediss" } else { "redis" };
    let mut info = format!("{scheme}://{}", options.endpoint)
        .into_connection_info()
        .map_err(|e| {
            AppError::with_source(
                ErrorKind::Configuration,
                format!("Invalid Redis endpoint '{}'", options.endpoint),
                e,
            )
        })?;

    if !options.secret.is_empty() {
        info.redis.password = Some(options.secret.clone());
    }
    info.redis.protocol = match options.protocol {
        ProtocolVersion::Resp2 => redis::ProtocolVersion::RESP2,
        ProtocolVersion::Resp3 => redis::ProtocolVersion::RESP3,
    };

    Ok(info)
}

/// Timeouts for the connection manager.
///
/// The manager makes a single attempt per connect. Reconnect backoff is
/// driven by [`RedisStore`]'s recovery loop with the configured
/// [`RetryPolicy`](rediscache_core::types::RetryPolicy), so a first connect
/// blocks for at most `connect_timeout`.
pub(crate) fn manager_config(options: &ConnectionOptions) -> ConnectionManagerConfig {
    ConnectionManagerConfig::new()
        .set_number_of_retries(0)
        .set_response_timeout(options.operation_timeout)
        .set_connection_timeout(options.connect_timeout)
}

/// Open a connection manager and announce the client name to the server.
pub(crate) async fn open_manager(
    client: &Client,
    options: &ConnectionOptions,
) -> redis::RedisResult<ConnectionManager> {
    let mut conn = ConnectionManager::new_with_config(client.clone(), manager_config(options)).await?;
    announce_name(&mut conn, options).await;
    Ok(conn)
}

/// Send `CLIENT SETNAME` for this connection.
///
/// The name is bound to the server-side socket, so it is lost whenever the
/// manager reconnects; the store re-announces it after every recovery.
pub(crate) async fn announce_name(conn: &mut ConnectionManager, options: &ConnectionOptions) {
    let named: redis::RedisResult<()> = set_name_cmd(options).query_async(conn).await;
    if let Err(e) = named {
        warn!(client = %options.client_name, error = %e, "Failed to set Redis client name");
    }
}

fn set_name_cmd(options: &ConnectionOptions) -> redis::Cmd {
    let mut cmd = redis::cmd("CLIENT");
    cmd.arg("SETNAME").arg(options.client_name.as_str());
    cmd
}
