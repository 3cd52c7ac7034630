//! Redis-backed key-value store.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use tokio::sync::RwLock;
use tracing::{debug, info};

use rediscache_core::error::{AppError, ErrorKind};
use rediscache_core::events::{EventHandlers, StoreEvent, StoreEventHandler};
use rediscache_core::result::AppResult;
use rediscache_core::traits::KeyValueStore;
use rediscache_core::types::ConnectionOptions;

use super::connector::{announce_name, open_manager};

/// Commands refused by [`RedisStore::command`] unless admin is allowed.
const ADMIN_COMMANDS: &[&str] = &[
    "BGREWRITEAOF",
    "BGSAVE",
    "CLIENT",
    "CLUSTER",
    "CONFIG",
    "DEBUG",
    "FAILOVER",
    "FLUSHALL",
    "FLUSHDB",
    "MIGRATE",
    "MONITOR",
    "REPLICAOF",
    "SAVE",
    "SHUTDOWN",
    "SLAVEOF",
    "SWAPDB",
];

/// A named Redis connection that tracks its own liveness.
///
/// The liveness flag follows command outcomes: a transport failure marks
/// the store disconnected and starts a background recovery task, which marks it
/// connected again once the server answers. Both transitions are published
/// as [`StoreEvent`]s.
pub struct RedisStore {
    client: Client,
    options: ConnectionOptions,
    conn: RwLock<Option<ConnectionManager>>,
    connected: AtomicBool,
    closed: AtomicBool,
    recovering: AtomicBool,
    events: EventHandlers,
    this: Weak<RedisStore>,
}

impl RedisStore {
    /// Wrap an established connection.
    pub(crate) fn connected(client: Client, options: ConnectionOptions, conn: ConnectionManager) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            client,
            options,
            conn: RwLock::new(Some(conn)),
            connected: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            recovering: AtomicBool::new(false),
            events: EventHandlers::new(),
            this: this.clone(),
        })
    }

    /// Create a disconnected handle that keeps trying to connect in the
    /// background with the configured backoff.
    pub(crate) fn pending(client: Client, options: ConnectionOptions) -> Arc<Self> {
        let store = Arc::new_cyclic(|this| Self {
            client,
            options,
            conn: RwLock::new(None),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            recovering: AtomicBool::new(false),
            events: EventHandlers::new(),
            this: this.clone(),
        });
        store.start_recovery();
        store
    }

    /// Run a raw command against the connection.
    ///
    /// Administrative commands are rejected unless the connection was
    /// configured with admin commands allowed.
    pub async fn command(&self, name: &str, args: &[&str]) -> AppResult<redis::Value> {
        let upper = name.to_ascii_uppercase();
        if !self.options.allow_admin && ADMIN_COMMANDS.contains(&upper.as_str()) {
            return Err(AppError::validation(format!(
                "Command '{upper}' is an administrative command and admin mode is disabled"
            )));
        }

        let mut cmd = redis::cmd(&upper);
        for arg in args {
            cmd.arg(*arg);
        }
        self.run(|mut conn| async move { cmd.query_async(&mut conn).await })
            .await
    }

    /// A clone of the underlying connection manager, if connected.
    pub async fn connection(&self) -> Option<ConnectionManager> {
        self.conn.read().await.clone()
    }

    async fn current(&self) -> AppResult<ConnectionManager> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AppError::unavailable(format!(
                "Redis connection '{}' has been closed",
                self.options.client_name
            )));
        }
        self.conn.read().await.clone().ok_or_else(|| {
            AppError::unavailable(format!(
                "Redis connection '{}' to {} is not established",
                self.options.client_name, self.options.endpoint
            ))
        })
    }

    async fn run<T, F, Fut>(&self, op: F) -> AppResult<T>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let conn = self.current().await?;
        match op(conn).await {
            Ok(value) => {
                self.mark_connected();
                Ok(value)
            }
            Err(e) => Err(self.observe_error(e)),
        }
    }

    /// Install a freshly opened connection unless the store was closed.
    async fn establish(&self) -> redis::RedisResult<()> {
        let conn = open_manager(&self.client, &self.options).await?;
        let mut slot = self.conn.write().await;
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        *slot = Some(conn);
        drop(slot);
        info!(client = %self.options.client_name, "Redis connection established");
        Ok(())
    }

    /// One recovery attempt: open the connection if there is none yet,
    /// otherwise PING through the existing manager so it reconnects, then
    /// restore the client name on the new socket.
    async fn try_recover(&self) -> redis::RedisResult<()> {
        let existing = self.conn.read().await.clone();
        match existing {
            Some(mut conn) => {
                let _: String = redis::cmd("PING").query_async(&mut conn).await?;
                announce_name(&mut conn, &self.options).await;
                Ok(())
            }
            None => self.establish().await,
        }
    }

    /// Spawn the recovery task unless one is already running.
    fn start_recovery(&self) {
        if self.recovering.swap(true, Ordering::SeqCst) {
            return;
        }
        spawn_recovery(self.this.clone());
    }

    fn mark_connected(&self) {
        if !self.connected.swap(true, Ordering::SeqCst) {
            self.events.emit(&StoreEvent::ConnectionRestored {
                endpoint: self.options.endpoint.clone(),
            });
        }
    }

    fn mark_disconnected(&self, failure: &str) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.events.emit(&StoreEvent::ConnectionFailed {
                endpoint: self.options.endpoint.clone(),
                failure: failure.to_string(),
            });
            if !self.closed.load(Ordering::SeqCst) {
                self.start_recovery();
            }
        }
    }

    /// Classify a command error, publish the matching event and map it to
    /// an [`AppError`].
    fn observe_error(&self, e: RedisError) -> AppError {
        if e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_io_error() {
            let failure = if e.is_timeout() {
                "Timeout"
            } else if e.is_connection_refusal() {
                "UnableToConnect"
            } else {
                "SocketFailure"
            };
            self.mark_disconnected(failure);
            return AppError::with_source(
                ErrorKind::Unavailable,
                format!("Redis unavailable: {e}"),
                e,
            );
        }

        match e.kind() {
            redis::ErrorKind::Moved => {
                let (slot, new_endpoint) = parse_redirect(e.detail());
                self.events.emit(&StoreEvent::HashSlotMoved {
                    slot,
                    old_endpoint: self.options.endpoint.clone(),
                    new_endpoint,
                });
            }
            redis::ErrorKind::BusyLoadingError
            | redis::ErrorKind::MasterDown
            | redis::ErrorKind::TryAgain => {
                self.events.emit(&StoreEvent::Maintenance {
                    notification: e.code().unwrap_or("UNKNOWN").to_string(),
                });
            }
            _ => {
                self.events.emit(&StoreEvent::ErrorMessage {
                    endpoint: self.options.endpoint.clone(),
                    message: e.to_string(),
                });
            }
        }

        AppError::with_source(ErrorKind::Cache, format!("Redis error: {e}"), e)
    }
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("options", &self.options)
            .field("connected", &self.connected)
            .field("closed", &self.closed)
            .field("recovering", &self.recovering)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

/// Parse the `"<slot> <host:port>"` detail of a MOVED reply.
fn parse_redirect(detail: Option<&str>) -> (Option<u16>, String) {
    let mut parts = detail.unwrap_or_default().split_whitespace();
    let slot = parts.next().and_then(|s| s.parse().ok());
    let endpoint = parts.next().unwrap_or("unknown").to_string();
    (slot, endpoint)
}

/// Probe the store with the configured backoff until it answers again, the
/// store is closed, or every handle to it is dropped.
fn spawn_recovery(store: Weak<RedisStore>) {
    tokio::spawn(async move {
        let mut attempt: u32 = 0;
        loop {
            let delay = match store.upgrade() {
                Some(s) => s.options.retry.delay_for(attempt),
                None => return,
            };
            tokio::time::sleep(delay).await;

            let Some(s) = store.upgrade() else { return };
            if s.closed.load(Ordering::SeqCst) {
                s.recovering.store(false, Ordering::SeqCst);
                return;
            }
            match s.try_recover().await {
                Ok(()) => {
                    s.recovering.store(false, Ordering::SeqCst);
                    if !s.closed.load(Ordering::SeqCst) {
                        s.mark_connected();
                    }
                    return;
                }
                Err(e) => {
                    debug!(
                        client = %s.options.client_name,
                        attempt,
                        error = %e,
                        "Redis recovery attempt failed"
                    );
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    });
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn client_name(&self) -> &str {
        self.options.client_name.as_str()
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.connected.load(Ordering::SeqCst)
    }

    fn status(&self) -> String {
        let state = if self.closed.load(Ordering::SeqCst) {
            "closed"
        } else if self.connected.load(Ordering::SeqCst) {
            "connected"
        } else {
            "disconnected"
        };
        format!(
            "{} {state} (tls: {}, protocol: {})",
            self.options.endpoint, self.options.use_tls, self.options.protocol
        )
    }

    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        self.run(|mut conn| async move { conn.get(key).await })
            .await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> AppResult<()> {
        let millis = (ttl.as_millis() as u64).max(1);
        self.run(|mut conn| async move { conn.pset_ex(key, value, millis).await })
            .await
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        let deleted: i64 = self
            .run(|mut conn| async move { conn.del(key).await })
            .await?;
        Ok(deleted > 0)
    }

    async fn publish(&self, channel: &str, payload: &[u8]) -> AppResult<u64> {
        let receivers: i64 = self
            .run(|mut conn| async move { conn.publish(channel, payload).await })
            .await?;
        Ok(receivers.max(0) as u64)
    }

    async fn subscribe(&self, channel: &str) -> AppResult<BoxStream<'static, Vec<u8>>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AppError::unavailable("Redis connection has been closed"));
        }
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| self.observe_error(e))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| self.observe_error(e))?;

        Ok(pubsub
            .into_on_message()
            .map(|msg| msg.get_payload_bytes().to_vec())
            .boxed())
    }

    fn on_event(&self, handler: StoreEventHandler) {
        self.events.register(handler);
    }

    async fn close(&self) -> AppResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        // Dropping the last manager clone closes the socket.
        self.conn.write().await.take();
        info!(client = %self.options.client_name, "Redis connection closed");
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use rediscache_core::config::cache::CacheConfiguration;
    use rediscache_core::types::ClientName;

    use crate::redis::connector::connection_info;

    fn pending_store(allow_admin: bool) -> Arc<RedisStore> {
        let mut config = CacheConfiguration::new("127.0.0.1:1", "");
        config.connection.use_tls = false;
        config.connection.allow_admin = allow_admin;
        config.connection.connect_timeout_ms = 100;
        let options = ConnectionOptions::from_config(&config, ClientName::new("Orders").unwrap()).unwrap();
        let client = Client::open(connection_info(&options).unwrap()).unwrap();
        RedisStore::pending(client, options)
    }

    fn record_events(store: &RedisStore) -> Arc<Mutex<Vec<&'static str>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.on_event(Arc::new(move |event: &StoreEvent| {
            sink.lock().unwrap().push(event.name());
        }));
        seen
    }

    #[test]
    fn test_parse_redirect() {
        assert_eq!(
            parse_redirect(Some("3999 10.0.0.2:6381")),
            (Some(3999), "10.0.0.2:6381".to_string())
        );
        assert_eq!(parse_redirect(None), (None, "unknown".to_string()));
    }

    #[tokio::test]
    async fn test_admin_commands_rejected_without_admin() {
        let store = pending_store(false);

        for name in ["flushall", "CONFIG", "Shutdown"] {
            let err = store.command(name, &[]).await.unwrap_err();
            assert_eq!(err.kind, ErrorKind::Validation, "{name}");
        }
        // Ordinary commands pass the gate and fail only on the missing link.
        let err = store.command("GET", &["key"]).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unavailable);

        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_admin_commands_pass_gate_with_admin() {
        let store = pending_store(true);
        let err = store.command("FLUSHALL", &[]).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unavailable);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_transport_error_marks_disconnected() {
        let store = pending_store(false);
        let seen = record_events(&store);
        store.connected.store(true, Ordering::SeqCst);

        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = store.observe_error(RedisError::from(refused));

        assert_eq!(err.kind, ErrorKind::Unavailable);
        assert!(!store.is_connected());
        assert_eq!(*seen.lock().unwrap(), vec!["ConnectionFailed"]);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_server_errors_map_to_events() {
        let store = pending_store(false);
        let seen = record_events(&store);

        let moved = RedisError::from((
            redis::ErrorKind::Moved,
            "An error was signalled by the server",
            "3999 10.0.0.2:6381".to_string(),
        ));
        assert_eq!(store.observe_error(moved).kind, ErrorKind::Cache);

        let loading = RedisError::from((redis::ErrorKind::BusyLoadingError, "Loading"));
        assert_eq!(store.observe_error(loading).kind, ErrorKind::Cache);

        let wrong_type = RedisError::from((redis::ErrorKind::TypeError, "Wrong type"));
        assert_eq!(store.observe_error(wrong_type).kind, ErrorKind::Cache);

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["HashSlotMoved", "Maintenance", "ErrorMessage"]
        );
        store.close().await.unwrap();
    }
}
