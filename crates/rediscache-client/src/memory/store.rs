//! In-memory store implementation using the moka crate.
//!
//! A [`MemoryServer`] plays the role of the remote store: every
//! [`MemoryStore`] opened by the same [`MemoryConnector`] is a separate
//! connection to one shared keyspace, with its own liveness flag.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use futures::stream::BoxStream;
use moka::Expiry;
use moka::future::Cache;
use tokio::sync::broadcast;
use tracing::debug;

use rediscache_core::error::AppError;
use rediscache_core::events::{EventHandlers, StoreEvent, StoreEventHandler};
use rediscache_core::result::AppResult;
use rediscache_core::traits::{KeyValueStore, StoreConnector};
use rediscache_core::types::ConnectionOptions;

/// Buffered messages per pub/sub channel before slow subscribers lag.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    ttl: Duration,
}

/// Expires each entry after the TTL it was written with.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Shared keyspace and pub/sub channels behind in-memory connections.
#[derive(Debug)]
pub struct MemoryServer {
    cache: Cache<String, Entry>,
    channels: DashMap<String, broadcast::Sender<Vec<u8>>>,
}

impl MemoryServer {
    /// Create an empty server holding at most `max_capacity` entries.
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        Self {
            cache,
            channels: DashMap::new(),
        }
    }
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new(10_000)
    }
}

/// One in-memory connection with a switchable liveness flag.
#[derive(Debug)]
pub struct MemoryStore {
    server: Arc<MemoryServer>,
    client_name: String,
    endpoint: String,
    connected: AtomicBool,
    closed: AtomicBool,
    events: EventHandlers,
}

impl MemoryStore {
    /// Open a connection to `server`.
    pub fn new(server: Arc<MemoryServer>, client_name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            server,
            client_name: client_name.into(),
            endpoint: endpoint.into(),
            connected: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            events: EventHandlers::new(),
        }
    }

    /// Simulate the transport going down or coming back.
    ///
    /// Emits `ConnectionFailed`/`ConnectionRestored` on a state change. A
    /// closed store stays disconnected.
    pub fn set_connected(&self, connected: bool) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let previous = self.connected.swap(connected, Ordering::SeqCst);
        match (previous, connected) {
            (true, false) => self.events.emit(&StoreEvent::ConnectionFailed {
                endpoint: self.endpoint.clone(),
                failure: "SocketClosed".to_string(),
            }),
            (false, true) => self.events.emit(&StoreEvent::ConnectionRestored {
                endpoint: self.endpoint.clone(),
            }),
            _ => {}
        }
    }

    /// Number of lifecycle observers attached to this connection.
    pub fn event_handler_count(&self) -> usize {
        self.events.len()
    }

    /// Whether [`KeyValueStore::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> AppResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AppError::unavailable(format!(
                "Connection '{}' has been closed",
                self.client_name
            )));
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(AppError::unavailable(format!(
                "Connection '{}' to {} is down",
                self.client_name, self.endpoint
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn client_name(&self) -> &str {
        &self.client_name
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.connected.load(Ordering::SeqCst)
    }

    fn status(&self) -> String {
        if self.closed.load(Ordering::SeqCst) {
            format!("memory://{} closed", self.endpoint)
        } else if self.connected.load(Ordering::SeqCst) {
            format!("memory://{} connected", self.endpoint)
        } else {
            format!("memory://{} disconnected", self.endpoint)
        }
    }

    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        self.ensure_connected()?;
        Ok(self.server.cache.get(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> AppResult<()> {
        self.ensure_connected()?;
        let entry = Entry {
            value: value.to_vec(),
            ttl,
        };
        self.server.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        self.ensure_connected()?;
        Ok(self.server.cache.remove(key).await.is_some())
    }

    async fn publish(&self, channel: &str, payload: &[u8]) -> AppResult<u64> {
        self.ensure_connected()?;
        let receivers = self
            .server
            .channels
            .get(channel)
            .map(|tx| tx.send(payload.to_vec()).unwrap_or(0))
            .unwrap_or(0);
        debug!(channel, receivers, "Published message");
        Ok(receivers as u64)
    }

    async fn subscribe(&self, channel: &str) -> AppResult<BoxStream<'static, Vec<u8>>> {
        self.ensure_connected()?;
        let rx = self
            .server
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(message) => return Some((message, rx)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(stream.boxed())
    }

    fn on_event(&self, handler: StoreEventHandler) {
        self.events.register(handler);
    }

    async fn close(&self) -> AppResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Connector that opens [`MemoryStore`] connections to one shared server.
///
/// Connections are kept by client name so callers can reach the concrete
/// store, e.g. to simulate an outage.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    server: Arc<MemoryServer>,
    stores: DashMap<String, Arc<MemoryStore>>,
    connects: AtomicUsize,
}

impl MemoryConnector {
    /// Create a connector with a fresh, empty server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a connector backed by an existing server.
    pub fn with_server(server: Arc<MemoryServer>) -> Self {
        Self {
            server,
            stores: DashMap::new(),
            connects: AtomicUsize::new(0),
        }
    }

    /// The most recent connection opened for `client_name`.
    pub fn store(&self, client_name: &str) -> Option<Arc<MemoryStore>> {
        self.stores.get(client_name).map(|s| Arc::clone(s.value()))
    }

    /// Total number of `connect` calls served.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    async fn connect(&self, options: &ConnectionOptions) -> AppResult<Arc<dyn KeyValueStore>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let store = Arc::new(MemoryStore::new(
            Arc::clone(&self.server),
            options.client_name.as_str(),
            options.endpoint.clone(),
        ));
        self.stores
            .insert(options.client_name.to_string(), Arc::clone(&store));
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn make_store() -> MemoryStore {
        MemoryStore::new(Arc::new(MemoryServer::default()), "Orders", "cache.example:6380")
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = make_store();
        store
            .set("key1", b"value1", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("key1").await.unwrap(), Some(b"value1".to_vec()));

        assert!(store.delete("key1").await.unwrap());
        assert!(!store.delete("key1").await.unwrap());
        assert_eq!(store.get("key1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entry_expires_after_its_ttl() {
        let store = make_store();
        store
            .set("short", b"v", Duration::from_millis(50))
            .await
            .unwrap();
        store
            .set("long", b"v", Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(store.get("short").await.unwrap(), None);
        assert_eq!(store.get("long").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_disconnected_store_errors_and_emits_events() {
        let store = make_store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.on_event(Arc::new(move |event: &StoreEvent| {
            sink.lock().unwrap().push(event.name());
        }));

        store.set_connected(false);
        assert!(!store.is_connected());
        let err = store.get("key").await.unwrap_err();
        assert!(err.is_transient());

        store.set_connected(false);
        store.set_connected(true);
        assert!(store.is_connected());
        assert_eq!(*seen.lock().unwrap(), vec!["ConnectionFailed", "ConnectionRestored"]);
    }

    #[tokio::test]
    async fn test_close_is_terminal() {
        let store = make_store();
        store.close().await.unwrap();
        store.set_connected(true);
        assert!(!store.is_connected());
        assert!(store.is_closed());
        assert!(store.status().ends_with("closed"));
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let store = make_store();
        let mut messages = store.subscribe("orders").await.unwrap();
        let receivers = store.publish("orders", b"created").await.unwrap();
        assert_eq!(receivers, 1);
        assert_eq!(messages.next().await, Some(b"created".to_vec()));
    }

    #[tokio::test]
    async fn test_connections_share_the_server() {
        let connector = MemoryConnector::new();
        let config = rediscache_core::config::cache::CacheConfiguration::new("cache.example:6380", "s3cr3t");
        let orders = ConnectionOptions::from_config(
            &config,
            rediscache_core::types::ClientName::new("Orders").unwrap(),
        )
        .unwrap();
        let billing = ConnectionOptions::from_config(
            &config,
            rediscache_core::types::ClientName::new("Billing").unwrap(),
        )
        .unwrap();

        let a = connector.connect(&orders).await.unwrap();
        let b = connector.connect(&billing).await.unwrap();
        a.set("shared", b"1", Duration::from_secs(60)).await.unwrap();

        assert_eq!(b.get("shared").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(connector.connect_count(), 2);
        assert!(connector.store("Orders").is_some());
        assert_eq!(b.client_name(), "Billing");
    }
}
