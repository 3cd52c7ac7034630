//! Cache client: typed reads and writes against one store connection.
//!
//! Writes, reads and invalidations are best-effort. When the store reports
//! itself disconnected they degrade to no-ops (or to a miss), so a cache
//! outage turns into "always recompute" instead of failed requests.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use rediscache_core::error::AppError;
use rediscache_core::events::StoreEvent;
use rediscache_core::result::AppResult;
use rediscache_core::traits::KeyValueStore;

/// TTL applied when callers have no better value.
pub const DEFAULT_TTL_MINUTES: u16 = 15;

/// Result of the read step of [`CacheClient::get_or_initialize`].
#[derive(Debug)]
pub enum ReadOutcome<T> {
    /// A usable value was found.
    Hit(T),
    /// The key is absent, holds no value, or the store is disconnected.
    Miss,
    /// The read failed (store error or undecodable value).
    TransientError(AppError),
}

impl<T> ReadOutcome<T> {
    /// Collapse into an optional value, dropping the error detail.
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Hit(value) => Some(value),
            Self::Miss | Self::TransientError(_) => None,
        }
    }
}

/// A cache client bound to one named store connection.
#[derive(Debug)]
pub struct CacheClient {
    store: Arc<dyn KeyValueStore>,
}

impl CacheClient {
    /// Wrap a store connection and start logging its lifecycle events.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let name = store.client_name().to_string();
        store.on_event(Arc::new(move |event: &StoreEvent| log_store_event(&name, event)));

        info!(
            client = store.client_name(),
            status = %store.status(),
            "Cache client created"
        );
        Self { store }
    }

    /// Name this client reports to the store.
    pub fn name(&self) -> &str {
        self.store.client_name()
    }

    /// Whether the underlying connection currently reports itself connected.
    pub fn is_connected(&self) -> bool {
        self.store.is_connected()
    }

    /// Serialize `value` as JSON and store it under `key`.
    pub async fn set_as<T>(&self, key: &str, value: &T, ttl_minutes: u16) -> AppResult<()>
    where
        T: Serialize + ?Sized,
    {
        let json = serde_json::to_vec(value)?;
        self.set(key, &json, ttl_minutes).await
    }

    /// Store raw bytes under `key` with an expiry.
    ///
    /// Silently does nothing when the store is disconnected.
    pub async fn set(&self, key: &str, value: &[u8], ttl_minutes: u16) -> AppResult<()> {
        if !self.store.is_connected() {
            debug!(client = self.name(), key, "Store disconnected, skipping cache write");
            return Ok(());
        }
        let result = self.store.set(key, value, ttl(ttl_minutes)).await;
        self.degrade_transient(key, result, ())
    }

    /// Read and decode the JSON value stored under `key`.
    ///
    /// Returns `None` when the key is absent, holds JSON `null`, or the
    /// store is disconnected.
    pub async fn get_as<T>(&self, key: &str) -> AppResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.get(key).await? {
            Some(raw) => decode(&raw),
            None => Ok(None),
        }
    }

    /// Read the raw bytes stored under `key`.
    ///
    /// Returns `None` when the key is absent or the store is disconnected.
    pub async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        if !self.store.is_connected() {
            return Ok(None);
        }
        let result = self.store.get(key).await;
        self.degrade_transient(key, result, None)
    }

    /// Return the cached value for `key`, or compute it with `initialize`
    /// and cache it for `ttl_minutes`.
    ///
    /// Read failures never reach the caller: they are logged and treated as
    /// a miss. Concurrent misses on the same key each run the initializer.
    pub async fn get_or_initialize<T, F, Fut>(&self, key: &str, ttl_minutes: u16, initialize: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let outcome = self
            .try_get_or_initialize(key, ttl_minutes, move || async move {
                Ok::<T, Infallible>(initialize().await)
            })
            .await;
        match outcome {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Like [`CacheClient::get_or_initialize`] with a fallible initializer.
    ///
    /// An initializer error is returned as-is and nothing is cached.
    pub async fn try_get_or_initialize<T, E, F, Fut>(
        &self,
        key: &str,
        ttl_minutes: u16,
        initialize: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.read(key).await {
            ReadOutcome::Hit(value) => return Ok(value),
            ReadOutcome::Miss => {}
            ReadOutcome::TransientError(e) => {
                warn!(
                    client = self.name(),
                    key,
                    error = %e,
                    "Cache service is unavailable or the connection was lost, falling back to the initializer"
                );
            }
        }

        let value = initialize().await?;
        self.write_back(key, &value, ttl_minutes).await;
        Ok(value)
    }

    /// The read step of get-or-initialize, without any fallback.
    pub async fn read<T>(&self, key: &str) -> ReadOutcome<T>
    where
        T: DeserializeOwned,
    {
        if !self.store.is_connected() {
            return ReadOutcome::Miss;
        }
        match self.store.get(key).await {
            Ok(Some(raw)) => match decode(&raw) {
                Ok(Some(value)) => ReadOutcome::Hit(value),
                Ok(None) => ReadOutcome::Miss,
                Err(e) => ReadOutcome::TransientError(e),
            },
            Ok(None) => ReadOutcome::Miss,
            Err(e) => ReadOutcome::TransientError(e),
        }
    }

    /// Delete `key`. Does nothing when the store is disconnected.
    pub async fn invalidate(&self, key: &str) -> AppResult<()> {
        if !self.store.is_connected() {
            debug!(client = self.name(), key, "Store disconnected, skipping invalidation");
            return Ok(());
        }
        let result = self.store.delete(key).await.map(|_| ());
        self.degrade_transient(key, result, ())
    }

    /// The underlying store handle.
    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.store)
    }

    /// A publish/subscribe handle on the same connection.
    pub fn subscriber(&self) -> Subscriber {
        Subscriber {
            store: Arc::clone(&self.store),
        }
    }

    /// Close the underlying connection. The client is unusable afterwards.
    pub async fn close(&self) -> AppResult<()> {
        info!(client = self.name(), "Closing cache client");
        self.store.close().await
    }

    async fn write_back<T>(&self, key: &str, value: &T, ttl_minutes: u16)
    where
        T: Serialize,
    {
        let json = match serde_json::to_vec(value) {
            Ok(json) => json,
            Err(e) => {
                warn!(client = self.name(), key, error = %e, "Failed to serialize initialized value");
                return;
            }
        };
        if !self.store.is_connected() {
            return;
        }
        if let Err(e) = self.store.set(key, &json, ttl(ttl_minutes)).await {
            warn!(client = self.name(), key, error = %e, "Failed to cache initialized value");
        }
    }

    /// Swallow transient store failures as `fallback`, keep other errors.
    fn degrade_transient<T>(&self, key: &str, result: AppResult<T>, fallback: T) -> AppResult<T> {
        match result {
            Err(e) if e.is_transient() => {
                warn!(client = self.name(), key, error = %e, "Cache unavailable, degrading to no-op");
                Ok(fallback)
            }
            other => other,
        }
    }
}

/// Publish/subscribe pass-through to the store connection.
#[derive(Debug, Clone)]
pub struct Subscriber {
    store: Arc<dyn KeyValueStore>,
}

impl Subscriber {
    /// Publish `payload` on `channel`. Returns the number of receivers.
    pub async fn publish(&self, channel: &str, payload: &[u8]) -> AppResult<u64> {
        self.store.publish(channel, payload).await
    }

    /// Stream the payloads published on `channel`.
    pub async fn subscribe(&self, channel: &str) -> AppResult<BoxStream<'static, Vec<u8>>> {
        self.store.subscribe(channel).await
    }
}

fn ttl(minutes: u16) -> Duration {
    Duration::from_secs(u64::from(minutes) * 60)
}

/// Decode a stored JSON value. Empty values and `null` decode to `None`.
fn decode<T>(raw: &[u8]) -> AppResult<Option<T>>
where
    T: DeserializeOwned,
{
    let trimmed = raw.trim_ascii();
    if trimmed.is_empty() || trimmed == b"null" {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(trimmed)?))
}

fn log_store_event(client: &str, event: &StoreEvent) {
    match event {
        StoreEvent::ConnectionFailed { endpoint, failure } => {
            error!(client, endpoint = %endpoint, failure = %failure, "RedisCache.{client}: ConnectionFailed");
        }
        StoreEvent::ConnectionRestored { endpoint } => {
            info!(client, endpoint = %endpoint, "RedisCache.{client}: ConnectionRestored");
        }
        StoreEvent::HashSlotMoved {
            slot,
            old_endpoint,
            new_endpoint,
        } => {
            info!(
                client,
                slot = ?slot,
                old_endpoint = %old_endpoint,
                new_endpoint = %new_endpoint,
                "RedisCache.{client}: HashSlotMoved"
            );
        }
        StoreEvent::ErrorMessage { endpoint, message } => {
            error!(client, endpoint = %endpoint, message = %message, "RedisCache.{client}: ErrorMessage");
        }
        StoreEvent::Maintenance { notification } => {
            info!(client, notification = %notification, "RedisCache.{client}: Maintenance");
        }
    }
}
