//! Key-value store traits for pluggable store backends.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::events::StoreEventHandler;
use crate::result::AppResult;
use crate::types::ConnectionOptions;

/// A connected handle to a remote key-value store.
///
/// Handles are shared by every operation of one cache client and must be
/// safe for concurrent use. Values are opaque bytes; encoding is the
/// caller's concern.
#[async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug + 'static {
    /// Identity this handle reports to the server.
    fn client_name(&self) -> &str;

    /// Whether the transport currently reports itself connected.
    ///
    /// The flag changes asynchronously underneath the caller.
    fn is_connected(&self) -> bool;

    /// Human-readable connection status for logs.
    fn status(&self) -> String;

    /// Get a value by key. Returns `None` if the key does not exist or has expired.
    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>>;

    /// Set a value with an expiry.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> AppResult<()>;

    /// Delete a key. Returns `true` if the key existed.
    async fn delete(&self, key: &str) -> AppResult<bool>;

    /// Publish a message on a channel. Returns the number of receivers.
    async fn publish(&self, channel: &str, payload: &[u8]) -> AppResult<u64>;

    /// Subscribe to a channel and stream its message payloads.
    async fn subscribe(&self, channel: &str) -> AppResult<BoxStream<'static, Vec<u8>>>;

    /// Register an observer for connection lifecycle events.
    fn on_event(&self, handler: StoreEventHandler);

    /// Flush and close the connection. The handle is unusable afterwards.
    async fn close(&self) -> AppResult<()>;

    /// Access the concrete store, e.g. for backend-specific commands.
    fn as_any(&self) -> &dyn Any;
}

/// Opens store connections from [`ConnectionOptions`].
///
/// Registrations call this at most once each; implementations do not need
/// to deduplicate calls themselves.
#[async_trait]
pub trait StoreConnector: Send + Sync + std::fmt::Debug + 'static {
    /// Open a connection for the named client described by `options`.
    async fn connect(&self, options: &ConnectionOptions) -> AppResult<Arc<dyn KeyValueStore>>;
}
