//! Named client registrations with lazy, memoized connection.
//!
//! A registration makes at most one connection attempt for the life of the
//! process. The outcome, a client or the failure, is memoized and handed to
//! every caller afterwards. A failed registration stays failed: there is no
//! retry at this layer.
//!
//! The attempt runs on its own task and records its outcome itself, so a
//! caller that is cancelled while waiting (e.g. by a timeout) neither loses
//! the attempt nor lets the next caller start a second one.

use std::sync::{Arc, Mutex, OnceLock};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::{error, info};

use rediscache_core::config::cache::CacheConfiguration;
use rediscache_core::error::AppError;
use rediscache_core::result::AppResult;
use rediscache_core::traits::StoreConnector;
use rediscache_core::types::{ClientName, ConnectionOptions};

use crate::client::CacheClient;

/// Observable state of a [`ClientRegistration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// No connection attempt has completed yet.
    Unresolved,
    /// The connection attempt produced a client.
    Resolved,
    /// The connection attempt failed; the failure is replayed forever.
    Failed,
}

#[derive(Debug)]
enum Resolution {
    Resolved(Arc<CacheClient>),
    Failed(AppError),
}

impl Resolution {
    fn replay(&self) -> AppResult<Arc<CacheClient>> {
        match self {
            Self::Resolved(client) => Ok(Arc::clone(client)),
            Self::Failed(err) => Err(err.clone()),
        }
    }
}

type Attempt = Shared<BoxFuture<'static, ()>>;

/// A named, lazily connected cache client.
pub struct ClientRegistration {
    name: ClientName,
    resolution: Arc<OnceLock<Resolution>>,
    attempt: Mutex<Option<Attempt>>,
}

impl ClientRegistration {
    /// Create an unresolved registration for `name`.
    pub fn new(name: ClientName) -> Self {
        Self {
            name,
            resolution: Arc::new(OnceLock::new()),
            attempt: Mutex::new(None),
        }
    }

    /// The registered client name.
    pub fn name(&self) -> &ClientName {
        &self.name
    }

    /// Current state, without triggering a connection.
    pub fn state(&self) -> RegistrationState {
        match self.resolution.get() {
            None => RegistrationState::Unresolved,
            Some(Resolution::Resolved(_)) => RegistrationState::Resolved,
            Some(Resolution::Failed(_)) => RegistrationState::Failed,
        }
    }

    /// Return the client, connecting on first use.
    ///
    /// Concurrent first callers wait for a single connection attempt. If that
    /// attempt fails, its error is returned to this and every later caller.
    pub async fn get_client(
        &self,
        config: &CacheConfiguration,
        connector: Arc<dyn StoreConnector>,
    ) -> AppResult<Arc<CacheClient>> {
        if let Some(resolution) = self.resolution.get() {
            return resolution.replay();
        }

        let attempt = {
            let mut slot = match self.attempt.lock() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(resolution) = self.resolution.get() {
                return resolution.replay();
            }
            slot.get_or_insert_with(|| self.spawn_attempt(config.clone(), connector))
                .clone()
        };

        attempt.await;

        let resolution = self.resolution.get_or_init(|| {
            Resolution::Failed(AppError::internal(format!(
                "Connection task for cache client '{}' ended without a result",
                self.name
            )))
        });
        resolution.replay()
    }

    /// Close the memoized client, if one was created.
    pub async fn close(&self) -> AppResult<()> {
        match self.resolution.get() {
            Some(Resolution::Resolved(client)) => client.close().await,
            _ => Ok(()),
        }
    }

    fn spawn_attempt(&self, config: CacheConfiguration, connector: Arc<dyn StoreConnector>) -> Attempt {
        let name = self.name.clone();
        let cell = Arc::clone(&self.resolution);

        let task = tokio::spawn(async move {
            let resolution = match connect(&name, &config, connector.as_ref()).await {
                Ok(client) => Resolution::Resolved(Arc::new(client)),
                Err(err) => {
                    error!(
                        client = %name,
                        error = %err,
                        "Cache client connection failed; the failure is permanent for this registration"
                    );
                    Resolution::Failed(err)
                }
            };
            // This task is the only writer while it runs.
            let _ = cell.set(resolution);
        });

        task.map(|_| ()).boxed().shared()
    }
}

impl std::fmt::Debug for ClientRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistration")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

async fn connect(
    name: &ClientName,
    config: &CacheConfiguration,
    connector: &dyn StoreConnector,
) -> AppResult<CacheClient> {
    let options = ConnectionOptions::from_config(config, name.clone())?;
    info!(client = %name, endpoint = %options.endpoint, "Creating cache client");
    let store = connector.connect(&options).await?;
    Ok(CacheClient::new(store))
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use rediscache_core::error::ErrorKind;
    use rediscache_core::traits::KeyValueStore;

    use crate::memory::MemoryConnector;

    /// Counts connect attempts; each takes `delay` and may fail or panic.
    #[derive(Debug)]
    struct CountingConnector {
        inner: MemoryConnector,
        attempts: AtomicUsize,
        delay: Duration,
        fail: bool,
        panic: bool,
    }

    impl Default for CountingConnector {
        fn default() -> Self {
            Self {
                inner: MemoryConnector::new(),
                attempts: AtomicUsize::new(0),
                delay: Duration::from_millis(20),
                fail: false,
                panic: false,
            }
        }
    }

    #[async_trait]
    impl StoreConnector for CountingConnector {
        async fn connect(&self, options: &ConnectionOptions) -> AppResult<Arc<dyn KeyValueStore>> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if self.panic {
                panic!("connector crashed");
            }
            if self.fail {
                return Err(AppError::connection(format!("refused (attempt {attempt})")));
            }
            self.inner.connect(options).await
        }
    }

    fn config() -> CacheConfiguration {
        CacheConfiguration::new("cache.example:6380", "s3cr3t")
    }

    fn registration() -> Arc<ClientRegistration> {
        Arc::new(ClientRegistration::new(ClientName::new("Orders").unwrap()))
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_connect_once() {
        let registration = registration();
        let connector = Arc::new(CountingConnector::default());
        let config = Arc::new(config());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registration = Arc::clone(&registration);
            let connector = Arc::clone(&connector);
            let config = Arc::clone(&config);
            handles.push(tokio::spawn(async move {
                registration.get_client(&config, connector).await.unwrap()
            }));
        }

        let mut clients = Vec::new();
        for handle in handles {
            clients.push(handle.await.unwrap());
        }

        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
        assert!(clients.iter().all(|c| Arc::ptr_eq(c, &clients[0])));
        assert_eq!(registration.state(), RegistrationState::Resolved);
    }

    #[tokio::test]
    async fn test_failure_is_memoized_and_replayed() {
        let registration = registration();
        let connector = Arc::new(CountingConnector {
            fail: true,
            ..Default::default()
        });

        let first = registration.get_client(&config(), connector.clone()).await.unwrap_err();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let later = registration.get_client(&config(), connector.clone()).await.unwrap_err();

        assert_eq!(first.kind, ErrorKind::Connection);
        assert_eq!(later.message, first.message);
        assert_eq!(later.message, "refused (attempt 1)");
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(registration.state(), RegistrationState::Failed);
    }

    #[tokio::test]
    async fn test_cancelled_first_call_does_not_reconnect() {
        let registration = registration();
        let connector = Arc::new(CountingConnector {
            delay: Duration::from_millis(100),
            ..Default::default()
        });

        let timed_out = tokio::time::timeout(
            Duration::from_millis(10),
            registration.get_client(&config(), connector.clone()),
        )
        .await;
        assert!(timed_out.is_err());

        let client = registration.get_client(&config(), connector.clone()).await.unwrap();
        assert_eq!(client.name(), "Orders");
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_completes_without_waiters() {
        let registration = registration();
        let connector = Arc::new(CountingConnector {
            delay: Duration::from_millis(50),
            ..Default::default()
        });

        let _ = tokio::time::timeout(
            Duration::from_millis(5),
            registration.get_client(&config(), connector.clone()),
        )
        .await;
        assert_eq!(registration.state(), RegistrationState::Unresolved);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(registration.state(), RegistrationState::Resolved);
    }

    #[tokio::test]
    async fn test_crashed_attempt_poisons_registration() {
        let registration = registration();
        let connector = Arc::new(CountingConnector {
            panic: true,
            ..Default::default()
        });

        let err = registration.get_client(&config(), connector.clone()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
        let again = registration.get_client(&config(), connector.clone()).await.unwrap_err();
        assert_eq!(again.message, err.message);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(registration.state(), RegistrationState::Failed);
    }

    #[tokio::test]
    async fn test_invalid_configuration_poisons_registration() {
        let registration = registration();
        let connector = Arc::new(CountingConnector::default());
        let bad = CacheConfiguration::new("no-port", "s3cr3t");

        let err = registration.get_client(&bad, connector.clone()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
        let again = registration.get_client(&config(), connector.clone()).await.unwrap_err();
        assert_eq!(again.kind, ErrorKind::Configuration);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_client_reports_registration_name() {
        let registration = registration();
        let connector = Arc::new(MemoryConnector::new());
        assert_eq!(registration.state(), RegistrationState::Unresolved);

        let client = registration.get_client(&config(), connector).await.unwrap();
        assert_eq!(client.name(), "Orders");

        registration.close().await.unwrap();
        assert!(!client.is_connected());
    }
}
