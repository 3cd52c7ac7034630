//! Name-based lookup and realization of cache clients.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use rediscache_core::config::cache::CacheConfiguration;
use rediscache_core::error::AppError;
use rediscache_core::result::AppResult;
use rediscache_core::traits::StoreConnector;
use rediscache_core::types::ClientName;

use crate::client::CacheClient;
use crate::registration::ClientRegistration;

/// Resolves named registrations into connected [`CacheClient`]s.
#[derive(Debug)]
pub struct CacheClientFactory {
    config: CacheConfiguration,
    connector: Arc<dyn StoreConnector>,
    registrations: HashMap<String, Arc<ClientRegistration>>,
}

impl CacheClientFactory {
    /// Create a factory over `registrations`.
    ///
    /// Registrations are deduplicated by identity and then indexed by name;
    /// when two distinct registrations share a name the later one wins.
    pub fn new(
        config: CacheConfiguration,
        registrations: impl IntoIterator<Item = Arc<ClientRegistration>>,
        connector: Arc<dyn StoreConnector>,
    ) -> Self {
        let mut distinct: Vec<Arc<ClientRegistration>> = Vec::new();
        for registration in registrations {
            if !distinct.iter().any(|known| Arc::ptr_eq(known, &registration)) {
                distinct.push(registration);
            }
        }

        let mut by_name = HashMap::with_capacity(distinct.len());
        for registration in distinct {
            by_name.insert(registration.name().to_string(), registration);
        }

        let factory = Self {
            config,
            connector,
            registrations: by_name,
        };
        factory.advise_worker_threads();
        factory
    }

    /// Worker threads the runtime should have so every named client can
    /// block on the store concurrently without starving the others.
    pub fn recommended_worker_threads(&self) -> usize {
        self.registrations.len() + 2
    }

    /// Names of all registered clients, sorted.
    pub fn client_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.registrations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Return the client registered as `name`, or the default client when
    /// `name` is `None`. Connects on first use.
    pub async fn create_client(&self, name: Option<&str>) -> AppResult<Arc<CacheClient>> {
        let name = name.unwrap_or(ClientName::DEFAULT);
        let registration = self.registrations.get(name).ok_or_else(|| {
            AppError::not_found(format!(
                "Unable to find client registration with name '{name}'."
            ))
        })?;

        registration
            .get_client(&self.config, Arc::clone(&self.connector))
            .await
    }

    /// Close every client that has been connected so far.
    pub async fn shutdown(&self) {
        for (name, registration) in &self.registrations {
            if let Err(e) = registration.close().await {
                warn!(client = %name, error = %e, "Failed to close cache client");
            }
        }
    }

    fn advise_worker_threads(&self) {
        let expected = self.recommended_worker_threads();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let workers = handle.metrics().num_workers();
                if workers < expected {
                    info!(
                        workers,
                        expected,
                        "Runtime has fewer worker threads than cache clients need; raise worker_threads to at least {expected}"
                    );
                } else {
                    debug!(workers, expected, "Runtime worker threads are sufficient for cache clients");
                }
            }
            Err(_) => {
                debug!(expected, "No Tokio runtime active; size the runtime with at least {expected} worker threads");
            }
        }
    }
}
