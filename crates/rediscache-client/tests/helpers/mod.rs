//! Shared test helpers for integration tests.

use std::sync::Arc;

use rediscache_client::memory::{MemoryConnector, MemoryStore};
use rediscache_client::{CacheClientFactory, CacheRegistry};
use rediscache_core::config::cache::CacheConfiguration;

/// Factory wired to an in-memory store server
pub struct TestCache {
    /// Factory under test
    pub factory: CacheClientFactory,
    /// Connector shared with the factory, for reaching concrete stores
    pub connector: Arc<MemoryConnector>,
}

impl TestCache {
    /// Register the default client plus `names` against one memory server
    pub fn new(names: &[&str]) -> Self {
        let mut registry = CacheRegistry::new();
        registry
            .add_cache(CacheConfiguration::new("cache.example:6380", "s3cr3t"))
            .expect("Failed to bind cache configuration");
        for name in names {
            registry
                .add_cache_client(name)
                .expect("Failed to register client");
        }

        let connector = Arc::new(MemoryConnector::new());
        let factory = registry
            .build(connector.clone())
            .expect("Failed to build factory");

        Self { factory, connector }
    }

    /// The store backing the client named `name`
    pub fn store(&self, name: &str) -> Arc<MemoryStore> {
        self.connector
            .store(name)
            .unwrap_or_else(|| panic!("No store opened for '{name}'"))
    }
}
