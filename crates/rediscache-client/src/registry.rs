//! Composition-root registration of cache clients.
//!
//! ```rust,ignore
//! let mut registry = CacheRegistry::new();
//! registry
//!     .add_cache(config.cache.clone())?
//!     .add_cache_client("Orders")?;
//! let factory = registry.build(Arc::new(RedisConnector::new()))?;
//! let orders = factory.create_client(Some("Orders")).await?;
//! ```

use std::sync::Arc;

use rediscache_core::config::cache::CacheConfiguration;
use rediscache_core::error::AppError;
use rediscache_core::result::AppResult;
use rediscache_core::traits::StoreConnector;
use rediscache_core::types::ClientName;

use crate::factory::CacheClientFactory;
use crate::registration::ClientRegistration;

/// Collects the configuration and the named clients a process needs.
#[derive(Debug, Default)]
pub struct CacheRegistry {
    config: Option<CacheConfiguration>,
    registrations: Vec<Arc<ClientRegistration>>,
}

impl CacheRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the store configuration and register the default client.
    pub fn add_cache(&mut self, config: CacheConfiguration) -> AppResult<&mut Self> {
        self.config = Some(config);
        self.add_cache_client(ClientName::DEFAULT)
    }

    /// Register an additional named client.
    ///
    /// Fails fast on an invalid name. Registering a name twice is a no-op.
    pub fn add_cache_client(&mut self, name: &str) -> AppResult<&mut Self> {
        let name = ClientName::new(name)?;
        if !self.registrations.iter().any(|r| r.name() == &name) {
            self.registrations.push(Arc::new(ClientRegistration::new(name)));
        }
        Ok(self)
    }

    /// Registered client names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.registrations.iter().map(|r| r.name().as_str()).collect()
    }

    /// Build the factory that realizes the registered clients.
    pub fn build(self, connector: Arc<dyn StoreConnector>) -> AppResult<CacheClientFactory> {
        let config = self.config.ok_or_else(|| {
            AppError::configuration("No cache configuration bound; call add_cache first")
        })?;
        config.validate()?;
        Ok(CacheClientFactory::new(config, self.registrations, connector))
    }
}
