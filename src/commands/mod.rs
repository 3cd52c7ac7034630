//! CLI command definitions and dispatch.

pub mod cache;
pub mod channel;
pub mod ping;

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use rediscache_client::redis::RedisConnector;
use rediscache_client::{CacheClient, CacheClientFactory, CacheRegistry};
use rediscache_core::config::AppConfig;
use rediscache_core::types::ClientName;

/// RedisCache: named, lazily connected cache clients
#[derive(Debug, Parser)]
#[command(name = "rediscache", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Name of the cache client to use
    #[arg(short = 'n', long, default_value = ClientName::DEFAULT)]
    pub client: String,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Read a cached value
    Get(cache::GetArgs),
    /// Store a value
    Set(cache::SetArgs),
    /// Remove a cached value
    Invalidate(cache::InvalidateArgs),
    /// Publish a message on a channel
    Publish(channel::PublishArgs),
    /// Print messages published on a channel
    Subscribe(channel::SubscribeArgs),
    /// Check connectivity of the client
    Ping,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self, config: AppConfig) -> anyhow::Result<()> {
        let factory = build_factory(config, &self.client)?;
        let client = factory
            .create_client(Some(&self.client))
            .await
            .with_context(|| format!("Failed to create cache client '{}'", self.client))?;

        let result = self.dispatch(&client).await;
        factory.shutdown().await;
        result
    }

    async fn dispatch(&self, client: &CacheClient) -> anyhow::Result<()> {
        match &self.command {
            Commands::Get(args) => cache::get(args, client).await,
            Commands::Set(args) => cache::set(args, client).await,
            Commands::Invalidate(args) => cache::invalidate(args, client).await,
            Commands::Publish(args) => channel::publish(args, client).await,
            Commands::Subscribe(args) => channel::subscribe(args, client).await,
            Commands::Ping => ping::execute(client).await,
        }
    }
}

/// Helper: register the default client plus `client` and build the factory
fn build_factory(config: AppConfig, client: &str) -> anyhow::Result<CacheClientFactory> {
    let mut registry = CacheRegistry::new();
    registry
        .add_cache(config.cache)?
        .add_cache_client(client)
        .with_context(|| format!("Invalid client name '{}'", client))?;

    Ok(registry.build(Arc::new(RedisConnector::new()))?)
}
