//! Key/value cache commands.

use anyhow::Context;
use clap::Args;

use rediscache_client::{CacheClient, DEFAULT_TTL_MINUTES};

use crate::output;

/// Arguments for `get`
#[derive(Debug, Args)]
pub struct GetArgs {
    /// Cache key
    pub key: String,
}

/// Arguments for `set`
#[derive(Debug, Args)]
pub struct SetArgs {
    /// Cache key
    pub key: String,
    /// Value to store; JSON is stored as-is, anything else as a JSON string
    pub value: String,
    /// Time to live in minutes
    #[arg(short, long, default_value_t = DEFAULT_TTL_MINUTES)]
    pub ttl: u16,
}

/// Arguments for `invalidate`
#[derive(Debug, Args)]
pub struct InvalidateArgs {
    /// Cache key
    pub key: String,
}

/// Print the value stored at a key
pub async fn get(args: &GetArgs, client: &CacheClient) -> anyhow::Result<()> {
    if !client.is_connected() {
        output::print_warning(&format!("Client '{}' is not connected", client.name()));
    }

    let value = client
        .get(&args.key)
        .await
        .with_context(|| format!("Failed to read '{}'", args.key))?;

    match value {
        Some(raw) => output::print_payload(&raw),
        None => println!("(nil)"),
    }
    Ok(())
}

/// Store a value under a key
pub async fn set(args: &SetArgs, client: &CacheClient) -> anyhow::Result<()> {
    if !client.is_connected() {
        output::print_warning(&format!(
            "Client '{}' is not connected; the value was not stored",
            client.name()
        ));
        return Ok(());
    }

    let value = serde_json::from_str::<serde_json::Value>(&args.value)
        .unwrap_or_else(|_| serde_json::Value::String(args.value.clone()));

    client
        .set_as(&args.key, &value, args.ttl)
        .await
        .with_context(|| format!("Failed to write '{}'", args.key))?;

    output::print_success(&format!("Stored '{}' for {} minutes", args.key, args.ttl));
    Ok(())
}

/// Remove a key
pub async fn invalidate(args: &InvalidateArgs, client: &CacheClient) -> anyhow::Result<()> {
    client
        .invalidate(&args.key)
        .await
        .with_context(|| format!("Failed to invalidate '{}'", args.key))?;

    output::print_success(&format!("Invalidated '{}'", args.key));
    Ok(())
}
