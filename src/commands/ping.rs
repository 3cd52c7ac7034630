//! Connectivity check.

use anyhow::{Context, bail};

use rediscache_client::CacheClient;
use rediscache_client::redis::RedisStore;

use crate::output;

/// Send `PING` on the client's connection
pub async fn execute(client: &CacheClient) -> anyhow::Result<()> {
    let store = client.store();
    let Some(redis) = store.as_any().downcast_ref::<RedisStore>() else {
        output::print_success(&format!(
            "Client '{}' status: {}",
            client.name(),
            store.status()
        ));
        return Ok(());
    };

    if !client.is_connected() {
        bail!("Client '{}' is not connected ({})", client.name(), store.status());
    }

    let reply = redis
        .command("PING", &[])
        .await
        .context("PING failed")?;

    output::print_success(&format!("Client '{}': {:?}", client.name(), reply));
    Ok(())
}
