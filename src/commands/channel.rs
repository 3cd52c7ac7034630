//! Publish/subscribe commands.

use anyhow::Context;
use clap::Args;
use futures::StreamExt;

use rediscache_client::CacheClient;

use crate::output;

/// Arguments for `publish`
#[derive(Debug, Args)]
pub struct PublishArgs {
    /// Channel name
    pub channel: String,
    /// Message payload
    pub message: String,
}

/// Arguments for `subscribe`
#[derive(Debug, Args)]
pub struct SubscribeArgs {
    /// Channel name
    pub channel: String,
    /// Stop after this many messages
    #[arg(short, long)]
    pub count: Option<usize>,
}

/// Publish one message
pub async fn publish(args: &PublishArgs, client: &CacheClient) -> anyhow::Result<()> {
    let receivers = client
        .subscriber()
        .publish(&args.channel, args.message.as_bytes())
        .await
        .with_context(|| format!("Failed to publish on '{}'", args.channel))?;

    output::print_success(&format!(
        "Published on '{}' ({} receivers)",
        args.channel, receivers
    ));
    Ok(())
}

/// Print messages until the stream ends or `count` is reached
pub async fn subscribe(args: &SubscribeArgs, client: &CacheClient) -> anyhow::Result<()> {
    let stream = client
        .subscriber()
        .subscribe(&args.channel)
        .await
        .with_context(|| format!("Failed to subscribe to '{}'", args.channel))?;

    tracing::info!(channel = %args.channel, "Subscribed");

    let mut stream = match args.count {
        Some(count) => stream.take(count).boxed(),
        None => stream,
    };
    while let Some(payload) = stream.next().await {
        output::print_payload(&payload);
    }
    Ok(())
}
