//! Listens to a channel's shoutout topic and prints typed payloads.
//!
//! ```text
//! cargo run --example listen_shoutouts -- wss://pubsub.example.com 123456
//! ```

use anyhow::{Context, Result};

use streamkit_pubsub::{PubSubClient, PubSubConfig, PubSubEvent, ShoutoutPayload, Topic};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,streamkit_pubsub=debug".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let url = args.next().context("usage: listen_shoutouts <url> <channel-id>")?;
    let channel_id = args.next().context("missing channel id")?;

    let (client, mut events) = PubSubClient::connect(PubSubConfig::new(url));
    let topic = Topic::shoutouts(channel_id);
    client.listen(vec![topic.clone()]).await?;
    tracing::info!(%topic, "listening");

    while let Some(event) = events.recv().await {
        match event {
            PubSubEvent::Message { topic, payload } => {
                match ShoutoutPayload::decode(&topic, &payload) {
                    Some(shoutout) => {
                        tracing::info!(
                            target_login = %shoutout.data.target_login,
                            "shoutout for {}",
                            shoutout.data.target_user_id
                        );
                    }
                    None => tracing::info!(%topic, "message: {payload}"),
                }
            }
            PubSubEvent::Connected => tracing::info!("connected"),
            PubSubEvent::Disconnected { reason } => {
                tracing::warn!(reason = %reason, "disconnected, retrying in background");
            }
        }
    }
    Ok(())
}
