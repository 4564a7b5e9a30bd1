//! Minimal chat bot: joins a channel, logs messages, and answers `!ping`.
//!
//! ```text
//! cargo run --example chat_bot -- --server irc.chat.example.com:6697 \
//!     --channel somechannel --login mybot --token oauth:...
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use streamkit_chat::{ChatClient, ChatConfig, ChatEvent, EventKind, TlsConnector};
use streamkit_common::{ChannelRef, Credential};

#[derive(Parser, Debug)]
#[command(about = "Chat bot demo")]
struct Args {
    /// Chat server address (host:port, TLS).
    #[arg(long, default_value = "irc.chat.example.com:6697")]
    server: String,

    /// Channel to join (with or without the leading #).
    #[arg(long)]
    channel: String,

    /// Bot account login. Omit both login and token to connect read-only.
    #[arg(long)]
    login: Option<String>,

    /// OAuth token for the bot account.
    #[arg(long, env = "STREAMKIT_TOKEN")]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,streamkit_chat=debug".into()),
        )
        .init();

    let args = Args::parse();
    let credential = match (args.login, args.token) {
        (Some(login), Some(token)) => Some(Credential::new(login, token)),
        _ => None,
    };
    let config = ChatConfig {
        credential,
        ..ChatConfig::default()
    };

    let client = Arc::new(
        ChatClient::connect(config, TlsConnector::new(args.server.clone())).await?,
    );
    tracing::info!(server = %args.server, "connected");

    let (reply_tx, mut reply_rx) = tokio::sync::mpsc::unbounded_channel::<ChannelRef>();
    client.events().subscribe(EventKind::Message, move |event| {
        if let ChatEvent::Message { channel, user, text, .. } = event {
            tracing::info!(channel = %channel, user = %user, "{text}");
            if text.trim() == "!ping" {
                reply_tx.send(channel.clone())?;
            }
        }
        Ok(())
    });
    client.events().subscribe(EventKind::ConnectionLost, |event| {
        if let ChatEvent::ConnectionLost { reason } = event {
            tracing::error!(reason = %reason, "connection lost for good");
        }
        Ok(())
    });

    let channel = ChannelRef::from_name(&args.channel);
    client.join(&channel).await?;
    tracing::info!(channel = %channel, "joined");

    loop {
        tokio::select! {
            Some(channel) = reply_rx.recv() => {
                if let Err(e) = client.send_message(&channel, "pong").await {
                    tracing::warn!(error = %e, "reply failed");
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    tracing::info!("shutting down");
    client.close().await?;
    // Give the subscriber a beat to flush.
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
