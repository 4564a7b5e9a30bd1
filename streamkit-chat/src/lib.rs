//! Asynchronous chat client for the streaming platform's IRC-derived
//! chat protocol.
//!
//! The crate is layered: [`irc`] parses wire lines into [`irc::Message`]
//! values, [`interpret`] turns messages into typed [`ChatEvent`]s,
//! [`client::ChatClient`] owns the connection lifecycle (handshake,
//! keepalive, reconnect with backoff, outbound rate limiting), and
//! [`dispatch::EventDispatcher`] fans events out to subscribers.
//!
//! ```no_run
//! use streamkit_chat::{ChatClient, ChatConfig, EventKind, TlsConnector};
//! use streamkit_common::ChannelRef;
//!
//! # async fn run() -> Result<(), streamkit_chat::ChatError> {
//! let client = ChatClient::connect(
//!     ChatConfig::default(),
//!     TlsConnector::new("irc.chat.example.com:6697"),
//! )
//! .await?;
//!
//! client.events().subscribe(EventKind::Message, |event| {
//!     println!("{event:?}");
//!     Ok(())
//! });
//! client.join(&ChannelRef::from_name("somechannel")).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod conn;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod interpret;
pub mod irc;
pub mod rate;
pub mod state;

pub use client::{
    ChatClient, ChatConfig, ClosePolicy, ModerationAction, OutboundPolicy, RateLimitConfig,
    ReconnectConfig,
};
pub use conn::{BoxedTransport, ConnectionState, Connector, TcpConnector, TlsConnector, Transport};
pub use dispatch::{EventDispatcher, HandlerResult, SubscriptionId};
pub use error::{ChatError, MalformedLineError, UnrecognizedCommandError};
pub use event::{ChatEvent, EventKind};
pub use irc::Message;
pub use state::{ChannelSnapshot, ChannelState, ChannelTracker, JoinStatus};
