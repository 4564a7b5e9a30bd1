//! WebSocket topic subscription client for the streaming platform's
//! PubSub service.
//!
//! Subscriptions are credential-scoped topics; LISTEN/UNLISTEN requests
//! are confirmed by nonce-matched RESPONSE frames, and the client keeps
//! the socket alive with jittered PINGs and transparently re-listens all
//! confirmed topics after a reconnect.
//!
//! ```no_run
//! use streamkit_pubsub::{PubSubClient, PubSubConfig, PubSubEvent, Topic};
//!
//! # async fn run() -> Result<(), streamkit_pubsub::PubSubError> {
//! let (client, mut events) =
//!     PubSubClient::connect(PubSubConfig::new("wss://pubsub.example.com"));
//! client.listen(vec![Topic::shoutouts("123456")]).await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let PubSubEvent::Message { topic, payload } = event {
//!         println!("{topic}: {payload}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod frame;
pub mod payload;
pub mod topic;

pub use client::{PubSubClient, PubSubConfig, PubSubEvent};
pub use error::PubSubError;
pub use frame::Frame;
pub use payload::{ShoutoutData, ShoutoutPayload};
pub use topic::Topic;
