//! PubSub error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PubSubError {
    /// The server rejected the token supplied with a LISTEN/UNLISTEN.
    #[error("authorization rejected: {0}")]
    BadAuth(String),

    /// The requested topic does not exist or is malformed.
    #[error("bad topic: {0}")]
    BadTopic(String),

    /// Any other non-empty RESPONSE error code.
    #[error("server error: {0}")]
    Server(String),

    /// The connection dropped before the request was answered; it will be
    /// re-issued automatically only for already-confirmed topics.
    #[error("connection lost before the request completed")]
    Interrupted,

    #[error("websocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// The client was closed or its task is gone.
    #[error("pubsub client closed")]
    Closed,
}

impl PubSubError {
    /// Classify a non-empty RESPONSE error code.
    pub(crate) fn from_response(code: &str) -> Self {
        match code {
            "ERR_BADAUTH" => PubSubError::BadAuth(code.to_string()),
            "ERR_BADTOPIC" => PubSubError::BadTopic(code.to_string()),
            other => PubSubError::Server(other.to_string()),
        }
    }
}
