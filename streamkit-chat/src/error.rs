//! Error taxonomy for the chat client.
//!
//! Parse- and interpretation-level errors are non-fatal: the read loop
//! logs them and moves on to the next line. Only transport-level failures
//! affect connection state.

use thiserror::Error;

/// A protocol line that could not be parsed. The offending line is
/// dropped and the read loop continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed line ({reason}): {line:?}")]
pub struct MalformedLineError {
    pub line: String,
    pub reason: &'static str,
}

/// A known command keyword whose message was missing required fields.
/// The message is dropped; never propagated to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot interpret {command}: {reason}")]
pub struct UnrecognizedCommandError {
    pub command: String,
    pub reason: &'static str,
}

/// Errors surfaced to callers of the chat client.
#[derive(Debug, Error)]
pub enum ChatError {
    /// An outbound command was issued while the connection was not in the
    /// Connected state and no outbound buffering is configured.
    #[error("not connected")]
    NotConnected,

    /// The server rejected our credentials. Terminal for this connection
    /// attempt; the client does not retry on its own.
    #[error("authentication rejected: {0}")]
    Authentication(String),

    /// Transport-level failure. Triggers the reconnect policy.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The reconnect retry ceiling was reached. The connection is left in
    /// the terminal Disconnected state.
    #[error("connection lost after {attempts} reconnect attempts: {reason}")]
    ConnectionLost { attempts: u32, reason: String },

    /// The client was closed explicitly.
    #[error("client closed")]
    Closed,
}
