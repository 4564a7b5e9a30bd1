//! Shared value types used across the streamkit SDK crates.
//!
//! Chat, PubSub, and REST all need to name channels, users, and
//! credentials; the types live here so the crates stay independent of
//! each other.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies a channel by login name and, when known, stable platform id.
///
/// Used as a key throughout the SDK. Equality and hashing go by the
/// normalized (lowercased, `#`-stripped) login name so that `#Chan` and
/// `#chan` refer to the same channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelRef {
    /// Stable platform id (from the `room-id` tag), when known.
    pub id: Option<String>,
    /// Channel login name, stored without the `#` prefix.
    pub name: String,
}

impl ChannelRef {
    /// Create a ref from a login name. Accepts both `#chan` and `chan`.
    pub fn from_name(name: &str) -> Self {
        Self {
            id: None,
            name: name.trim_start_matches('#').to_ascii_lowercase(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// The wire form of the channel name (`#name`).
    pub fn wire_name(&self) -> String {
        format!("#{}", self.name)
    }
}

impl PartialEq for ChannelRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ChannelRef {}

impl std::hash::Hash for ChannelRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.name)
    }
}

/// Identifies a user, with role flags sourced from message tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// Stable platform id (from the `user-id` tag), when known.
    pub id: Option<String>,
    /// Login name (lowercase).
    pub login: String,
    /// Display name, which may differ from the login in case only.
    pub display_name: Option<String>,
    pub is_moderator: bool,
    pub is_subscriber: bool,
    pub is_vip: bool,
    pub is_broadcaster: bool,
}

impl UserRef {
    pub fn from_login(login: &str) -> Self {
        Self {
            login: login.to_ascii_lowercase(),
            ..Self::default()
        }
    }
}

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.display_name {
            Some(d) => write!(f, "{d}"),
            None => write!(f, "{}", self.login),
        }
    }
}

/// A bearer credential for the platform APIs.
///
/// Chat sends the token on the authentication line, PubSub attaches it to
/// topic LISTEN requests, and REST puts it in the Authorization header.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Login name the credential belongs to.
    pub login: String,
    /// OAuth bearer token, without any `oauth:` prefix.
    pub token: String,
}

impl Credential {
    pub fn new(login: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            token: token.into().trim_start_matches("oauth:").to_string(),
        }
    }
}

// Manual Debug so tokens never end up in logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("login", &self.login)
            .field("token", &"<redacted>")
            .finish()
    }
}
