//! Typed events emitted by the chat client.
//!
//! A closed sum type with a shared channel/user field set replaces the
//! original platform SDKs' event class hierarchies; consumers match
//! exhaustively instead of downcasting.

use chrono::{DateTime, Utc};
use streamkit_common::{ChannelRef, UserRef};

/// Events delivered to subscribers. Value objects: equality is by field
/// value.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// A user joined a channel. Emitted for our own join confirmation too.
    Join { channel: ChannelRef, user: UserRef },

    /// A user left a channel.
    Part { channel: ChannelRef, user: UserRef },

    /// A chat message in a channel.
    Message {
        channel: ChannelRef,
        user: UserRef,
        text: String,
        /// Server-assigned message id (`id` tag), when present.
        msg_id: Option<String>,
        /// The message used the third-person action convention.
        is_action: bool,
        /// Bits attached to the message, when any.
        bits: Option<u64>,
        /// Server-side send timestamp (`tmi-sent-ts` tag).
        sent_at: Option<DateTime<Utc>>,
    },

    /// A single message was deleted by a moderator.
    MessageDeleted {
        channel: ChannelRef,
        /// Login of the user whose message was deleted (`login` tag).
        user_login: String,
        /// Id of the deleted message (`target-msg-id` tag).
        msg_id: String,
        /// The deleted text, unwrapped if it was an action message.
        text: String,
        was_action: bool,
    },

    /// The whole chat was cleared.
    ChatCleared { channel: ChannelRef },

    /// A user was timed out; their messages were purged.
    UserTimedOut {
        channel: ChannelRef,
        user_login: String,
        duration_secs: u64,
    },

    /// A user was permanently banned.
    UserBanned { channel: ChannelRef, user_login: String },

    /// A user notice: subscription, resub, raid, announcement, etc.
    UserNotice {
        channel: ChannelRef,
        /// Absent for some server-originated notices.
        user: Option<UserRef>,
        /// Notice kind from the `msg-id` tag (e.g. `sub`, `raid`).
        notice: String,
        /// Server-rendered description (`system-msg` tag).
        system_message: Option<String>,
        /// The user's own message, when the notice carries one.
        message: Option<String>,
    },

    /// A server notice (`msg-id` tag carries the machine-readable kind).
    Notice {
        channel: Option<ChannelRef>,
        message_id: Option<String>,
        text: String,
    },

    /// Our own per-channel state as reported by the server.
    UserState {
        channel: ChannelRef,
        user: UserRef,
        emote_sets: Vec<String>,
    },

    /// Channel mode settings reported on join or on change. Only fields
    /// present on the wire are `Some`.
    RoomState {
        channel: ChannelRef,
        emote_only: Option<bool>,
        /// Minutes of required followage; `-1` means disabled.
        followers_only: Option<i64>,
        unique_only: Option<bool>,
        /// Seconds between messages per user; `0` means off.
        slow: Option<u64>,
        subs_only: Option<bool>,
    },

    /// Our global (connection-wide) user state.
    GlobalUserState { user: UserRef },

    /// A private whisper to our user.
    Whisper { from: UserRef, text: String },

    /// The connection completed its handshake and is ready.
    ConnectionEstablished,

    /// The reconnect retry ceiling was reached; the connection is now
    /// terminally disconnected.
    ConnectionLost { reason: String },
}

/// Discriminant used to subscribe to one event variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Join,
    Part,
    Message,
    MessageDeleted,
    ChatCleared,
    UserTimedOut,
    UserBanned,
    UserNotice,
    Notice,
    UserState,
    RoomState,
    GlobalUserState,
    Whisper,
    ConnectionEstablished,
    ConnectionLost,
}

impl ChatEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChatEvent::Join { .. } => EventKind::Join,
            ChatEvent::Part { .. } => EventKind::Part,
            ChatEvent::Message { .. } => EventKind::Message,
            ChatEvent::MessageDeleted { .. } => EventKind::MessageDeleted,
            ChatEvent::ChatCleared { .. } => EventKind::ChatCleared,
            ChatEvent::UserTimedOut { .. } => EventKind::UserTimedOut,
            ChatEvent::UserBanned { .. } => EventKind::UserBanned,
            ChatEvent::UserNotice { .. } => EventKind::UserNotice,
            ChatEvent::Notice { .. } => EventKind::Notice,
            ChatEvent::UserState { .. } => EventKind::UserState,
            ChatEvent::RoomState { .. } => EventKind::RoomState,
            ChatEvent::GlobalUserState { .. } => EventKind::GlobalUserState,
            ChatEvent::Whisper { .. } => EventKind::Whisper,
            ChatEvent::ConnectionEstablished => EventKind::ConnectionEstablished,
            ChatEvent::ConnectionLost { .. } => EventKind::ConnectionLost,
        }
    }

    /// The channel this event is scoped to, for channel-scoped variants.
    pub fn channel(&self) -> Option<&ChannelRef> {
        match self {
            ChatEvent::Join { channel, .. }
            | ChatEvent::Part { channel, .. }
            | ChatEvent::Message { channel, .. }
            | ChatEvent::MessageDeleted { channel, .. }
            | ChatEvent::ChatCleared { channel }
            | ChatEvent::UserTimedOut { channel, .. }
            | ChatEvent::UserBanned { channel, .. }
            | ChatEvent::UserNotice { channel, .. }
            | ChatEvent::UserState { channel, .. }
            | ChatEvent::RoomState { channel, .. } => Some(channel),
            ChatEvent::Notice { channel, .. } => channel.as_ref(),
            _ => None,
        }
    }
}
