//! Maps parsed protocol messages to semantic chat events.
//!
//! Pure: takes a [`Message`] and a read-only channel snapshot, returns
//! zero or one [`ChatEvent`]. Unknown command keywords yield `Ok(None)`
//! — a deliberate permissiveness policy so protocol evolution does not
//! break the client. Known keywords with missing required fields yield
//! an [`UnrecognizedCommandError`], which the caller logs and drops.

use streamkit_common::{ChannelRef, UserRef};

use crate::error::UnrecognizedCommandError;
use crate::event::ChatEvent;
use crate::irc::Message;
use crate::state::ChannelSnapshot;

/// Delimiter wrapping action-style (`/me`) message payloads.
const ACTION_PREFIX: &str = "\u{1}ACTION ";
const ACTION_SUFFIX: char = '\u{1}';

/// Interpret one message against the current channel state.
pub fn interpret(
    msg: &Message,
    channels: &ChannelSnapshot,
) -> Result<Option<ChatEvent>, UnrecognizedCommandError> {
    match msg.command.as_str() {
        "JOIN" => {
            let channel = channel_param(msg, 0)?;
            if !channels.contains(&channel) {
                return Ok(None);
            }
            let user = user_from(msg).ok_or_else(|| missing(msg, "prefix nick"))?;
            Ok(Some(ChatEvent::Join { channel, user }))
        }
        "PART" => {
            let channel = channel_param(msg, 0)?;
            if !channels.contains(&channel) {
                return Ok(None);
            }
            let user = user_from(msg).ok_or_else(|| missing(msg, "prefix nick"))?;
            Ok(Some(ChatEvent::Part { channel, user }))
        }
        "PRIVMSG" => {
            let channel = channel_param(msg, 0)?;
            if !channels.contains(&channel) {
                return Ok(None);
            }
            let user = user_from(msg).ok_or_else(|| missing(msg, "prefix nick"))?;
            let raw_text = msg.params.get(1).ok_or_else(|| missing(msg, "message text"))?;
            let (text, is_action) = unwrap_action(raw_text);
            let bits = msg.tag("bits").and_then(|b| b.parse().ok());
            let sent_at = msg
                .tag("tmi-sent-ts")
                .and_then(|ts| ts.parse::<i64>().ok())
                .and_then(chrono::DateTime::from_timestamp_millis);
            Ok(Some(ChatEvent::Message {
                channel,
                user,
                text: text.to_string(),
                msg_id: msg.tag("id").map(str::to_string),
                is_action,
                bits,
                sent_at,
            }))
        }
        "CLEARMSG" => {
            let channel = channel_param(msg, 0)?;
            if !channels.contains(&channel) {
                return Ok(None);
            }
            let msg_id = msg
                .tag("target-msg-id")
                .ok_or_else(|| missing(msg, "target-msg-id tag"))?;
            let user_login = msg.tag("login").unwrap_or_default().to_string();
            let raw_text = msg.params.get(1).map(String::as_str).unwrap_or_default();
            let (text, was_action) = unwrap_action(raw_text);
            Ok(Some(ChatEvent::MessageDeleted {
                channel,
                user_login,
                msg_id: msg_id.to_string(),
                text: text.to_string(),
                was_action,
            }))
        }
        "CLEARCHAT" => {
            let channel = channel_param(msg, 0)?;
            if !channels.contains(&channel) {
                return Ok(None);
            }
            match msg.params.get(1) {
                None => Ok(Some(ChatEvent::ChatCleared { channel })),
                Some(login) => match msg.tag("ban-duration").and_then(|d| d.parse().ok()) {
                    Some(duration_secs) => Ok(Some(ChatEvent::UserTimedOut {
                        channel,
                        user_login: login.clone(),
                        duration_secs,
                    })),
                    None => Ok(Some(ChatEvent::UserBanned {
                        channel,
                        user_login: login.clone(),
                    })),
                },
            }
        }
        "NOTICE" => {
            let target = msg.params.first().ok_or_else(|| missing(msg, "target"))?;
            let channel = if target.starts_with('#') {
                let channel = ChannelRef::from_name(target);
                if !channels.contains(&channel) {
                    return Ok(None);
                }
                Some(channel)
            } else {
                None
            };
            let text = msg.params.get(1).cloned().unwrap_or_default();
            Ok(Some(ChatEvent::Notice {
                channel,
                message_id: msg.tag("msg-id").map(str::to_string),
                text,
            }))
        }
        "USERNOTICE" => {
            let channel = channel_param(msg, 0)?;
            if !channels.contains(&channel) {
                return Ok(None);
            }
            let notice = msg
                .tag("msg-id")
                .ok_or_else(|| missing(msg, "msg-id tag"))?
                .to_string();
            Ok(Some(ChatEvent::UserNotice {
                channel,
                user: user_from(msg),
                notice,
                system_message: msg.tag("system-msg").map(str::to_string),
                message: msg.params.get(1).cloned(),
            }))
        }
        "USERSTATE" => {
            let channel = channel_param(msg, 0)?;
            if !channels.contains(&channel) {
                return Ok(None);
            }
            let user = user_from_tags(msg);
            let emote_sets = msg
                .tag("emote-sets")
                .map(|s| s.split(',').map(str::to_string).collect())
                .unwrap_or_default();
            Ok(Some(ChatEvent::UserState { channel, user, emote_sets }))
        }
        "ROOMSTATE" => {
            let mut channel = channel_param(msg, 0)?;
            if !channels.contains(&channel) {
                return Ok(None);
            }
            if let Some(id) = msg.tag("room-id") {
                channel = channel.with_id(id);
            }
            Ok(Some(ChatEvent::RoomState {
                channel,
                emote_only: msg.tag("emote-only").map(|v| v == "1"),
                followers_only: msg.tag("followers-only").and_then(|v| v.parse().ok()),
                unique_only: msg.tag("r9k").map(|v| v == "1"),
                slow: msg.tag("slow").and_then(|v| v.parse().ok()),
                subs_only: msg.tag("subs-only").map(|v| v == "1"),
            }))
        }
        "GLOBALUSERSTATE" => Ok(Some(ChatEvent::GlobalUserState {
            user: user_from_tags(msg),
        })),
        "WHISPER" => {
            let from = user_from(msg).ok_or_else(|| missing(msg, "prefix nick"))?;
            let text = msg.params.get(1).cloned().ok_or_else(|| missing(msg, "text"))?;
            Ok(Some(ChatEvent::Whisper { from, text }))
        }
        // Anything else — connection-level traffic handled by the
        // connection manager, numerics, or commands this client does not
        // know. Dropped without error.
        other => {
            tracing::debug!(command = other, "dropping uninterpreted command");
            Ok(None)
        }
    }
}

/// Build a user ref from the message prefix plus role/identity tags.
/// `None` when there is no usable login.
pub(crate) fn user_from(msg: &Message) -> Option<UserRef> {
    let login = msg
        .prefix_nick()
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .or_else(|| msg.tag("login").map(str::to_string))?;
    let mut user = user_from_tags(msg);
    user.login = login.to_ascii_lowercase();
    Some(user)
}

/// Build a user ref purely from tags (USERSTATE and friends carry no
/// meaningful prefix).
pub(crate) fn user_from_tags(msg: &Message) -> UserRef {
    let badges = msg.tag("badges").unwrap_or_default();
    let has_badge = |name: &str| badges.split(',').any(|b| b.split('/').next() == Some(name));
    UserRef {
        id: msg.tag("user-id").map(str::to_string),
        login: msg.tag("login").unwrap_or_default().to_ascii_lowercase(),
        display_name: msg.tag("display-name").map(str::to_string),
        is_moderator: msg.tag("mod") == Some("1") || has_badge("moderator"),
        is_subscriber: msg.tag("subscriber") == Some("1") || has_badge("subscriber"),
        is_vip: msg.tag("vip") == Some("1") || has_badge("vip"),
        is_broadcaster: has_badge("broadcaster"),
    }
}

/// Strip the action-style wrapper, reporting whether it was present.
fn unwrap_action(text: &str) -> (&str, bool) {
    match text
        .strip_prefix(ACTION_PREFIX)
        .map(|t| t.strip_suffix(ACTION_SUFFIX).unwrap_or(t))
    {
        Some(inner) => (inner, true),
        None => (text, false),
    }
}

fn channel_param(msg: &Message, idx: usize) -> Result<ChannelRef, UnrecognizedCommandError> {
    msg.params
        .get(idx)
        .filter(|p| p.starts_with('#'))
        .map(|p| ChannelRef::from_name(p))
        .ok_or_else(|| missing(msg, "channel parameter"))
}

fn missing(msg: &Message, reason: &'static str) -> UnrecognizedCommandError {
    UnrecognizedCommandError {
        command: msg.command.clone(),
        reason,
    }
}
