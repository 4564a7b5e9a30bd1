//! Line parser for the chat wire protocol.
//!
//! One raw line becomes one [`Message`]: optional `@key=value;…` tag
//! section, optional `:prefix`, a command keyword, and ordered
//! parameters where a `:`-introduced trailing parameter may contain
//! spaces. Parsing is a pure function with no I/O; re-serializing a
//! parsed message and parsing it again yields an equal value.

use std::collections::HashMap;
use std::fmt;

use crate::error::MalformedLineError;

/// One parsed protocol line. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message tags with escape sequences already decoded.
    pub tags: HashMap<String, String>,
    /// `server` or `nick!user@host`.
    pub prefix: Option<String>,
    /// Command keyword, uppercased.
    pub command: String,
    /// Parameters in wire order; the trailing parameter, if any, is last.
    pub params: Vec<String>,
}

impl Message {
    /// Parse a raw protocol line, including optional message tags.
    pub fn parse(line: &str) -> Result<Self, MalformedLineError> {
        let full = line;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(malformed(full, "empty line"));
        }

        let mut rest = line;

        let tags = if let Some(tag_section) = rest.strip_prefix('@') {
            let end = tag_section
                .find(' ')
                .ok_or_else(|| malformed(full, "tag section without command"))?;
            rest = tag_section[end + 1..].trim_start_matches(' ');
            parse_tags(&tag_section[..end])
        } else {
            HashMap::new()
        };

        let prefix = if let Some(prefix_section) = rest.strip_prefix(':') {
            let end = prefix_section
                .find(' ')
                .ok_or_else(|| malformed(full, "prefix without command"))?;
            let pfx = prefix_section[..end].to_string();
            rest = prefix_section[end + 1..].trim_start_matches(' ');
            Some(pfx)
        } else {
            None
        };

        let mut params = Vec::new();
        let command;

        if let Some(space) = rest.find(' ') {
            command = rest[..space].to_ascii_uppercase();
            rest = rest[space + 1..].trim_start_matches(' ');

            while !rest.is_empty() {
                if let Some(trailing) = rest.strip_prefix(':') {
                    params.push(trailing.to_string());
                    break;
                }
                if let Some(space) = rest.find(' ') {
                    params.push(rest[..space].to_string());
                    rest = rest[space + 1..].trim_start_matches(' ');
                } else {
                    params.push(rest.to_string());
                    break;
                }
            }
        } else {
            command = rest.to_ascii_uppercase();
        }

        if command.is_empty() {
            return Err(malformed(full, "missing command"));
        }

        Ok(Message {
            tags,
            prefix,
            command,
            params,
        })
    }

    /// Tag value by key, if present and non-empty.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(|s| s.as_str()).filter(|s| !s.is_empty())
    }

    /// The nick portion of a user prefix (`nick!user@host` → `nick`).
    /// `None` for server prefixes, which carry no `!`.
    pub fn prefix_nick(&self) -> Option<&str> {
        self.prefix
            .as_deref()
            .and_then(|p| p.split_once('!'))
            .map(|(nick, _)| nick)
    }

    /// The trailing parameter, when the command carries one.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(|s| s.as_str())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.tags.is_empty() {
            write!(f, "@")?;
            for (i, (key, value)) in self.tags.iter().enumerate() {
                if i > 0 {
                    write!(f, ";")?;
                }
                if value.is_empty() {
                    write!(f, "{key}")?;
                } else {
                    write!(f, "{key}={}", escape_tag_value(value))?;
                }
            }
            write!(f, " ")?;
        }

        if let Some(ref prefix) = self.prefix {
            write!(f, ":{prefix} ")?;
        }
        write!(f, "{}", self.command)?;
        for (i, param) in self.params.iter().enumerate() {
            if i == self.params.len() - 1
                && (param.contains(' ') || param.starts_with(':') || param.is_empty())
            {
                write!(f, " :{param}")?;
            } else {
                write!(f, " {param}")?;
            }
        }
        Ok(())
    }
}

fn malformed(line: &str, reason: &'static str) -> MalformedLineError {
    MalformedLineError {
        line: line.trim_end_matches(['\r', '\n']).to_string(),
        reason,
    }
}

/// Parse a tag section: `key=value;key2=value2;key3`
fn parse_tags(tag_str: &str) -> HashMap<String, String> {
    let mut tags = HashMap::new();
    for pair in tag_str.split(';') {
        if pair.is_empty() {
            continue;
        }
        if let Some((key, value)) = pair.split_once('=') {
            tags.insert(key.to_string(), unescape_tag_value(value));
        } else {
            tags.insert(pair.to_string(), String::new());
        }
    }
    tags
}

/// Decode tag value escapes: `\:`→`;`, `\s`→space, `\\`→`\`, `\r`→CR,
/// `\n`→LF. A trailing lone backslash is dropped; an unknown escape
/// keeps the escaped character and drops the backslash.
pub fn unescape_tag_value(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => result.push(';'),
            Some('s') => result.push(' '),
            Some('\\') => result.push('\\'),
            Some('r') => result.push('\r'),
            Some('n') => result.push('\n'),
            Some(other) => result.push(other),
            None => break,
        }
    }
    result
}

/// Encode a tag value for the wire; inverse of [`unescape_tag_value`].
pub fn escape_tag_value(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            ';' => result.push_str("\\:"),
            ' ' => result.push_str("\\s"),
            '\\' => result.push_str("\\\\"),
            '\r' => result.push_str("\\r"),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}
