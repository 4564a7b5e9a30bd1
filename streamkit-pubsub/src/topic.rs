//! Topic names.
//!
//! A topic is a dotted path: a name followed by scope arguments, usually
//! platform ids (`shoutouts.123456`). Authorization is per topic and is
//! checked server-side against the token supplied with the LISTEN.

use std::fmt;

/// A subscribable topic: name plus scope arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    name: String,
    args: Vec<String>,
}

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Shoutout events in a channel, scoped by broadcaster id.
    pub fn shoutouts(channel_id: impl Into<String>) -> Self {
        Self::new("shoutouts").arg(channel_id)
    }

    /// The dotted wire form (`name.arg1.arg2`).
    pub fn render(&self) -> String {
        let mut out = self.name.clone();
        for arg in &self.args {
            out.push('.');
            out.push_str(arg);
        }
        out
    }

    /// Parse a dotted wire form back into name + args.
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.split('.');
        let name = parts.next().unwrap_or_default().to_string();
        Self {
            name,
            args: parts.map(str::to_string).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_dotted_form() {
        let topic = Topic::new("channel-points").arg("123").arg("v1");
        assert_eq!(topic.render(), "channel-points.123.v1");
    }

    #[test]
    fn parse_inverts_render() {
        let topic = Topic::shoutouts("987654");
        assert_eq!(Topic::parse(&topic.render()), topic);
        assert_eq!(topic.name(), "shoutouts");
        assert_eq!(topic.args(), ["987654"]);
    }

    #[test]
    fn bare_name_has_no_args() {
        let topic = Topic::parse("global");
        assert_eq!(topic.name(), "global");
        assert!(topic.args().is_empty());
    }
}
