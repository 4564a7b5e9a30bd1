//! Wire frames for the PubSub WebSocket protocol.
//!
//! Every frame is one JSON object with a `type` discriminator. Request
//! frames carry a client-chosen nonce that the server echoes back in its
//! `RESPONSE`, which is the only way to correlate outcomes with requests.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    #[serde(rename = "LISTEN")]
    Listen { nonce: String, data: SubscribeData },

    #[serde(rename = "UNLISTEN")]
    Unlisten { nonce: String, data: SubscribeData },

    /// Outcome of a LISTEN/UNLISTEN. An empty `error` means success.
    #[serde(rename = "RESPONSE")]
    Response {
        #[serde(default)]
        nonce: Option<String>,
        #[serde(default)]
        error: String,
    },

    /// A payload published on a topic we listen to.
    #[serde(rename = "MESSAGE")]
    Message { data: MessageData },

    #[serde(rename = "PING")]
    Ping,

    #[serde(rename = "PONG")]
    Pong,

    /// Server asks us to drop the socket and reconnect.
    #[serde(rename = "RECONNECT")]
    Reconnect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeData {
    pub topics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageData {
    pub topic: String,
    /// The payload, itself JSON-encoded as a string on the wire.
    pub message: String,
}

impl Frame {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_serializes_with_nonce_and_token() {
        let frame = Frame::Listen {
            nonce: "n1".into(),
            data: SubscribeData {
                topics: vec!["shoutouts.123".into()],
                auth_token: Some("tok".into()),
            },
        };
        let json = frame.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "LISTEN");
        assert_eq!(value["nonce"], "n1");
        assert_eq!(value["data"]["topics"][0], "shoutouts.123");
        assert_eq!(value["data"]["auth_token"], "tok");
    }

    #[test]
    fn listen_omits_absent_token() {
        let frame = Frame::Listen {
            nonce: "n1".into(),
            data: SubscribeData {
                topics: vec!["t".into()],
                auth_token: None,
            },
        };
        let json = frame.to_json().unwrap();
        assert!(!json.contains("auth_token"));
    }

    #[test]
    fn response_parses_with_and_without_error() {
        let ok = Frame::from_json(r#"{"type":"RESPONSE","nonce":"n1","error":""}"#).unwrap();
        assert_eq!(
            ok,
            Frame::Response {
                nonce: Some("n1".into()),
                error: String::new()
            }
        );

        let bad = Frame::from_json(r#"{"type":"RESPONSE","nonce":"n2","error":"ERR_BADAUTH"}"#)
            .unwrap();
        assert_eq!(
            bad,
            Frame::Response {
                nonce: Some("n2".into()),
                error: "ERR_BADAUTH".into()
            }
        );
    }

    #[test]
    fn message_parses_nested_string_payload() {
        let frame = Frame::from_json(
            r#"{"type":"MESSAGE","data":{"topic":"shoutouts.123","message":"{\"type\":\"create\"}"}}"#,
        )
        .unwrap();
        match frame {
            Frame::Message { data } => {
                assert_eq!(data.topic, "shoutouts.123");
                let inner: serde_json::Value = serde_json::from_str(&data.message).unwrap();
                assert_eq!(inner["type"], "create");
            }
            other => panic!("expected MESSAGE, got {other:?}"),
        }
    }

    #[test]
    fn control_frames_round_trip() {
        for frame in [Frame::Ping, Frame::Pong, Frame::Reconnect] {
            let json = frame.to_json().unwrap();
            assert_eq!(Frame::from_json(&json).unwrap(), frame);
        }
    }
}
