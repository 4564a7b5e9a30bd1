//! Typed payloads for known topics.
//!
//! Most topics surface raw JSON through [`crate::PubSubEvent::Message`];
//! this module holds typed decoders for the topics the SDK understands.

use serde::Deserialize;

use crate::topic::Topic;

/// A shoutout issued in a channel (`shoutouts.<channel id>` topic).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ShoutoutPayload {
    /// Payload kind (`create` for a new shoutout).
    #[serde(rename = "type")]
    pub kind: String,
    pub data: ShoutoutData,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoutoutData {
    #[serde(rename = "broadcasterUserID")]
    pub broadcaster_user_id: String,
    #[serde(rename = "targetUserID")]
    pub target_user_id: String,
    pub target_login: String,
    #[serde(rename = "sourceUserID")]
    pub source_user_id: Option<String>,
}

impl ShoutoutPayload {
    /// Decode a MESSAGE payload if its topic is a shoutouts topic.
    pub fn decode(topic: &Topic, payload: &serde_json::Value) -> Option<ShoutoutPayload> {
        if topic.name() != "shoutouts" {
            return None;
        }
        serde_json::from_value(payload.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_shoutout_create() {
        let payload: serde_json::Value = serde_json::from_str(
            r#"{
                "type": "create",
                "data": {
                    "broadcasterUserID": "111",
                    "targetUserID": "222",
                    "targetLogin": "somestreamer",
                    "sourceUserID": "333"
                }
            }"#,
        )
        .unwrap();

        let topic = Topic::shoutouts("111");
        let shoutout = ShoutoutPayload::decode(&topic, &payload).unwrap();
        assert_eq!(shoutout.kind, "create");
        assert_eq!(shoutout.data.broadcaster_user_id, "111");
        assert_eq!(shoutout.data.target_login, "somestreamer");
        assert_eq!(shoutout.data.source_user_id.as_deref(), Some("333"));
    }

    #[test]
    fn other_topics_do_not_decode() {
        let payload = serde_json::json!({"type": "create"});
        assert!(ShoutoutPayload::decode(&Topic::new("whispers"), &payload).is_none());
    }
}
