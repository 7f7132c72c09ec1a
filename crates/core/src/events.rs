//! Fanout message variants.
//!
//! Everything published through the fanout router is one of these tagged
//! variants with a fixed field schema, dispatched on the `type` tag.

use serde::{Deserialize, Serialize};

use crate::vote::VoteSnapshot;

/// Client-facing form of a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatBroadcast {
    pub is_anon: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Included only on moderation broadcasts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anon_id: Option<String>,
    pub text: String,
    /// Milliseconds since the epoch.
    pub date: i64,
    /// The sender's browser token, echoed so it can match its own message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    pub channel: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<i64>,
}

/// A value published through the fanout router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FanoutMessage {
    /// A chat message was posted to a channel.
    ChatPosted { message: ChatBroadcast },
    /// A cast or retraction by one voter was applied; sent to that voter's
    /// identity key.
    VoteCastAck {
        vote_id: i64,
        channel_id: i64,
        option_id: i64,
        /// `true` for a cast, `false` for a retraction.
        voted: bool,
    },
    /// A vote's rendered state, broadcast after any mutation.
    VoteRendered {
        vote_id: i64,
        channel_id: i64,
        html: String,
        vote: VoteSnapshot,
    },
    /// A vote opened or closed.
    VoteOpenChanged {
        vote_id: i64,
        channel_id: i64,
        open: bool,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tags() {
        let msg = FanoutMessage::VoteOpenChanged {
            vote_id: 1,
            channel_id: 2,
            open: false,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"vote_open_changed\""));

        let ack = FanoutMessage::VoteCastAck {
            vote_id: 1,
            channel_id: 2,
            option_id: 3,
            voted: true,
        };
        let json = serde_json::to_string(&ack).unwrap();
        assert!(json.contains("\"type\":\"vote_cast_ack\""));

        let parsed: FanoutMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, FanoutMessage::VoteCastAck { voted: true, .. }));
    }

    #[test]
    fn test_chat_posted_round_trip() {
        let msg = FanoutMessage::ChatPosted {
            message: ChatBroadcast {
                is_anon: false,
                username: Some("alice".to_string()),
                anon_id: None,
                text: "onward".to_string(),
                date: 1_700_000_000_000,
                id_token: Some("btok".to_string()),
                channel: 4,
                thread_id: None,
            },
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"chat_posted\""));
        // Absent optionals stay off the wire.
        assert!(!json.contains("anon_id"));

        let parsed: FanoutMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }
}
