//! Client frame schemas.
//!
//! Every incoming websocket frame is a JSON object carrying a `type` tag;
//! the remaining fields are parsed into one of these per-type structs by
//! the matching handler.

use quillstream_core::vote::VoteConfigUpdate;
use serde::Deserialize;
use validator::Validate;

/// `chat_msg`: post a chat line.
#[derive(Debug, Deserialize, Validate)]
pub struct ChatFrame {
    #[validate(length(min = 1, max = 4096))]
    pub msg: String,
    /// Client-minted token, echoed back and used for retry dedup.
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub thread_id: Option<i64>,
}

/// `backlog`: request the channel's recent messages.
#[derive(Debug, Deserialize)]
pub struct BacklogFrame {}

/// `thread`: request one thread's messages.
#[derive(Debug, Deserialize)]
pub struct ThreadFrame {
    pub thread: i64,
}

/// `cast_vote` / `retract_vote`: act on one option.
#[derive(Debug, Deserialize)]
pub struct VoteOptionFrame {
    pub vote: i64,
    pub option: i64,
}

/// `add_writein`: contribute a new option.
#[derive(Debug, Deserialize, Validate)]
pub struct WriteinFrame {
    pub vote: i64,
    #[validate(length(min = 1, max = 500))]
    pub text: String,
}

/// `kill_option`: strike or restore an option (author only).
#[derive(Debug, Deserialize)]
pub struct KillOptionFrame {
    pub vote: i64,
    pub option: i64,
    pub killed: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `set_vote_config`: partial configuration update (author only).
#[derive(Debug, Deserialize)]
pub struct VoteConfigFrame {
    pub vote: i64,
    #[serde(flatten)]
    pub update: VoteConfigUpdate,
}

/// `close_vote` / `open_vote`: lifecycle transitions (author only).
#[derive(Debug, Deserialize)]
pub struct VoteRefFrame {
    pub vote: i64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_frame_parses_with_tag_present() {
        // The dispatcher hands the whole frame over; the `type` tag is
        // simply ignored by the per-type schema.
        let frame: ChatFrame = serde_json::from_str(
            r#"{"type": "chat_msg", "msg": "hello", "id_token": "abc"}"#,
        )
        .unwrap();
        assert_eq!(frame.msg, "hello");
        assert_eq!(frame.id_token.as_deref(), Some("abc"));
        assert_eq!(frame.thread_id, None);
    }

    #[test]
    fn test_chat_frame_validation_bounds() {
        let empty: ChatFrame = serde_json::from_str(r#"{"msg": ""}"#).unwrap();
        assert!(empty.validate().is_err());

        let ok: ChatFrame = serde_json::from_str(r#"{"msg": "onward"}"#).unwrap();
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_vote_config_frame_flattens_update() {
        let frame: VoteConfigFrame = serde_json::from_str(
            r#"{"vote": 3, "multivote": false, "close_time": null}"#,
        )
        .unwrap();
        assert_eq!(frame.vote, 3);
        assert_eq!(frame.update.multivote, Some(false));
        assert_eq!(frame.update.close_time, Some(None));
        assert_eq!(frame.update.votes_hidden, None);
    }
}
