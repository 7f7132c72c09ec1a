//! Chat message domain type.
//!
//! Two tokens travel with a message. `browser_token` is minted by the
//! client and echoed back so the sender can match its own message; it also
//! drives cache-tier deduplication of client retries. `server_token` is
//! minted here and persisted as the durable `id_token`, deduplicating
//! cache-to-database flushes. They must stay distinct: a client replaying a
//! known server token could otherwise suppress persistence of its message
//! while still having it broadcast.

use chrono::{DateTime, Utc};
use quillstream_common::{ActorId, AppError, AppResult, IdGenerator};
use quillstream_db::entities::chat_message;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

use crate::events::ChatBroadcast;

/// A chat line, in the form held in the cache ring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Server-generated idempotency token (durable `id_token`).
    pub server_token: String,
    /// Client-generated token, echoed back to the sender; never persisted.
    #[serde(default)]
    pub browser_token: Option<String>,
    pub channel_id: i64,
    pub author: ActorId,
    /// Display name for registered authors.
    #[serde(default)]
    pub user_name: Option<String>,
    pub text: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub thread_id: Option<i64>,
}

impl ChatMessage {
    /// Create a fresh message, minting its server token.
    #[must_use]
    pub fn new(
        text: String,
        browser_token: Option<String>,
        channel_id: i64,
        author: ActorId,
        user_name: Option<String>,
        thread_id: Option<i64>,
    ) -> Self {
        Self {
            server_token: IdGenerator::new().generate_token(),
            browser_token,
            channel_id,
            author,
            user_name,
            text,
            date: Utc::now(),
            thread_id,
        }
    }

    /// Rebuild from a durable row.
    ///
    /// Rejects rows violating the exactly-one-author invariant.
    pub fn from_model(
        model: &chat_message::Model,
        user_name: Option<String>,
    ) -> AppResult<Self> {
        let author = match (model.user_id, model.anon_id.as_ref()) {
            (Some(id), None) => ActorId::registered(id),
            (None, Some(hash)) => ActorId::anonymous(hash.clone()),
            _ => {
                return Err(AppError::Validation(format!(
                    "chat message {} must have exactly one of user_id/anon_id",
                    model.id
                )));
            }
        };
        Ok(Self {
            server_token: model.id_token.clone(),
            browser_token: None,
            channel_id: model.channel_id,
            author,
            user_name,
            text: model.text.clone(),
            date: model.date.into(),
            thread_id: model.thread_id,
        })
    }

    /// Convert into a durable insert.
    #[must_use]
    pub fn into_active_model(self) -> chat_message::ActiveModel {
        chat_message::ActiveModel {
            id_token: Set(self.server_token),
            channel_id: Set(self.channel_id),
            user_id: Set(self.author.registered_id()),
            anon_id: Set(self.author.anon_hash().map(ToString::to_string)),
            date: Set(self.date.into()),
            text: Set(self.text),
            thread_id: Set(self.thread_id),
            ..Default::default()
        }
    }

    /// The client-facing broadcast form.
    ///
    /// With `admin` set, the anonymous hash is included for moderation.
    #[must_use]
    pub fn to_broadcast(&self, admin: bool) -> ChatBroadcast {
        ChatBroadcast {
            is_anon: !self.author.is_registered(),
            username: self.user_name.clone(),
            anon_id: if admin {
                self.author.anon_hash().map(ToString::to_string)
            } else {
                None
            },
            text: self.text.clone(),
            date: self.date.timestamp_millis(),
            id_token: self.browser_token.clone(),
            channel: self.channel_id,
            thread_id: self.thread_id,
        }
    }
}

/// Split buffered messages into registered-author and anonymous-author sets.
///
/// The two partitions are disjoint and together cover every input message.
#[must_use]
pub fn partition_by_author(messages: Vec<ChatMessage>) -> (Vec<ChatMessage>, Vec<ChatMessage>) {
    messages
        .into_iter()
        .partition(|m| m.author.is_registered())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn msg(author: ActorId) -> ChatMessage {
        ChatMessage::new(
            "hi".to_string(),
            Some("btok".to_string()),
            4,
            author,
            None,
            None,
        )
    }

    #[test]
    fn test_new_mints_distinct_server_tokens() {
        let a = msg(ActorId::registered(1));
        let b = msg(ActorId::registered(1));
        assert_ne!(a.server_token, b.server_token);
        assert_ne!(a.server_token, "btok");
    }

    #[test]
    fn test_partition_is_disjoint_and_exhaustive() {
        let input = vec![
            msg(ActorId::registered(1)),
            msg(ActorId::anonymous("aa".into())),
            msg(ActorId::registered(2)),
            msg(ActorId::anonymous("bb".into())),
        ];
        let total = input.len();

        let (users, anons) = partition_by_author(input);
        assert_eq!(users.len() + anons.len(), total);
        assert!(users.iter().all(|m| m.author.is_registered()));
        assert!(anons.iter().all(|m| !m.author.is_registered()));
    }

    #[test]
    fn test_from_model_rejects_ambiguous_author() {
        let model = chat_message::Model {
            id: 1,
            id_token: "t".to_string(),
            channel_id: 1,
            user_id: Some(1),
            anon_id: Some("ff".to_string()),
            date: Utc::now().into(),
            text: "x".to_string(),
            thread_id: None,
        };
        assert!(matches!(
            ChatMessage::from_model(&model, None),
            Err(AppError::Validation(_))
        ));

        let neither = chat_message::Model {
            user_id: None,
            anon_id: None,
            ..model
        };
        assert!(ChatMessage::from_model(&neither, None).is_err());
    }

    #[test]
    fn test_broadcast_hides_anon_hash_unless_admin() {
        let m = msg(ActorId::anonymous("deadbeef".into()));
        assert_eq!(m.to_broadcast(false).anon_id, None);
        assert_eq!(m.to_broadcast(true).anon_id.as_deref(), Some("deadbeef"));
        assert!(m.to_broadcast(false).is_anon);
        assert_eq!(m.to_broadcast(false).id_token.as_deref(), Some("btok"));
    }

    #[test]
    fn test_ring_json_round_trip() {
        let m = msg(ActorId::registered(9));
        let json = serde_json::to_string(&m).unwrap();
        let back: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(m, back);
    }
}
