//! Per-channel chat buffer.
//!
//! Recent messages live in a bounded Redis ring per channel; a dedup zset
//! of browser tokens absorbs client retries. Persistence to the durable
//! store happens later, in the flush worker, keyed on the server token.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fred::clients::Client;
use fred::interfaces::{ListInterface, LuaInterface, SetsInterface, SortedSetsInterface};
use quillstream_common::{AppError, AppResult};
use quillstream_core::chat::{ChatMessage, partition_by_author};
use quillstream_db::repositories::{ChatMessageRepository, UserRepository};
use tracing::{debug, warn};

use crate::{keys, scripts};

/// Bounded per-channel chat ring with idempotent persistence.
#[derive(Clone)]
pub struct ChatBuffer {
    redis: Arc<Client>,
    messages: ChatMessageRepository,
    users: UserRepository,
    ring_len: usize,
    dedup_retention: Duration,
}

impl ChatBuffer {
    /// Create a new chat buffer.
    #[must_use]
    pub const fn new(
        redis: Arc<Client>,
        messages: ChatMessageRepository,
        users: UserRepository,
        ring_len: usize,
        dedup_retention: Duration,
    ) -> Self {
        Self {
            redis,
            messages,
            users,
            ring_len,
            dedup_retention,
        }
    }

    /// Append a message to its channel's ring.
    ///
    /// Returns `false` when the message's dedup token was already seen
    /// within the retention window (a client retry) — nothing changes and
    /// nothing should be broadcast. Thread references are validated here,
    /// at the write boundary: a reference to a message that is itself a
    /// reply is rejected, never silently corrected.
    pub async fn append(&self, message: &ChatMessage) -> AppResult<bool> {
        if let Some(root_id) = message.thread_id
            && !self.messages.is_thread_root(root_id).await?
        {
            return Err(AppError::Validation(format!(
                "thread reference {root_id} does not name a top-level message"
            )));
        }

        let payload =
            serde_json::to_string(message).map_err(|e| AppError::Internal(e.to_string()))?;
        // Browser token when the client sent one, otherwise the server
        // token still guards against server-side replays.
        let dedup_token = message
            .browser_token
            .clone()
            .unwrap_or_else(|| message.server_token.clone());

        let appended: i64 = self
            .redis
            .eval(
                scripts::CHAT_APPEND,
                vec![
                    keys::MESSAGES_SEEN.to_string(),
                    keys::message_ring(message.channel_id),
                    keys::ALL_CHANNELS.to_string(),
                ],
                vec![
                    dedup_token,
                    message.date.timestamp_micros().to_string(),
                    payload,
                    self.ring_len.to_string(),
                    message.channel_id.to_string(),
                ],
            )
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;

        if appended == 0 {
            debug!(channel_id = message.channel_id, "Duplicate chat message discarded");
        }
        Ok(appended == 1)
    }

    /// The most recent messages for a channel, oldest first.
    ///
    /// Merges the cache ring with durable rows not yet represented in it
    /// (matched on server token). Right after a process restart the ring is
    /// empty and the backlog comes entirely from the durable store.
    pub async fn recent(&self, channel_id: i64) -> AppResult<Vec<ChatMessage>> {
        let mut merged = self.read_ring(channel_id).await?;
        let ring_tokens: HashSet<String> =
            merged.iter().map(|m| m.server_token.clone()).collect();

        let rows = self
            .messages
            .recent_by_channel(channel_id, self.ring_len as u64)
            .await?;
        let user_ids: Vec<i64> = rows.iter().filter_map(|r| r.user_id).collect();
        let names = self.users.names_by_ids(&user_ids).await?;

        for row in rows {
            if ring_tokens.contains(&row.id_token) {
                continue;
            }
            let name = row.user_id.and_then(|id| names.get(&id).cloned());
            match ChatMessage::from_model(&row, name) {
                Ok(msg) => merged.push(msg),
                Err(e) => warn!(error = %e, "Skipping malformed chat row"),
            }
        }

        merged.sort_by_key(|m| m.date);
        if merged.len() > self.ring_len {
            let overflow = merged.len() - self.ring_len;
            merged.drain(..overflow);
        }
        Ok(merged)
    }

    /// A thread: root message plus replies, oldest first.
    pub async fn thread(&self, channel_id: i64, root_id: i64) -> AppResult<Vec<ChatMessage>> {
        let rows = self.messages.thread(channel_id, root_id).await?;
        let user_ids: Vec<i64> = rows.iter().filter_map(|r| r.user_id).collect();
        let names = self.users.names_by_ids(&user_ids).await?;

        rows.iter()
            .map(|row| {
                let name = row.user_id.and_then(|id| names.get(&id).cloned());
                ChatMessage::from_model(row, name)
            })
            .collect()
    }

    /// Flush every channel's buffered messages into the durable store.
    ///
    /// Messages are partitioned into registered-author and anonymous-author
    /// sets (disjoint, and together covering the whole buffer) and
    /// bulk-inserted with conflict-ignore on the server token, so re-flushing
    /// a still-buffered message is a no-op. Rings are trimmed to their bound
    /// afterwards — not cleared, they still serve backlog reads — and dedup
    /// tokens past the retention window are pruned.
    pub async fn flush_all(&self) -> AppResult<u64> {
        let channels: Vec<i64> = self
            .redis
            .smembers(keys::ALL_CHANNELS)
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;

        let mut buffered = Vec::new();
        for channel_id in channels {
            buffered.extend(self.read_ring(channel_id).await?);
            let _: () = self
                .redis
                .ltrim(keys::message_ring(channel_id), -(self.ring_len as i64), -1)
                .await
                .map_err(|e| AppError::Redis(e.to_string()))?;
        }

        let (user_messages, anon_messages) = partition_by_author(buffered);
        let mut stored = self
            .messages
            .insert_ignoring_duplicates(
                user_messages
                    .into_iter()
                    .map(ChatMessage::into_active_model)
                    .collect(),
            )
            .await?;
        stored += self
            .messages
            .insert_ignoring_duplicates(
                anon_messages
                    .into_iter()
                    .map(ChatMessage::into_active_model)
                    .collect(),
            )
            .await?;

        let cutoff = (Utc::now()
            - chrono::Duration::from_std(self.dedup_retention)
                .unwrap_or_else(|_| chrono::Duration::hours(1)))
        .timestamp_micros() as f64;
        let _: i64 = self
            .redis
            .zremrangebyscore(keys::MESSAGES_SEEN, 0.0, cutoff)
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;

        Ok(stored)
    }

    /// Read and parse a channel's full ring.
    async fn read_ring(&self, channel_id: i64) -> AppResult<Vec<ChatMessage>> {
        let raw: Vec<String> = self
            .redis
            .lrange(keys::message_ring(channel_id), 0, -1)
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;

        Ok(raw
            .iter()
            .filter_map(|entry| match serde_json::from_str(entry) {
                Ok(msg) => Some(msg),
                Err(e) => {
                    warn!(channel_id, error = %e, "Skipping malformed ring entry");
                    None
                }
            })
            .collect())
    }
}
