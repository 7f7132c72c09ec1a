//! Channel authorization.

use std::collections::HashMap;

use quillstream_common::{ActorId, AppResult};
use quillstream_db::repositories::ChannelRepository;
use tokio::sync::RwLock;

/// Authorization checks for channel access and vote administration.
///
/// Join decisions are memoized per (actor, channel) pair; channel
/// visibility and story authorship are immutable enough that a process-local
/// memo is safe for a connection's lifetime.
pub struct ChannelGuard {
    channels: ChannelRepository,
    join_cache: RwLock<HashMap<(String, i64), bool>>,
}

impl ChannelGuard {
    /// Create a new guard.
    #[must_use]
    pub fn new(channels: ChannelRepository) -> Self {
        Self {
            channels,
            join_cache: RwLock::new(HashMap::new()),
        }
    }

    /// The author of the story owning the channel, if any.
    pub async fn story_author(&self, channel_id: i64) -> AppResult<Option<i64>> {
        self.channels.story_author(channel_id).await
    }

    /// Whether this actor is the author of the story owning the channel.
    pub async fn is_author(&self, actor: &ActorId, channel_id: i64) -> AppResult<bool> {
        let Some(user_id) = actor.registered_id() else {
            return Ok(false);
        };
        let author = self.channels.story_author(channel_id).await?;
        Ok(author == Some(user_id))
    }

    /// Whether this actor may read/join the channel.
    ///
    /// Public channels are open to everyone; private channels admit only the
    /// story's author.
    pub async fn may_join(&self, actor: &ActorId, channel_id: i64) -> AppResult<bool> {
        let cache_key = (actor.as_key(), channel_id);
        if let Some(&allowed) = self.join_cache.read().await.get(&cache_key) {
            return Ok(allowed);
        }

        let channel = self.channels.get_by_id(channel_id).await?;
        let allowed = if channel.private {
            self.is_author(actor, channel_id).await?
        } else {
            true
        };

        self.join_cache.write().await.insert(cache_key, allowed);
        Ok(allowed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use quillstream_db::entities::{channel, story};
    use sea_orm::{DatabaseBackend, MockDatabase};
    use std::sync::Arc;

    fn channel_row(id: i64, private: bool) -> channel::Model {
        channel::Model { id, private }
    }

    fn story_row(author_id: i64, channel_id: i64) -> story::Model {
        story::Model {
            id: 1,
            title: "t".to_string(),
            description: String::new(),
            author_id,
            channel_id,
        }
    }

    #[tokio::test]
    async fn test_public_channel_admits_anyone() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![channel_row(3, false)]])
            .into_connection();
        let guard = ChannelGuard::new(ChannelRepository::new(Arc::new(db)));

        let anon = ActorId::anonymous("ff".into());
        assert!(guard.may_join(&anon, 3).await.unwrap());
    }

    #[tokio::test]
    async fn test_private_channel_admits_only_author() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![channel_row(3, true)]])
            .append_query_results([vec![story_row(42, 3)]])
            .append_query_results([vec![channel_row(3, true)]])
            .append_query_results([vec![story_row(42, 3)]])
            .into_connection();
        let guard = ChannelGuard::new(ChannelRepository::new(Arc::new(db)));

        let author = ActorId::registered(42);
        assert!(guard.may_join(&author, 3).await.unwrap());

        let other = ActorId::registered(7);
        assert!(!guard.may_join(&other, 3).await.unwrap());
    }

    #[tokio::test]
    async fn test_join_decision_is_cached_per_actor() {
        // Only one channel query is queued; the second may_join for the same
        // actor must come from the memo.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![channel_row(3, false)]])
            .into_connection();
        let guard = ChannelGuard::new(ChannelRepository::new(Arc::new(db)));

        let actor = ActorId::registered(1);
        assert!(guard.may_join(&actor, 3).await.unwrap());
        assert!(guard.may_join(&actor, 3).await.unwrap());
    }

    #[tokio::test]
    async fn test_anonymous_actor_is_never_author() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let guard = ChannelGuard::new(ChannelRepository::new(Arc::new(db)));

        let anon = ActorId::anonymous("ff".into());
        assert!(!guard.is_author(&anon, 3).await.unwrap());
    }
}
