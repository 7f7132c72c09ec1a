//! Chat message repository.

use std::sync::Arc;

use crate::entities::{ChatMessage, chat_message};
use quillstream_common::{AppError, AppResult};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect,
};

/// Repository for chat message operations.
#[derive(Clone)]
pub struct ChatMessageRepository {
    db: Arc<DatabaseConnection>,
}

impl ChatMessageRepository {
    /// Create a new chat message repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a message by ID.
    pub async fn find_by_id(&self, id: i64) -> AppResult<Option<chat_message::Model>> {
        ChatMessage::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Whether `id` names a message that can serve as a thread root.
    ///
    /// A root must exist and must not itself be a reply (threads never nest).
    pub async fn is_thread_root(&self, id: i64) -> AppResult<bool> {
        let msg = self.find_by_id(id).await?;
        Ok(msg.is_some_and(|m| m.thread_id.is_none()))
    }

    /// Insert a single message, enforcing the thread-root invariant.
    pub async fn insert_checked(
        &self,
        model: chat_message::ActiveModel,
    ) -> AppResult<chat_message::Model> {
        if let sea_orm::ActiveValue::Set(Some(root_id)) = &model.thread_id
            && !self.is_thread_root(*root_id).await?
        {
            return Err(AppError::Validation(format!(
                "thread reference {root_id} does not name a top-level message"
            )));
        }
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Bulk-insert messages, silently skipping rows whose idempotency token
    /// is already stored.
    ///
    /// Used by the flush worker: a still-buffered message persisted in a
    /// previous cycle conflicts on `id_token` and is dropped by the store
    /// rather than surfacing a constraint violation.
    pub async fn insert_ignoring_duplicates(
        &self,
        models: Vec<chat_message::ActiveModel>,
    ) -> AppResult<u64> {
        if models.is_empty() {
            return Ok(0);
        }
        ChatMessage::insert_many(models)
            .on_conflict(
                OnConflict::column(chat_message::Column::IdToken)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// The most recent `limit` messages for a channel, oldest first.
    pub async fn recent_by_channel(
        &self,
        channel_id: i64,
        limit: u64,
    ) -> AppResult<Vec<chat_message::Model>> {
        let mut rows = ChatMessage::find()
            .filter(chat_message::Column::ChannelId.eq(channel_id))
            .order_by_desc(chat_message::Column::Date)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        rows.reverse();
        Ok(rows)
    }

    /// A thread: the root message plus every reply to it, oldest first.
    pub async fn thread(
        &self,
        channel_id: i64,
        root_id: i64,
    ) -> AppResult<Vec<chat_message::Model>> {
        ChatMessage::find()
            .filter(chat_message::Column::ChannelId.eq(channel_id))
            .filter(
                Condition::any()
                    .add(chat_message::Column::Id.eq(root_id))
                    .add(chat_message::Column::ThreadId.eq(root_id)),
            )
            .order_by_asc(chat_message::Column::Date)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, Set};

    fn message(id: i64, thread_id: Option<i64>) -> chat_message::Model {
        chat_message::Model {
            id,
            id_token: format!("tok-{id}"),
            channel_id: 1,
            user_id: Some(10),
            anon_id: None,
            date: Utc::now().into(),
            text: "hello".to_string(),
            thread_id,
        }
    }

    #[tokio::test]
    async fn test_insert_checked_rejects_nested_thread() {
        // The would-be root is itself a reply, so the write must fail.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![message(5, Some(1))]])
            .into_connection();
        let repo = ChatMessageRepository::new(Arc::new(db));

        let model = chat_message::ActiveModel {
            id_token: Set("tok-new".to_string()),
            channel_id: Set(1),
            user_id: Set(Some(10)),
            anon_id: Set(None),
            date: Set(Utc::now().into()),
            text: Set("reply".to_string()),
            thread_id: Set(Some(5)),
            ..Default::default()
        };

        let err = repo.insert_checked(model).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_insert_checked_rejects_missing_root() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<chat_message::Model>::new()])
            .into_connection();
        let repo = ChatMessageRepository::new(Arc::new(db));

        let model = chat_message::ActiveModel {
            id_token: Set("tok-new".to_string()),
            channel_id: Set(1),
            user_id: Set(Some(10)),
            anon_id: Set(None),
            date: Set(Utc::now().into()),
            text: Set("reply".to_string()),
            thread_id: Set(Some(999)),
            ..Default::default()
        };

        let err = repo.insert_checked(model).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_insert_ignoring_duplicates_empty_is_noop() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let repo = ChatMessageRepository::new(Arc::new(db));
        assert_eq!(repo.insert_ignoring_duplicates(vec![]).await.unwrap(), 0);
    }
}
