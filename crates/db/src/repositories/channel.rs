//! Channel repository.

use std::sync::Arc;

use crate::entities::{Channel, Story, channel, story};
use quillstream_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};

/// Repository for channel operations.
#[derive(Clone)]
pub struct ChannelRepository {
    db: Arc<DatabaseConnection>,
}

impl ChannelRepository {
    /// Create a new channel repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a channel by ID.
    pub async fn find_by_id(&self, id: i64) -> AppResult<Option<channel::Model>> {
        Channel::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a channel by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: i64) -> AppResult<channel::Model> {
        self.find_by_id(id)
            .await?
            .ok_or(AppError::ChannelNotFound(id))
    }

    /// Create a new channel.
    pub async fn create(&self, private: bool) -> AppResult<channel::Model> {
        let model = channel::ActiveModel {
            private: Set(private),
            ..Default::default()
        };
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update a channel's visibility.
    pub async fn set_private(&self, id: i64, private: bool) -> AppResult<channel::Model> {
        let model = channel::ActiveModel {
            id: Set(id),
            private: Set(private),
        };
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// The author of the story owning this channel, if any.
    pub async fn story_author(&self, channel_id: i64) -> AppResult<Option<i64>> {
        let story = Story::find()
            .filter(story::Column::ChannelId.eq(channel_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(story.map(|s| s.author_id))
    }
}
