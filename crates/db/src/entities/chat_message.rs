//! Chat message entity.
//!
//! Exactly one of `user_id`/`anon_id` is set; the repository rejects writes
//! violating this. `thread_id` may only reference a message whose own
//! `thread_id` is null (threads never nest).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "chat_messages")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Server-generated idempotency token; unique so a re-flush of a
    /// still-buffered message is a conflict-ignored no-op.
    #[sea_orm(unique)]
    pub id_token: String,

    #[sea_orm(indexed)]
    pub channel_id: i64,

    #[sea_orm(nullable)]
    pub user_id: Option<i64>,

    #[sea_orm(nullable)]
    pub anon_id: Option<String>,

    pub date: DateTimeWithTimeZone,

    #[sea_orm(column_type = "Text")]
    pub text: String,

    /// Root message of the thread this message replies to, if any.
    #[sea_orm(nullable, indexed)]
    pub thread_id: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::channel::Entity",
        from = "Column::ChannelId",
        to = "super::channel::Column::Id"
    )]
    Channel,

    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,

    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::ThreadId",
        to = "Column::Id"
    )]
    ThreadRoot,
}

impl Related<super::channel::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Channel.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
