//! Vote entity.
//!
//! `time_closed` carries three states: null (open, no schedule), a future
//! timestamp (open, scheduled to close) or a past timestamp (closed).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vote_info")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(indexed)]
    pub story_id: i64,

    /// The room this vote broadcasts into.
    #[sea_orm(indexed)]
    pub channel_id: i64,

    pub vote_question: String,

    #[sea_orm(default_value = true)]
    pub multivote: bool,

    #[sea_orm(default_value = true)]
    pub writein_allowed: bool,

    #[sea_orm(default_value = false)]
    pub votes_hidden: bool,

    #[sea_orm(nullable)]
    pub time_closed: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::story::Entity",
        from = "Column::StoryId",
        to = "super::story::Column::Id"
    )]
    Story,

    #[sea_orm(has_many = "super::vote_entry::Entity")]
    Entries,
}

impl Related<super::story::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Story.def()
    }
}

impl Related<super::vote_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Entries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
