//! Vote option entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vote_entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(indexed)]
    pub vote_id: i64,

    pub vote_text: String,

    #[sea_orm(default_value = false)]
    pub killed: bool,

    #[sea_orm(nullable)]
    pub killed_text: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::vote_info::Entity",
        from = "Column::VoteId",
        to = "super::vote_info::Column::Id"
    )]
    Vote,

    #[sea_orm(has_many = "super::user_vote::Entity")]
    UserVotes,
}

impl Related<super::vote_info::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vote.def()
    }
}

impl Related<super::user_vote::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserVotes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
