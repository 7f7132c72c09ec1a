//! Cast vote entity.
//!
//! One row per (option, voter). Exactly one of `user_id`/`anon_id` is set.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_votes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(indexed)]
    pub entry_id: i64,

    #[sea_orm(nullable)]
    pub user_id: Option<i64>,

    #[sea_orm(nullable)]
    pub anon_id: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::vote_entry::Entity",
        from = "Column::EntryId",
        to = "super::vote_entry::Column::Id"
    )]
    Entry,
}

impl Related<super::vote_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Entry.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
