//! Anonymous address audit entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "address_identifier")]
pub struct Model {
    /// Hex-encoded SHA-256 of the client address.
    #[sea_orm(primary_key, auto_increment = false)]
    pub hash: String,

    pub ip: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
