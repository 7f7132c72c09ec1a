//! Anonymous address audit repository.

use std::sync::Arc;

use crate::entities::{AddressIdentifier, address_identifier};
use quillstream_common::{AppError, AppResult};
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, Set};

/// Repository for anonymous address identifiers.
#[derive(Clone)]
pub struct AddressRepository {
    db: Arc<DatabaseConnection>,
}

impl AddressRepository {
    /// Create a new address repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Bulk-insert `(hash, ip)` pairs, ignoring hashes already recorded.
    pub async fn insert_ignoring_duplicates(
        &self,
        pairs: Vec<(String, String)>,
    ) -> AppResult<u64> {
        if pairs.is_empty() {
            return Ok(0);
        }
        let models: Vec<address_identifier::ActiveModel> = pairs
            .into_iter()
            .map(|(hash, ip)| address_identifier::ActiveModel {
                hash: Set(hash),
                ip: Set(ip),
            })
            .collect();
        AddressIdentifier::insert_many(models)
            .on_conflict(
                OnConflict::column(address_identifier::Column::Hash)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
