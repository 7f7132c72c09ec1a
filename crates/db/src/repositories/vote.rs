//! Vote repository.

use std::sync::Arc;

use crate::entities::{UserVote, VoteEntry, VoteInfo, user_vote, vote_entry, vote_info};
use chrono::{DateTime, Utc};
use quillstream_common::{AppError, AppResult};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};

/// A voter reference in durable form: exactly one side is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoterRef {
    pub user_id: Option<i64>,
    pub anon_id: Option<String>,
}

/// Final state of one option, folded back from the cache at close.
#[derive(Debug, Clone)]
pub struct EntryFold {
    pub entry_id: i64,
    pub killed: bool,
    pub killed_text: Option<String>,
    pub voters: Vec<VoterRef>,
}

/// Full closing fold of a vote: configuration plus per-option tallies.
#[derive(Debug, Clone)]
pub struct VoteFold {
    pub vote_id: i64,
    pub multivote: bool,
    pub writein_allowed: bool,
    pub votes_hidden: bool,
    /// New close timestamp; `None` leaves the stored value untouched
    /// (shutdown-only closures preserve a scheduled close time).
    pub time_closed: Option<DateTime<Utc>>,
    pub entries: Vec<EntryFold>,
}

/// Repository for vote operations.
#[derive(Clone)]
pub struct VoteRepository {
    db: Arc<DatabaseConnection>,
}

impl VoteRepository {
    /// Create a new vote repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a vote by ID.
    pub async fn find_by_id(&self, id: i64) -> AppResult<Option<vote_info::Model>> {
        VoteInfo::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a vote by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: i64) -> AppResult<vote_info::Model> {
        self.find_by_id(id).await?.ok_or(AppError::VoteNotFound(id))
    }

    /// All options of a vote, in insertion order.
    pub async fn entries(&self, vote_id: i64) -> AppResult<Vec<vote_entry::Model>> {
        VoteEntry::find()
            .filter(vote_entry::Column::VoteId.eq(vote_id))
            .order_by_asc(vote_entry::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All cast votes for the given options.
    pub async fn user_votes(&self, entry_ids: &[i64]) -> AppResult<Vec<user_vote::Model>> {
        if entry_ids.is_empty() {
            return Ok(Vec::new());
        }
        UserVote::find()
            .filter(user_vote::Column::EntryId.is_in(entry_ids.iter().copied()))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Votes that are open: close time null or still in the future.
    ///
    /// Used by startup repopulation to rebuild cache state.
    pub async fn find_open(&self, now: DateTime<Utc>) -> AppResult<Vec<vote_info::Model>> {
        VoteInfo::find()
            .filter(
                Condition::any()
                    .add(vote_info::Column::TimeClosed.is_null())
                    .add(vote_info::Column::TimeClosed.gt(now)),
            )
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Insert a new option row, returning it with its stable id.
    ///
    /// Write-in options go through here before cache registration so the
    /// option id is assigned by the durable store.
    pub async fn create_entry(&self, vote_id: i64, text: &str) -> AppResult<vote_entry::Model> {
        let model = vote_entry::ActiveModel {
            vote_id: Set(vote_id),
            vote_text: Set(text.to_string()),
            killed: Set(false),
            killed_text: Set(None),
            ..Default::default()
        };
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete an option row.
    ///
    /// Compensating rollback for a write-in whose cache registration was
    /// rejected after the durable insert.
    pub async fn delete_entry(&self, entry_id: i64) -> AppResult<()> {
        VoteEntry::delete_by_id(entry_id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Update the durable close timestamp mirror.
    pub async fn set_time_closed(
        &self,
        vote_id: i64,
        time_closed: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        VoteInfo::update_many()
            .col_expr(
                vote_info::Column::TimeClosed,
                Expr::value(time_closed.map(sea_orm::prelude::DateTimeWithTimeZone::from)),
            )
            .filter(vote_info::Column::Id.eq(vote_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Fold the closing state of a vote into the durable store.
    ///
    /// Replaces all existing `UserVote` rows for the vote's options with the
    /// cache-side tallies, updates killed flags and configuration, and sets
    /// the close timestamp when one is given. Runs in a single transaction.
    pub async fn fold_closed(&self, fold: VoteFold) -> AppResult<()> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let mut update = VoteInfo::update_many()
            .col_expr(vote_info::Column::Multivote, Expr::value(fold.multivote))
            .col_expr(
                vote_info::Column::WriteinAllowed,
                Expr::value(fold.writein_allowed),
            )
            .col_expr(
                vote_info::Column::VotesHidden,
                Expr::value(fold.votes_hidden),
            );
        if let Some(closed) = fold.time_closed {
            update = update.col_expr(
                vote_info::Column::TimeClosed,
                Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(closed)),
            );
        }
        update
            .filter(vote_info::Column::Id.eq(fold.vote_id))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let entry_ids: Vec<i64> = fold.entries.iter().map(|e| e.entry_id).collect();

        for entry in &fold.entries {
            VoteEntry::update_many()
                .col_expr(vote_entry::Column::Killed, Expr::value(entry.killed))
                .col_expr(
                    vote_entry::Column::KilledText,
                    Expr::value(entry.killed_text.clone()),
                )
                .filter(vote_entry::Column::Id.eq(entry.entry_id))
                .exec(&txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }

        if !entry_ids.is_empty() {
            UserVote::delete_many()
                .filter(user_vote::Column::EntryId.is_in(entry_ids))
                .exec(&txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }

        let rows: Vec<user_vote::ActiveModel> = fold
            .entries
            .iter()
            .flat_map(|entry| {
                entry.voters.iter().map(move |voter| user_vote::ActiveModel {
                    entry_id: Set(entry.entry_id),
                    user_id: Set(voter.user_id),
                    anon_id: Set(voter.anon_id.clone()),
                    ..Default::default()
                })
            })
            .collect();

        if !rows.is_empty() {
            UserVote::insert_many(rows)
                .on_conflict(
                    OnConflict::columns([
                        user_vote::Column::EntryId,
                        user_vote::Column::UserId,
                        user_vote::Column::AnonId,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .exec_without_returning(&txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
