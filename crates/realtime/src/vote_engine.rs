//! Redis-backed vote lifecycle engine.
//!
//! A vote is **inactive** (no cache entry) until activated, **active**
//! while its blob exists in the cache, and inactive again once closed and
//! folded back into the durable store. All voter-set mutations run as
//! server-side scripts ([`crate::scripts`]); the channel active-set's
//! removal count arbitrates the closing race.

use std::sync::Arc;

use chrono::Utc;
use fred::clients::Client;
use fred::interfaces::{KeysInterface, LuaInterface, SetsInterface, SortedSetsInterface};
use quillstream_common::{ActorId, AppError, AppResult};
use quillstream_core::{
    CastOutcome, FanoutMessage, Renderer, VoteConfigUpdate, VoteSnapshot, VoteState,
};
use quillstream_db::repositories::VoteRepository;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::pubsub::Fanout;
use crate::{keys, scripts};

/// State machine and operations for live votes.
#[derive(Clone)]
pub struct VoteEngine {
    redis: Arc<Client>,
    votes: VoteRepository,
    fanout: Fanout,
    renderer: Arc<dyn Renderer>,
}

impl VoteEngine {
    /// Create a new vote engine.
    #[must_use]
    pub const fn new(
        redis: Arc<Client>,
        votes: VoteRepository,
        fanout: Fanout,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            redis,
            votes,
            fanout,
            renderer,
        }
    }

    /// Load a vote's live state, `None` if it is not active.
    pub async fn load(&self, vote_id: i64) -> AppResult<Option<VoteState>> {
        let raw: Option<String> = self
            .redis
            .get(keys::vote_blob(vote_id))
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;
        match raw {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|e| {
                AppError::Internal(format!("corrupt cached state for vote {vote_id}: {e}"))
            }),
        }
    }

    /// Activate a vote: load its full durable state into the cache and
    /// register it as live.
    ///
    /// Activation overwrites any existing cache entry, so running it twice
    /// (or re-running startup repopulation) yields the same state as once.
    pub async fn activate(&self, vote_id: i64) -> AppResult<VoteState> {
        let info = self.votes.get_by_id(vote_id).await?;
        let entries = self.votes.entries(vote_id).await?;
        let entry_ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
        let user_votes = self.votes.user_votes(&entry_ids).await?;
        let state = VoteState::from_models(&info, &entries, &user_votes);

        let blob =
            serde_json::to_string(&state).map_err(|e| AppError::Internal(e.to_string()))?;
        let member = keys::vote_member(state.channel_id, vote_id);

        let _: () = self
            .redis
            .set(keys::vote_blob(vote_id), blob, None, None, false)
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;
        let _: i64 = self
            .redis
            .sadd(keys::channel_votes(state.channel_id), vote_id)
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;
        let _: i64 = self
            .redis
            .sadd(keys::ACTIVE_VOTES, member.as_str())
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;

        match state.close_time {
            Some(at) => {
                let _: i64 = self
                    .redis
                    .zadd(
                        keys::VOTE_CLOSE_TIMES,
                        None,
                        None,
                        false,
                        false,
                        (at.timestamp_millis() as f64, member.as_str()),
                    )
                    .await
                    .map_err(|e| AppError::Redis(e.to_string()))?;
            }
            None => {
                let _: i64 = self
                    .redis
                    .zrem(keys::VOTE_CLOSE_TIMES, member.as_str())
                    .await
                    .map_err(|e| AppError::Redis(e.to_string()))?;
            }
        }

        info!(vote_id, channel_id = state.channel_id, "Vote activated");
        Ok(state)
    }

    /// Reopen a closed vote, clearing its durable close timestamp and
    /// re-activating cache tracking.
    pub async fn reopen(&self, vote_id: i64) -> AppResult<VoteState> {
        self.votes.set_time_closed(vote_id, None).await?;
        self.activate(vote_id).await
    }

    /// Cast a vote for an option.
    ///
    /// Atomic: on a single-choice vote the same script retracts the voter's
    /// prior option and reports it in `retracted_from`. A duplicate cast
    /// reports `changed = false`. Broadcasts rendered after a cast re-read
    /// the blob, so a rapid switch-and-back from one voter may publish
    /// coalesced tallies; this imprecision is accepted.
    pub async fn cast(
        &self,
        vote_id: i64,
        option_id: i64,
        voter: &ActorId,
    ) -> AppResult<CastOutcome> {
        let result: Vec<i64> = self
            .redis
            .eval(
                scripts::CAST,
                vec![keys::vote_blob(vote_id)],
                vec![option_id.to_string(), voter.as_key()],
            )
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;

        let status = result.first().copied().unwrap_or(-1);
        let retracted = result.get(1).copied().unwrap_or(0);
        match status {
            1 => Ok(CastOutcome {
                changed: true,
                retracted_from: (retracted != 0).then_some(retracted),
            }),
            0 => Ok(CastOutcome {
                changed: false,
                retracted_from: None,
            }),
            -1 => Err(AppError::Validation(format!(
                "vote {vote_id} is not accepting votes"
            ))),
            -2 => Err(AppError::Validation(format!(
                "vote {vote_id} has no option {option_id}"
            ))),
            -3 => Err(AppError::Validation(format!(
                "option {option_id} has been struck"
            ))),
            other => Err(AppError::Internal(format!("unexpected cast status {other}"))),
        }
    }

    /// Retract a vote from an option. `false` when the voter did not hold
    /// it.
    pub async fn retract(&self, vote_id: i64, option_id: i64, voter: &ActorId) -> AppResult<bool> {
        let status: i64 = self
            .redis
            .eval(
                scripts::RETRACT,
                vec![keys::vote_blob(vote_id)],
                vec![option_id.to_string(), voter.as_key()],
            )
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;
        match status {
            1 => Ok(true),
            0 => Ok(false),
            -1 => Err(AppError::Validation(format!(
                "vote {vote_id} is not accepting votes"
            ))),
            -2 => Err(AppError::Validation(format!(
                "vote {vote_id} has no option {option_id}"
            ))),
            other => Err(AppError::Internal(format!(
                "unexpected retract status {other}"
            ))),
        }
    }

    /// Add a write-in option and immediately cast the contributor's vote
    /// for it.
    ///
    /// The durable row is inserted first so the option carries a stable id.
    /// If the atomic cache registration is then rejected (vote closed or
    /// write-ins disabled in the interim), the row is deleted again — the
    /// one compensating rollback in the vote lifecycle.
    pub async fn add_writein(
        &self,
        vote_id: i64,
        text: &str,
        voter: &ActorId,
    ) -> AppResult<(i64, CastOutcome)> {
        let state = self.load(vote_id).await?.ok_or_else(|| {
            AppError::Validation(format!("vote {vote_id} is not accepting votes"))
        })?;
        if !state.writein_allowed {
            return Err(AppError::Validation(format!(
                "vote {vote_id} does not accept write-ins"
            )));
        }

        let entry = self.votes.create_entry(vote_id, text).await?;

        let status: i64 = self
            .redis
            .eval(
                scripts::ADD_OPTION,
                vec![keys::vote_blob(vote_id)],
                vec![entry.id.to_string(), text.to_string()],
            )
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;

        if status != 1 {
            self.votes.delete_entry(entry.id).await?;
            return Err(AppError::Conflict(format!(
                "write-in for vote {vote_id} was rejected"
            )));
        }

        let outcome = self.cast(vote_id, entry.id, voter).await?;
        Ok((entry.id, outcome))
    }

    /// Strike or restore an option.
    pub async fn set_option_killed(
        &self,
        vote_id: i64,
        option_id: i64,
        killed: bool,
        reason: Option<&str>,
    ) -> AppResult<()> {
        let status: i64 = self
            .redis
            .eval(
                scripts::KILL_OPTION,
                vec![keys::vote_blob(vote_id)],
                vec![
                    option_id.to_string(),
                    if killed { "1" } else { "0" }.to_string(),
                    reason.unwrap_or_default().to_string(),
                ],
            )
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;
        match status {
            1 => Ok(()),
            -1 => Err(AppError::Validation(format!(
                "vote {vote_id} is not accepting votes"
            ))),
            -2 => Err(AppError::Validation(format!(
                "vote {vote_id} has no option {option_id}"
            ))),
            other => Err(AppError::Internal(format!("unexpected kill status {other}"))),
        }
    }

    /// Apply a partial configuration update to a live vote.
    ///
    /// A close-time change also updates the schedule index and the durable
    /// `time_closed` mirror, so the schedule survives a crash before the
    /// closure runs.
    pub async fn set_config(&self, vote_id: i64, update: &VoteConfigUpdate) -> AppResult<()> {
        if update.is_empty() {
            return Ok(());
        }
        let state = self.load(vote_id).await?.ok_or_else(|| {
            AppError::Validation(format!("vote {vote_id} is not accepting votes"))
        })?;
        let member = keys::vote_member(state.channel_id, vote_id);

        let mut patch = serde_json::Map::new();
        if let Some(v) = update.multivote {
            patch.insert("multivote".to_string(), json!(v));
        }
        if let Some(v) = update.writein_allowed {
            patch.insert("writein_allowed".to_string(), json!(v));
        }
        if let Some(v) = update.votes_hidden {
            patch.insert("votes_hidden".to_string(), json!(v));
        }
        if let Some(close) = &update.close_time {
            patch.insert("set_close".to_string(), json!(true));
            if let Some(at) = close {
                patch.insert("close_time".to_string(), json!(at));
                patch.insert("close_ms".to_string(), json!(at.timestamp_millis()));
            }
        }
        let patch_json = serde_json::Value::Object(patch).to_string();

        let status: i64 = self
            .redis
            .eval(
                scripts::SET_CONFIG,
                vec![keys::vote_blob(vote_id), keys::VOTE_CLOSE_TIMES.to_string()],
                vec![patch_json, member],
            )
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;
        if status != 1 {
            return Err(AppError::Validation(format!(
                "vote {vote_id} is not accepting votes"
            )));
        }

        if let Some(close) = &update.close_time {
            self.votes.set_time_closed(vote_id, *close).await?;
        }
        Ok(())
    }

    /// Close a vote, folding its cache state into the durable store.
    ///
    /// Returns `false` when the vote was not active or another closer won
    /// the race — the loser performs no durable write. `set_close_time`
    /// stamps the durable close timestamp with now; a shutdown-only closure
    /// passes `false` to preserve a scheduled close time. With `notify`,
    /// the final tally and a closed notice are broadcast to the room.
    pub async fn close(&self, vote_id: i64, set_close_time: bool, notify: bool) -> AppResult<bool> {
        let Some(state) = self.load(vote_id).await? else {
            return Ok(false);
        };
        let member = keys::vote_member(state.channel_id, vote_id);

        // The removal count is the sole arbiter of the closing race:
        // exactly one closer observes 1 here.
        let removed: i64 = self
            .redis
            .srem(keys::channel_votes(state.channel_id), vote_id)
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;
        if removed == 0 {
            debug!(vote_id, "Lost the closing race, nothing to do");
            return Ok(false);
        }

        let fold = state.fold(set_close_time.then(Utc::now));
        if let Err(e) = self.votes.fold_closed(fold).await {
            // The arbiter already fired; restore the active-set entry so a
            // later closer can retry the fold.
            if let Err(restore) = self
                .redis
                .sadd::<i64, _, _>(keys::channel_votes(state.channel_id), vote_id)
                .await
            {
                warn!(vote_id, error = %restore, "Failed to restore active-set entry");
            }
            return Err(e);
        }

        let _: i64 = self
            .redis
            .del(keys::vote_blob(vote_id))
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;
        let _: i64 = self
            .redis
            .zrem(keys::VOTE_CLOSE_TIMES, member.as_str())
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;
        let _: i64 = self
            .redis
            .srem(keys::ACTIVE_VOTES, member.as_str())
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;

        if notify {
            let room = keys::room(state.channel_id);
            let snapshot = state.snapshot(None, false);
            let html = self.renderer.render_vote(&snapshot);
            self.fanout
                .publish(
                    &room,
                    &FanoutMessage::VoteRendered {
                        vote_id,
                        channel_id: state.channel_id,
                        html,
                        vote: snapshot,
                    },
                )
                .await;
            self.fanout
                .publish(
                    &room,
                    &FanoutMessage::VoteOpenChanged {
                        vote_id,
                        channel_id: state.channel_id,
                        open: false,
                    },
                )
                .await;
        }

        info!(vote_id, channel_id = state.channel_id, "Vote closed");
        Ok(true)
    }

    /// Build the populated view of a live vote.
    pub async fn render_state(
        &self,
        vote_id: i64,
        viewer: Option<&ActorId>,
        privileged: bool,
    ) -> AppResult<VoteSnapshot> {
        let state = self
            .load(vote_id)
            .await?
            .ok_or(AppError::VoteNotFound(vote_id))?;
        Ok(state.snapshot(viewer, privileged))
    }

    /// Vote ids currently active in a channel.
    pub async fn active_votes(&self, channel_id: i64) -> AppResult<Vec<i64>> {
        self.redis
            .smembers(keys::channel_votes(channel_id))
            .await
            .map_err(|e| AppError::Redis(e.to_string()))
    }

    /// Every live `(channel_id, vote_id)` pair, for the shutdown flush.
    pub async fn active_members(&self) -> AppResult<Vec<(i64, i64)>> {
        let members: Vec<String> = self
            .redis
            .smembers(keys::ACTIVE_VOTES)
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;
        Ok(members
            .iter()
            .filter_map(|m| keys::parse_vote_member(m))
            .collect())
    }

    /// Scheduled closures due at or before `now`.
    pub async fn due_closures(&self, now: chrono::DateTime<Utc>) -> AppResult<Vec<(i64, i64)>> {
        let members: Vec<String> = self
            .redis
            .zrangebyscore(keys::VOTE_CLOSE_TIMES, 0.0, now.timestamp_millis() as f64, false, None)
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;
        Ok(members
            .iter()
            .filter_map(|m| keys::parse_vote_member(m))
            .collect())
    }
}
