//! Cached vote state and snapshots.
//!
//! A live vote is one JSON blob in the cache, keyed by vote id. The blob is
//! rewritten atomically by server-side scripts; this module owns its schema,
//! the conversion from durable rows, and the snapshot/fold projections.

use chrono::{DateTime, Utc};
use quillstream_common::ActorId;
use quillstream_db::entities::{user_vote, vote_entry, vote_info};
use quillstream_db::repositories::{EntryFold, VoteFold, VoterRef};
use serde::{Deserialize, Deserializer, Serialize};

/// One option of a live vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionState {
    pub option_id: i64,
    pub text: String,
    #[serde(default)]
    pub killed: bool,
    #[serde(default)]
    pub killed_text: Option<String>,
    /// Voter keys (`user:{id}` / `anon:{hash}`) holding this option.
    #[serde(default, deserialize_with = "vec_or_empty_map")]
    pub voters: Vec<String>,
}

/// The full cached state of a live vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteState {
    pub vote_id: i64,
    pub channel_id: i64,
    pub question: String,
    pub multivote: bool,
    pub writein_allowed: bool,
    pub votes_hidden: bool,
    #[serde(default)]
    pub close_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "vec_or_empty_map")]
    pub options: Vec<OptionState>,
}

/// The cache scripts run through Redis' embedded cjson, which encodes an
/// empty Lua table as `{}`. Accept that spelling for list fields.
fn vec_or_empty_map<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw<T> {
        List(Vec<T>),
        Map(serde_json::Map<String, serde_json::Value>),
    }

    match Raw::<T>::deserialize(deserializer)? {
        Raw::List(list) => Ok(list),
        Raw::Map(map) if map.is_empty() => Ok(Vec::new()),
        Raw::Map(_) => Err(serde::de::Error::custom("expected a JSON list")),
    }
}

/// Result of a cast operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CastOutcome {
    /// Whether any vote state changed (a duplicate cast reports `false`).
    pub changed: bool,
    /// The option the voter was moved away from, when single-vote mode
    /// retracted a prior choice.
    pub retracted_from: Option<i64>,
}

/// Partial update of live vote configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoteConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multivote: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writein_allowed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub votes_hidden: Option<bool>,
    /// `None` = unchanged, `Some(None)` = clear the schedule,
    /// `Some(Some(t))` = close at `t`.
    #[serde(default, deserialize_with = "present_or_absent")]
    pub close_time: Option<Option<DateTime<Utc>>>,
}

/// Distinguishes an absent field (unchanged) from an explicit `null` (clear).
fn present_or_absent<'de, D>(
    deserializer: D,
) -> Result<Option<Option<DateTime<Utc>>>, D::Error>
where
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

impl VoteConfigUpdate {
    /// Whether the update changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.multivote.is_none()
            && self.writein_allowed.is_none()
            && self.votes_hidden.is_none()
            && self.close_time.is_none()
    }
}

/// Populated view of a vote, built for broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSnapshot {
    pub vote_id: i64,
    pub channel_id: i64,
    pub question: String,
    pub multivote: bool,
    pub writein_allowed: bool,
    pub votes_hidden: bool,
    pub close_time: Option<DateTime<Utc>>,
    pub options: Vec<OptionSnapshot>,
}

/// Populated view of one option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSnapshot {
    pub option_id: i64,
    pub text: String,
    pub killed: bool,
    pub killed_text: Option<String>,
    /// Omitted when the vote hides tallies and the viewer is not privileged.
    pub vote_count: Option<usize>,
    /// Whether the viewing actor holds this option; absent without a viewer.
    pub voted: Option<bool>,
}

impl VoteState {
    /// Build cache state from the durable rows of a vote.
    #[must_use]
    pub fn from_models(
        info: &vote_info::Model,
        entries: &[vote_entry::Model],
        votes: &[user_vote::Model],
    ) -> Self {
        let options = entries
            .iter()
            .map(|entry| {
                let voters = votes
                    .iter()
                    .filter(|v| v.entry_id == entry.id)
                    .map(|v| match (v.user_id, v.anon_id.as_ref()) {
                        (Some(id), _) => ActorId::registered(id).as_key(),
                        (None, Some(hash)) => ActorId::anonymous(hash.clone()).as_key(),
                        (None, None) => String::new(),
                    })
                    .filter(|k| !k.is_empty())
                    .collect();
                OptionState {
                    option_id: entry.id,
                    text: entry.vote_text.clone(),
                    killed: entry.killed,
                    killed_text: entry.killed_text.clone(),
                    voters,
                }
            })
            .collect();

        Self {
            vote_id: info.id,
            channel_id: info.channel_id,
            question: info.vote_question.clone(),
            multivote: info.multivote,
            writein_allowed: info.writein_allowed,
            votes_hidden: info.votes_hidden,
            close_time: info.time_closed.map(Into::into),
            options,
        }
    }

    /// Look up an option by id.
    #[must_use]
    pub fn option(&self, option_id: i64) -> Option<&OptionState> {
        self.options.iter().find(|o| o.option_id == option_id)
    }

    /// Build the broadcast view.
    ///
    /// Counts are included unless the vote hides tallies and the caller is
    /// not privileged (the story author's variant). With a viewer, each
    /// option reports whether that actor holds it.
    #[must_use]
    pub fn snapshot(&self, viewer: Option<&ActorId>, privileged: bool) -> VoteSnapshot {
        let show_counts = !self.votes_hidden || privileged;
        let viewer_key = viewer.map(ActorId::as_key);

        let options = self
            .options
            .iter()
            .map(|opt| OptionSnapshot {
                option_id: opt.option_id,
                text: opt.text.clone(),
                killed: opt.killed,
                killed_text: opt.killed_text.clone(),
                vote_count: show_counts.then(|| opt.voters.len()),
                voted: viewer_key
                    .as_ref()
                    .map(|key| opt.voters.iter().any(|v| v == key)),
            })
            .collect();

        VoteSnapshot {
            vote_id: self.vote_id,
            channel_id: self.channel_id,
            question: self.question.clone(),
            multivote: self.multivote,
            writein_allowed: self.writein_allowed,
            votes_hidden: self.votes_hidden,
            close_time: self.close_time,
            options,
        }
    }

    /// Project this state into the durable closing fold.
    ///
    /// `time_closed = None` leaves the stored close timestamp untouched
    /// (shutdown-only closure).
    #[must_use]
    pub fn fold(&self, time_closed: Option<DateTime<Utc>>) -> VoteFold {
        let entries = self
            .options
            .iter()
            .map(|opt| {
                let voters = opt
                    .voters
                    .iter()
                    .filter_map(|key| match ActorId::from_key(key) {
                        Some(actor) => Some(VoterRef {
                            user_id: actor.registered_id(),
                            anon_id: actor.anon_hash().map(ToString::to_string),
                        }),
                        None => {
                            tracing::warn!(key, vote_id = self.vote_id, "Unparseable voter key");
                            None
                        }
                    })
                    .collect();
                EntryFold {
                    entry_id: opt.option_id,
                    killed: opt.killed,
                    killed_text: opt.killed_text.clone(),
                    voters,
                }
            })
            .collect();

        VoteFold {
            vote_id: self.vote_id,
            multivote: self.multivote,
            writein_allowed: self.writein_allowed,
            votes_hidden: self.votes_hidden,
            time_closed,
            entries,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn state() -> VoteState {
        VoteState {
            vote_id: 1,
            channel_id: 7,
            question: "Where next?".to_string(),
            multivote: false,
            writein_allowed: true,
            votes_hidden: false,
            close_time: None,
            options: vec![
                OptionState {
                    option_id: 11,
                    text: "The forest".to_string(),
                    killed: false,
                    killed_text: None,
                    voters: vec!["user:1".to_string(), "anon:ff".to_string()],
                },
                OptionState {
                    option_id: 12,
                    text: "The city".to_string(),
                    killed: true,
                    killed_text: Some("vetoed".to_string()),
                    voters: vec![],
                },
            ],
        }
    }

    #[test]
    fn test_snapshot_counts_and_viewer() {
        let viewer = ActorId::registered(1);
        let snap = state().snapshot(Some(&viewer), false);

        assert_eq!(snap.options[0].vote_count, Some(2));
        assert_eq!(snap.options[0].voted, Some(true));
        assert_eq!(snap.options[1].vote_count, Some(0));
        assert_eq!(snap.options[1].voted, Some(false));
        assert!(snap.options[1].killed);
    }

    #[test]
    fn test_snapshot_hides_counts_when_hidden() {
        let mut s = state();
        s.votes_hidden = true;

        let public = s.snapshot(None, false);
        assert_eq!(public.options[0].vote_count, None);
        assert_eq!(public.options[0].voted, None);

        // The author's privileged variant still carries counts.
        let privileged = s.snapshot(None, true);
        assert_eq!(privileged.options[0].vote_count, Some(2));
    }

    #[test]
    fn test_blob_round_trip() {
        let s = state();
        let json = serde_json::to_string(&s).unwrap();
        let back: VoteState = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }

    #[test]
    fn test_blob_accepts_cjson_empty_tables() {
        // Redis cjson spells an empty list as {}.
        let json = r#"{
            "vote_id": 3, "channel_id": 9, "question": "q",
            "multivote": true, "writein_allowed": false, "votes_hidden": false,
            "options": [
                {"option_id": 1, "text": "a", "killed": false, "voters": {}}
            ]
        }"#;
        let state: VoteState = serde_json::from_str(json).unwrap();
        assert!(state.options[0].voters.is_empty());
        assert_eq!(state.close_time, None);
    }

    #[test]
    fn test_fold_maps_voter_keys() {
        let fold = state().fold(None);
        assert_eq!(fold.vote_id, 1);
        assert!(fold.time_closed.is_none());

        let voters = &fold.entries[0].voters;
        assert_eq!(voters.len(), 2);
        assert_eq!(voters[0].user_id, Some(1));
        assert_eq!(voters[0].anon_id, None);
        assert_eq!(voters[1].user_id, None);
        assert_eq!(voters[1].anon_id.as_deref(), Some("ff"));
        assert!(fold.entries[1].killed);
    }

    #[test]
    fn test_config_update_close_time_forms() {
        let unchanged: VoteConfigUpdate = serde_json::from_str(r#"{"multivote": true}"#).unwrap();
        assert_eq!(unchanged.close_time, None);
        assert!(!unchanged.is_empty());

        let cleared: VoteConfigUpdate = serde_json::from_str(r#"{"close_time": null}"#).unwrap();
        assert_eq!(cleared.close_time, Some(None));

        let set: VoteConfigUpdate =
            serde_json::from_str(r#"{"close_time": "2026-08-05T12:00:00Z"}"#).unwrap();
        assert!(matches!(set.close_time, Some(Some(_))));
    }
}
