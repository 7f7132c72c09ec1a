//! Cache key and fanout key scheme.
//!
//! The layout here is implementation-internal; nothing outside this crate
//! should construct these strings directly.

use quillstream_common::ActorId;

/// Set of channel ids with buffered chat messages awaiting flush.
pub const ALL_CHANNELS: &str = "all_channels";

/// Zset of chat dedup tokens scored by microsecond timestamp.
pub const MESSAGES_SEEN: &str = "messages_seen";

/// Set of `"{channel_id}:{vote_id}"` members for every live vote.
pub const ACTIVE_VOTES: &str = "active_votes";

/// Zset of `"{channel_id}:{vote_id}"` scored by close time in millis.
pub const VOTE_CLOSE_TIMES: &str = "vote_close_times";

/// Hash of anonymous address hashes awaiting audit flush.
pub const IP_HASHES: &str = "ip_hashes";

/// Fanout key for a channel's room.
#[must_use]
pub fn room(channel_id: i64) -> String {
    format!("chan:{channel_id}")
}

/// Fanout key private to one connection.
#[must_use]
pub fn connection(token: &str) -> String {
    format!("ws:{token}")
}

/// Fanout key for an actor's identity.
#[must_use]
pub fn identity(actor: &ActorId) -> String {
    actor.as_key()
}

/// Cache key of a channel's bounded chat ring.
#[must_use]
pub fn message_ring(channel_id: i64) -> String {
    format!("chan:{channel_id}:messages")
}

/// Cache key of a channel's active-vote set.
#[must_use]
pub fn channel_votes(channel_id: i64) -> String {
    format!("chan:{channel_id}:votes")
}

/// Cache key of a vote's serialized state blob.
#[must_use]
pub fn vote_blob(vote_id: i64) -> String {
    format!("vote:{vote_id}")
}

/// Member form used in [`ACTIVE_VOTES`] and [`VOTE_CLOSE_TIMES`].
#[must_use]
pub fn vote_member(channel_id: i64, vote_id: i64) -> String {
    format!("{channel_id}:{vote_id}")
}

/// Parse a [`vote_member`] back into `(channel_id, vote_id)`.
#[must_use]
pub fn parse_vote_member(member: &str) -> Option<(i64, i64)> {
    let (channel, vote) = member.split_once(':')?;
    Some((channel.parse().ok()?, vote.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_member_round_trip() {
        let member = vote_member(12, 34);
        assert_eq!(member, "12:34");
        assert_eq!(parse_vote_member(&member), Some((12, 34)));
        assert_eq!(parse_vote_member("garbage"), None);
        assert_eq!(parse_vote_member("1:x"), None);
    }

    #[test]
    fn test_identity_key_matches_actor_form() {
        assert_eq!(identity(&ActorId::registered(3)), "user:3");
        assert_eq!(identity(&ActorId::anonymous("ab".into())), "anon:ab");
    }
}
