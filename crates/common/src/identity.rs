//! Actor identity handling.
//!
//! Every acting party is either a registered user or an anonymous visitor
//! identified by a stable hash of their client address. The string forms
//! (`user:{id}` / `anon:{hash}`) exist only at the cache-key boundary;
//! everything else passes [`ActorId`] around.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Prefix for registered-user cache keys.
const USER_PREFIX: &str = "user:";
/// Prefix for anonymous-actor cache keys.
const ANON_PREFIX: &str = "anon:";

/// Identity of an acting party: a registered user or an anonymous visitor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActorId {
    /// A registered user, by database id.
    Registered {
        /// The user's database id.
        id: i64,
    },
    /// An anonymous visitor, by address hash.
    Anonymous {
        /// Hex-encoded SHA-256 of the client address.
        hash: String,
    },
}

impl ActorId {
    /// Construct a registered actor.
    #[must_use]
    pub const fn registered(id: i64) -> Self {
        Self::Registered { id }
    }

    /// Construct an anonymous actor.
    #[must_use]
    pub const fn anonymous(hash: String) -> Self {
        Self::Anonymous { hash }
    }

    /// Whether this actor is a registered user.
    #[must_use]
    pub const fn is_registered(&self) -> bool {
        matches!(self, Self::Registered { .. })
    }

    /// The registered user id, if any.
    #[must_use]
    pub const fn registered_id(&self) -> Option<i64> {
        match self {
            Self::Registered { id } => Some(*id),
            Self::Anonymous { .. } => None,
        }
    }

    /// The anonymous hash, if any.
    #[must_use]
    pub fn anon_hash(&self) -> Option<&str> {
        match self {
            Self::Registered { .. } => None,
            Self::Anonymous { hash } => Some(hash),
        }
    }

    /// The cache-key string form (`user:{id}` / `anon:{hash}`).
    #[must_use]
    pub fn as_key(&self) -> String {
        match self {
            Self::Registered { id } => format!("{USER_PREFIX}{id}"),
            Self::Anonymous { hash } => format!("{ANON_PREFIX}{hash}"),
        }
    }

    /// Parse the cache-key string form back into an [`ActorId`].
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        if let Some(id) = key.strip_prefix(USER_PREFIX) {
            id.parse().ok().map(|id| Self::Registered { id })
        } else {
            key.strip_prefix(ANON_PREFIX).map(|hash| Self::Anonymous {
                hash: hash.to_string(),
            })
        }
    }
}

/// Hash a client address into a stable anonymous identifier.
#[must_use]
pub fn hash_address(addr: &str) -> String {
    let digest = Sha256::digest(addr.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_key_round_trip() {
        let user = ActorId::registered(123);
        assert_eq!(user.as_key(), "user:123");
        assert_eq!(ActorId::from_key("user:123"), Some(user));

        let anon = ActorId::anonymous("abcdef".to_string());
        assert_eq!(anon.as_key(), "anon:abcdef");
        assert_eq!(ActorId::from_key("anon:abcdef"), Some(anon));
    }

    #[test]
    fn test_bad_keys_rejected() {
        assert_eq!(ActorId::from_key("user:notanumber"), None);
        assert_eq!(ActorId::from_key("something-else"), None);
        assert_eq!(ActorId::from_key(""), None);
    }

    #[test]
    fn test_hash_address_is_stable() {
        let h1 = hash_address("203.0.113.7");
        let h2 = hash_address("203.0.113.7");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, hash_address("203.0.113.8"));
    }

    #[test]
    fn test_accessors() {
        let user = ActorId::registered(5);
        assert!(user.is_registered());
        assert_eq!(user.registered_id(), Some(5));
        assert_eq!(user.anon_hash(), None);

        let anon = ActorId::anonymous("ff".into());
        assert!(!anon.is_registered());
        assert_eq!(anon.anon_hash(), Some("ff"));
    }
}
