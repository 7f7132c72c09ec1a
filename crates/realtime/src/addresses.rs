//! Anonymous address registry.
//!
//! Anonymous actors are identified by a hash of their client address. The
//! `hash → address` pair is parked in a cache hash and folded into the
//! durable audit table by the flush worker; the flush deletes the cache
//! hash, and later registrations simply recreate it.

use std::collections::HashMap;
use std::sync::Arc;

use fred::clients::Client;
use fred::interfaces::{HashesInterface, KeysInterface};
use quillstream_common::{AppError, AppResult, hash_address};
use quillstream_db::repositories::AddressRepository;

/// Registry of anonymous client addresses.
#[derive(Clone)]
pub struct AddressRegistry {
    redis: Arc<Client>,
    addresses: AddressRepository,
}

impl AddressRegistry {
    /// Create a new registry.
    #[must_use]
    pub const fn new(redis: Arc<Client>, addresses: AddressRepository) -> Self {
        Self { redis, addresses }
    }

    /// Register a client address, returning its stable hash.
    pub async fn register(&self, addr: &str) -> AppResult<String> {
        let hash = hash_address(addr);
        let mut pair = HashMap::new();
        pair.insert(hash.clone(), addr.to_string());
        let _: i64 = self
            .redis
            .hset(crate::keys::IP_HASHES, pair)
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;
        Ok(hash)
    }

    /// Fold buffered pairs into the durable audit table.
    pub async fn flush(&self) -> AppResult<u64> {
        let pairs: HashMap<String, String> = self
            .redis
            .hgetall(crate::keys::IP_HASHES)
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;
        if pairs.is_empty() {
            return Ok(0);
        }

        let stored = self
            .addresses
            .insert_ignoring_duplicates(pairs.into_iter().collect())
            .await?;

        let _: i64 = self
            .redis
            .del(crate::keys::IP_HASHES)
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;
        Ok(stored)
    }
}
