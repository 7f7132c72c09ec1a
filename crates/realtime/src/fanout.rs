//! In-process publish/subscribe fanout.
//!
//! Channels are identified by string keys. Every subscription is one queue;
//! a subscription may span any number of keys, fixed for its lifetime.
//!
//! Concurrency: the key map's mutex is held only to look up or prune a
//! key's entry. Each key's subscriber set has its own mutex, held while
//! mutating the set and for the duration of a publish's fan-out loop
//! (O(subscriber count) sends to unbounded queues, no awaiting). Lock order
//! is always map before entry; no lock is held across a suspension point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use quillstream_core::FanoutMessage;
use tokio::sync::mpsc;

type SubscriberQueue = mpsc::UnboundedSender<(String, FanoutMessage)>;
type KeyEntry = Arc<Mutex<HashMap<u64, SubscriberQueue>>>;

/// Process-local fanout router.
///
/// Values published under a key are delivered to every queue currently
/// registered against that key. Delivery is best-effort and at most once
/// per subscriber; there is no ordering across keys.
#[derive(Default)]
pub struct FanoutRouter {
    keys: Mutex<HashMap<String, KeyEntry>>,
    next_id: AtomicU64,
}

impl FanoutRouter {
    /// Create a new router.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver `message` to every local subscriber of `key`.
    ///
    /// Publishing to a key with no subscribers is a no-op, not an error.
    /// Returns the number of queues the value was handed to.
    pub fn publish_local(&self, key: &str, message: &FanoutMessage) -> usize {
        let entry = {
            let map = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
            map.get(key).cloned()
        };
        let Some(entry) = entry else {
            return 0;
        };

        let subscribers = entry.lock().unwrap_or_else(PoisonError::into_inner);
        for queue in subscribers.values() {
            // A send failure means the receiver is mid-teardown; its Drop
            // will deregister the queue.
            let _ = queue.send((key.to_string(), message.clone()));
        }
        subscribers.len()
    }

    /// Register a new subscription against `keys`.
    ///
    /// The returned stream yields `(key, message)` pairs until dropped.
    /// With `idle_timeout` set, `recv` returns `None` once no message
    /// arrives within the window, ending the stream.
    #[must_use]
    pub fn subscribe(
        self: &Arc<Self>,
        keys: Vec<String>,
        idle_timeout: Option<Duration>,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut map = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
            for key in &keys {
                let entry = map.entry(key.clone()).or_default();
                entry
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(id, tx.clone());
            }
        }

        Subscription {
            router: Arc::clone(self),
            keys,
            id,
            rx,
            idle_timeout,
        }
    }

    /// Number of live subscribers for a key.
    #[must_use]
    pub fn subscriber_count(&self, key: &str) -> usize {
        let map = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        map.get(key).map_or(0, |entry| {
            entry.lock().unwrap_or_else(PoisonError::into_inner).len()
        })
    }

    /// Remove a subscription's queue from each key, pruning empty keys.
    fn deregister(&self, keys: &[String], id: u64) {
        let mut map = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            if let Some(entry) = map.get(key) {
                let mut subscribers = entry.lock().unwrap_or_else(PoisonError::into_inner);
                subscribers.remove(&id);
                let empty = subscribers.is_empty();
                drop(subscribers);
                if empty {
                    map.remove(key);
                }
            }
        }
    }
}

/// A live subscription handle.
///
/// Dropping the handle deregisters its queue from every key — on every
/// exit path, so a key's subscriber count tracks live connections.
pub struct Subscription {
    router: Arc<FanoutRouter>,
    keys: Vec<String>,
    id: u64,
    rx: mpsc::UnboundedReceiver<(String, FanoutMessage)>,
    idle_timeout: Option<Duration>,
}

impl Subscription {
    /// Receive the next delivered value.
    ///
    /// Returns `None` when the idle timeout elapses without a message.
    pub async fn recv(&mut self) -> Option<(String, FanoutMessage)> {
        match self.idle_timeout {
            None => self.rx.recv().await,
            Some(window) => tokio::time::timeout(window, self.rx.recv())
                .await
                .ok()
                .flatten(),
        }
    }

    /// The keys this subscription is registered against.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.router.deregister(&self.keys, self.id);
    }
}
