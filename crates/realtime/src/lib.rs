//! Realtime coordination layer for quillstream.
//!
//! The pieces that keep live story rooms coherent across processes:
//!
//! - **Fanout**: in-process publish/subscribe multiplexer ([`FanoutRouter`])
//!   bridged across server processes over Redis pub/sub ([`FanoutBridge`])
//! - **Vote engine**: atomic, Redis-scripted vote lifecycle ([`VoteEngine`])
//! - **Chat buffer**: per-channel bounded message ring with idempotent
//!   persistence ([`ChatBuffer`])
//! - **Workers**: reconciliation between cache and durable store
//!   ([`workers`])

pub mod addresses;
pub mod chat_buffer;
pub mod fanout;
pub mod keys;
pub mod pubsub;
pub mod scripts;
pub mod vote_engine;
pub mod workers;

pub use addresses::AddressRegistry;
pub use chat_buffer::ChatBuffer;
pub use fanout::{FanoutRouter, Subscription};
pub use pubsub::{Fanout, FanoutBridge};
pub use vote_engine::VoteEngine;
pub use workers::{WorkerConfig, WorkerContext};
