//! Database layer for quillstream.
//!
//! Provides the sea-orm entities and repositories backing the durable side
//! of the realtime coordination layer: stories, channels, chat messages and
//! votes. Schema migrations are managed outside this crate.

pub mod entities;
pub mod repositories;

pub use repositories::{
    AddressRepository, ChannelRepository, ChatMessageRepository, UserRepository, VoteRepository,
};
