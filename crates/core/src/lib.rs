//! Core domain logic for quillstream.
//!
//! Domain types and pure logic of the realtime coordination layer: cached
//! vote state and its snapshots, the chat message domain type, the closed
//! set of fanout message variants, channel authorization, and the renderer
//! seam toward the (external) templating layer.

pub mod authz;
pub mod chat;
pub mod events;
pub mod render;
pub mod vote;

pub use authz::ChannelGuard;
pub use chat::{ChatMessage, partition_by_author};
pub use events::{ChatBroadcast, FanoutMessage};
pub use render::{JsonRenderer, Renderer};
pub use vote::{CastOutcome, OptionSnapshot, OptionState, VoteConfigUpdate, VoteSnapshot, VoteState};
