//! Database repositories.

pub mod address;
pub mod channel;
pub mod chat_message;
pub mod user;
pub mod vote;

pub use address::AddressRepository;
pub use channel::ChannelRepository;
pub use chat_message::ChatMessageRepository;
pub use user::UserRepository;
pub use vote::{EntryFold, VoteFold, VoteRepository, VoterRef};
