//! Database entities.

pub mod address_identifier;
pub mod channel;
pub mod chat_message;
pub mod story;
pub mod user;
pub mod user_vote;
pub mod vote_entry;
pub mod vote_info;

pub use address_identifier::Entity as AddressIdentifier;
pub use channel::Entity as Channel;
pub use chat_message::Entity as ChatMessage;
pub use story::Entity as Story;
pub use user::Entity as User;
pub use user_vote::Entity as UserVote;
pub use vote_entry::Entity as VoteEntry;
pub use vote_info::Entity as VoteInfo;
