//! Shared application state.

use std::sync::Arc;

use quillstream_common::IdGenerator;
use quillstream_core::{ChannelGuard, Renderer};
use quillstream_db::repositories::UserRepository;
use quillstream_realtime::{AddressRegistry, ChatBuffer, Fanout, VoteEngine};

use crate::dispatch::Dispatcher;

/// The process-wide context, constructed once at startup and passed into
/// every handler.
#[derive(Clone)]
pub struct AppState {
    pub fanout: Fanout,
    pub engine: VoteEngine,
    pub chat: ChatBuffer,
    pub guard: Arc<ChannelGuard>,
    pub users: UserRepository,
    pub addresses: AddressRegistry,
    pub renderer: Arc<dyn Renderer>,
    pub dispatcher: Arc<Dispatcher>,
    pub id_gen: IdGenerator,
}
