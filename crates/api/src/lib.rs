//! Websocket surface for quillstream.
//!
//! One endpoint per channel; incoming frames are parsed, authorized, and
//! routed through an explicit dispatch table to the vote engine and chat
//! buffer. Outgoing traffic rides the fanout subscription of each
//! connection.

pub mod dispatch;
pub mod handlers;
pub mod messages;
pub mod state;
pub mod ws;

pub use dispatch::Dispatcher;
pub use state::AppState;
pub use ws::router;
