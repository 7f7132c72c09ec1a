//! Message dispatch table.
//!
//! Incoming frame types map to handler functions through one table built at
//! startup and looked up per message. Unknown types are ignored, not
//! errors — old clients may send tags this build no longer knows.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use quillstream_common::AppResult;
use serde_json::Value;

use crate::handlers;
use crate::ws::ConnContext;

/// Boxed handler future.
pub type HandlerFuture = Pin<Box<dyn Future<Output = AppResult<()>> + Send>>;

/// A frame handler.
pub type Handler = fn(ConnContext, Value) -> HandlerFuture;

/// Dispatch table from frame type tags to handlers.
pub struct Dispatcher {
    table: HashMap<&'static str, Handler>,
}

impl Dispatcher {
    /// Build the table.
    #[must_use]
    pub fn new() -> Self {
        let mut table: HashMap<&'static str, Handler> = HashMap::new();
        table.insert("chat_msg", handlers::chat_msg);
        table.insert("backlog", handlers::backlog);
        table.insert("thread", handlers::thread);
        table.insert("cast_vote", handlers::cast_vote);
        table.insert("retract_vote", handlers::retract_vote);
        table.insert("add_writein", handlers::add_writein);
        table.insert("kill_option", handlers::kill_option);
        table.insert("set_vote_config", handlers::set_vote_config);
        table.insert("close_vote", handlers::close_vote);
        table.insert("open_vote", handlers::open_vote);
        Self { table }
    }

    /// Look up and invoke the handler for a frame, if any.
    #[must_use]
    pub fn dispatch(&self, ctx: ConnContext, tag: &str, frame: Value) -> Option<HandlerFuture> {
        self.table.get(tag).map(|handler| handler(ctx, frame))
    }

    /// Whether a tag is known.
    #[must_use]
    pub fn handles(&self, tag: &str) -> bool {
        self.table.contains_key(tag)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_covers_the_operation_set() {
        let dispatcher = Dispatcher::new();
        for tag in [
            "chat_msg",
            "backlog",
            "thread",
            "cast_vote",
            "retract_vote",
            "add_writein",
            "kill_option",
            "set_vote_config",
            "close_vote",
            "open_vote",
        ] {
            assert!(dispatcher.handles(tag), "missing handler for {tag}");
        }
        assert!(!dispatcher.handles("join"));
        assert!(!dispatcher.handles(""));
    }
}
