//! Rendering seam.
//!
//! Templating lives outside this layer; the core only supplies populated
//! snapshots and the channel key to publish under. The server installs an
//! implementation of [`Renderer`] at startup.

use crate::events::ChatBroadcast;
use crate::vote::VoteSnapshot;

/// Produces the client-facing fragment for a populated snapshot.
pub trait Renderer: Send + Sync {
    /// Render a vote's state for broadcast.
    fn render_vote(&self, snapshot: &VoteSnapshot) -> String;

    /// Render a chat message for broadcast.
    fn render_chat(&self, message: &ChatBroadcast) -> String;
}

/// A renderer that emits the snapshot as a JSON fragment.
///
/// Stands in where no HTML templating layer is wired up; clients receive
/// the structured snapshot either way.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn render_vote(&self, snapshot: &VoteSnapshot) -> String {
        serde_json::to_string(snapshot).unwrap_or_default()
    }

    fn render_chat(&self, message: &ChatBroadcast) -> String {
        serde_json::to_string(message).unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_json_renderer_emits_snapshot() {
        let snapshot = VoteSnapshot {
            vote_id: 1,
            channel_id: 2,
            question: "q".to_string(),
            multivote: false,
            writein_allowed: false,
            votes_hidden: false,
            close_time: None,
            options: vec![],
        };
        let html = JsonRenderer.render_vote(&snapshot);
        assert!(html.contains("\"vote_id\":1"));
    }
}
