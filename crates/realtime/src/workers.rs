//! Reconciliation workers.
//!
//! Periodic and lifecycle tasks keeping cache state and the durable store
//! consistent. The periodic loops log failures and retry on their next
//! tick; they never run in a request path.

use std::time::Duration;

use chrono::Utc;
use quillstream_common::AppResult;
use quillstream_db::repositories::VoteRepository;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info};

use crate::addresses::AddressRegistry;
use crate::chat_buffer::ChatBuffer;
use crate::vote_engine::VoteEngine;

/// Worker scheduling configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Interval between chat/address flushes (default: 1 minute).
    pub chat_flush_interval: Duration,
    /// Interval between close-schedule scans (default: 1 second).
    pub vote_close_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            chat_flush_interval: Duration::from_secs(60),
            vote_close_interval: Duration::from_secs(1),
        }
    }
}

/// Everything the workers operate on.
#[derive(Clone)]
pub struct WorkerContext {
    pub engine: VoteEngine,
    pub chat: ChatBuffer,
    pub addresses: AddressRegistry,
    pub votes: VoteRepository,
}

/// Rebuild cache state for every open vote on process start.
///
/// Open means a null close time or one still in the future (a scheduled
/// close). Activation overwrites, so running this twice yields the same
/// cache state as once.
pub async fn repopulate_active_votes(ctx: &WorkerContext) -> AppResult<usize> {
    let open = ctx.votes.find_open(Utc::now()).await?;
    let count = open.len();
    for vote in open {
        ctx.engine.activate(vote.id).await?;
    }
    info!(count, "Repopulated active votes");
    Ok(count)
}

/// Fold all live cache state back into the durable store on shutdown.
///
/// Every live vote is closed without stamping a close time (a scheduled
/// close time set earlier stays in place, so the vote reopens on the next
/// start) and without client notifications — no clients are listening
/// during shutdown. Buffered chat and addresses get one final flush.
pub async fn shutdown_flush(ctx: &WorkerContext) -> AppResult<()> {
    let members = ctx.engine.active_members().await?;
    info!(count = members.len(), "Flushing live votes for shutdown");
    for (channel_id, vote_id) in members {
        if let Err(e) = ctx.engine.close(vote_id, false, false).await {
            error!(vote_id, channel_id, error = %e, "Failed to flush vote on shutdown");
        }
    }

    ctx.chat.flush_all().await?;
    ctx.addresses.flush().await?;
    Ok(())
}

/// Spawn the periodic workers.
///
/// Returns their handles so the server can abort them before the shutdown
/// flush runs.
#[must_use]
pub fn spawn(config: &WorkerConfig, ctx: WorkerContext) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    // Chat/address flush loop
    let flush_ctx = ctx.clone();
    let flush_every = config.chat_flush_interval;
    handles.push(tokio::spawn(async move {
        let mut interval = interval(flush_every);
        loop {
            interval.tick().await;
            match flush_ctx.chat.flush_all().await {
                Ok(count) => {
                    if count > 0 {
                        info!(count, "Flushed chat messages");
                    }
                }
                Err(e) => {
                    error!(error = %e, "Chat flush failed");
                }
            }
            if let Err(e) = flush_ctx.addresses.flush().await {
                error!(error = %e, "Address flush failed");
            }
        }
    }));

    // Scheduled vote closure loop
    let close_ctx = ctx;
    let close_every = config.vote_close_interval;
    handles.push(tokio::spawn(async move {
        let mut interval = interval(close_every);
        loop {
            interval.tick().await;
            let due = match close_ctx.engine.due_closures(Utc::now()).await {
                Ok(due) => due,
                Err(e) => {
                    error!(error = %e, "Close-schedule scan failed");
                    continue;
                }
            };
            for (channel_id, vote_id) in due {
                match close_ctx.engine.close(vote_id, true, true).await {
                    Ok(true) => info!(vote_id, channel_id, "Closed scheduled vote"),
                    // Another process won the race; its fold stands.
                    Ok(false) => {}
                    Err(e) => {
                        error!(vote_id, channel_id, error = %e, "Scheduled close failed");
                    }
                }
            }
        }
    }));

    handles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.chat_flush_interval, Duration::from_secs(60));
        assert_eq!(config.vote_close_interval, Duration::from_secs(1));
    }
}
