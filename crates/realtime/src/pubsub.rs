//! Redis pub/sub bridge for cross-process fanout.
//!
//! Every process publishes its fanout traffic onto one Redis channel,
//! tagged with a per-process sender id. Each process also subscribes to
//! that channel and replays frames into its local [`FanoutRouter`],
//! discarding frames carrying its own tag (Redis delivers a publish back
//! to the publishing process too; local subscribers already got the value
//! directly).

use std::sync::Arc;

use fred::clients::{Client, SubscriberClient};
use fred::error::{Error as RedisError, ErrorKind as RedisErrorKind};
use fred::interfaces::{ClientLike, EventInterface, PubsubInterface};
use fred::types::config::Config as RedisConfig;
use quillstream_common::IdGenerator;
use quillstream_core::FanoutMessage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::fanout::{FanoutRouter, Subscription};

/// The single pub/sub channel carrying bridged fanout traffic.
pub const FANOUT_CHANNEL: &str = "quillstream:fanout";

/// Wire form of a bridged publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BridgeFrame {
    key: String,
    message: FanoutMessage,
    sender: String,
}

/// Cross-process fanout bridge.
pub struct FanoutBridge {
    publisher: Client,
    subscriber: SubscriberClient,
    sender_tag: String,
}

impl FanoutBridge {
    /// Connect publisher and subscriber clients.
    pub async fn connect(redis_url: &str) -> Result<Self, RedisError> {
        let config = RedisConfig::from_url(redis_url)?;

        let publisher = Client::new(config.clone(), None, None, None);
        publisher.init().await?;

        let subscriber = SubscriberClient::new(config, None, None, None);
        subscriber.init().await?;

        let sender_tag = format!(
            "{}-{}",
            std::process::id(),
            IdGenerator::new().generate_uuid_v4()
        );

        info!(sender_tag, "Fanout bridge connected");

        Ok(Self {
            publisher,
            subscriber,
            sender_tag,
        })
    }

    /// Subscribe and start replaying remote frames into `router`.
    ///
    /// If the connection drops, local delivery continues unaffected; fred
    /// resubscribes on reconnect and bridged delivery resumes (frames from
    /// the outage window are lost — the authoritative chat/vote state lives
    /// in the cache's key/value data, not this stream).
    pub async fn start(&self, router: Arc<FanoutRouter>) -> Result<(), RedisError> {
        self.subscriber.subscribe(FANOUT_CHANNEL).await?;

        let own_tag = self.sender_tag.clone();
        let mut message_stream = self.subscriber.message_rx();

        tokio::spawn(async move {
            while let Ok(message) = message_stream.recv().await {
                let Some(payload) = message.value.as_string() else {
                    continue;
                };
                match serde_json::from_str::<BridgeFrame>(&payload) {
                    Ok(frame) => {
                        if frame.sender == own_tag {
                            continue;
                        }
                        debug!(key = %frame.key, "Replaying bridged fanout frame");
                        router.publish_local(&frame.key, &frame.message);
                    }
                    Err(e) => {
                        warn!("Failed to parse bridged fanout frame: {e}");
                    }
                }
            }
            info!("Fanout bridge stream ended");
        });

        Ok(())
    }

    /// Forward a locally published value to the other processes.
    pub async fn forward(&self, key: &str, message: &FanoutMessage) -> Result<(), RedisError> {
        let frame = BridgeFrame {
            key: key.to_string(),
            message: message.clone(),
            sender: self.sender_tag.clone(),
        };
        let payload = serde_json::to_string(&frame).map_err(|e| {
            RedisError::new(
                RedisErrorKind::InvalidArgument,
                format!("Serialization error: {e}"),
            )
        })?;
        let _: () = self.publisher.publish(FANOUT_CHANNEL, payload).await?;
        Ok(())
    }

    /// Shutdown both connections.
    pub async fn shutdown(&self) -> Result<(), RedisError> {
        self.subscriber.quit().await?;
        self.publisher.quit().await?;
        info!("Fanout bridge shutdown");
        Ok(())
    }
}

/// The process-wide fanout handle: local router plus optional bridge.
#[derive(Clone)]
pub struct Fanout {
    router: Arc<FanoutRouter>,
    bridge: Option<Arc<FanoutBridge>>,
}

impl Fanout {
    /// A fanout confined to this process (tests, single-process deploys).
    #[must_use]
    pub const fn local_only(router: Arc<FanoutRouter>) -> Self {
        Self {
            router,
            bridge: None,
        }
    }

    /// A fanout bridged across processes.
    #[must_use]
    pub const fn bridged(router: Arc<FanoutRouter>, bridge: Arc<FanoutBridge>) -> Self {
        Self {
            router,
            bridge: Some(bridge),
        }
    }

    /// Publish to local subscribers, then forward across the bridge.
    ///
    /// A bridge failure is logged and swallowed: local delivery already
    /// happened and must stay unaffected.
    pub async fn publish(&self, key: &str, message: &FanoutMessage) {
        self.router.publish_local(key, message);
        if let Some(bridge) = &self.bridge
            && let Err(e) = bridge.forward(key, message).await
        {
            warn!(error = %e, key, "Cross-process forward failed; local delivery unaffected");
        }
    }

    /// Subscribe to a set of keys.
    #[must_use]
    pub fn subscribe(
        &self,
        keys: Vec<String>,
        idle_timeout: Option<std::time::Duration>,
    ) -> Subscription {
        self.router.subscribe(keys, idle_timeout)
    }

    /// The underlying local router.
    #[must_use]
    pub fn router(&self) -> &Arc<FanoutRouter> {
        &self.router
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_frame_round_trip() {
        let frame = BridgeFrame {
            key: "chan:4".to_string(),
            message: FanoutMessage::VoteOpenChanged {
                vote_id: 1,
                channel_id: 4,
                open: false,
            },
            sender: "1234-abcd".to_string(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        let back: BridgeFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back.key, "chan:4");
        assert_eq!(back.sender, "1234-abcd");
    }

    #[tokio::test]
    async fn test_local_only_publish_delivers() {
        let router = FanoutRouter::new();
        let fanout = Fanout::local_only(Arc::clone(&router));
        let mut sub = fanout.subscribe(vec!["chan:1".to_string()], None);

        fanout
            .publish(
                "chan:1",
                &FanoutMessage::VoteOpenChanged {
                    vote_id: 9,
                    channel_id: 1,
                    open: true,
                },
            )
            .await;

        let (key, _) = sub.recv().await.unwrap();
        assert_eq!(key, "chan:1");
    }
}
