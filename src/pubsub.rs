//! In-process publish/subscribe with an optional Redis mirror.
//!
//! The registry owns the subscription maps (no hidden globals): channel name
//! -> subscriber id -> sender. Cancellation is idempotent and never affects
//! other subscribers of the same channel. Publishing is fire-and-forget
//! relative to the write path; failures are logged as transport errors and
//! counted, never propagated.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use redis::AsyncCommands;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::events::ChatEvent;
use crate::metrics;

pub fn messages_channel(conversation_id: Uuid) -> String {
    format!("messages:{conversation_id}")
}

pub fn typing_channel(conversation_id: Uuid) -> String {
    format!("typing:{conversation_id}")
}

pub fn call_channel(call_id: Uuid) -> String {
    format!("call:{call_id}")
}

pub fn presence_channel(user_id: Uuid) -> String {
    format!("presence:{user_id}")
}

/// A live subscription to one channel. Dropping the receiver ends delivery;
/// calling `ChannelRegistry::unsubscribe` releases the map entry eagerly.
pub struct Subscription {
    pub id: u64,
    pub channel: String,
    pub rx: UnboundedReceiver<String>,
}

#[derive(Clone, Default)]
pub struct ChannelRegistry {
    next_id: Arc<AtomicU64>,
    inner: Arc<RwLock<HashMap<String, HashMap<u64, UnboundedSender<String>>>>>,
    redis: Option<redis::Client>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that mirrors every publish onto Redis pub/sub for
    /// cross-instance fanout.
    pub fn with_redis(client: redis::Client) -> Self {
        Self {
            redis: Some(client),
            ..Self::default()
        }
    }

    pub async fn subscribe(&self, channel: &str) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = unbounded_channel();
        let mut guard = self.inner.write().await;
        guard.entry(channel.to_string()).or_default().insert(id, tx);
        Subscription {
            id,
            channel: channel.to_string(),
            rx,
        }
    }

    /// Idempotent: unsubscribing twice, or after the channel was dropped,
    /// is a no-op and leaves other subscribers untouched.
    pub async fn unsubscribe(&self, channel: &str, id: u64) {
        let mut guard = self.inner.write().await;
        if let Some(subs) = guard.get_mut(channel) {
            subs.remove(&id);
            if subs.is_empty() {
                guard.remove(channel);
            }
        }
    }

    /// Tear down a whole channel (e.g. a call reaching a terminal state).
    pub async fn drop_channel(&self, channel: &str) {
        self.inner.write().await.remove(channel);
    }

    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .read()
            .await
            .get(channel)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    /// Serialize and deliver to local subscribers, then mirror to Redis.
    /// Never fails: the caller's write has already committed.
    pub async fn publish(&self, channel: &str, event: &ChatEvent) {
        let payload = match event.to_broadcast_payload() {
            Ok(p) => p,
            Err(e) => {
                metrics::PUBLISH_FAILURES_TOTAL.inc();
                tracing::error!(error = %e, channel, "failed to serialize event");
                return;
            }
        };
        self.deliver_local(channel, &payload).await;
        if let Some(client) = &self.redis {
            if let Err(e) = Self::publish_redis(client, channel, &payload).await {
                metrics::PUBLISH_FAILURES_TOTAL.inc();
                tracing::warn!(error = %e, channel, "redis publish failed");
            }
        }
    }

    /// Local-only delivery, used for events arriving from the Redis bridge
    /// (publishing those back to Redis would loop).
    pub async fn deliver_local(&self, channel: &str, payload: &str) {
        let mut guard = self.inner.write().await;
        if let Some(subs) = guard.get_mut(channel) {
            subs.retain(|_, tx| tx.send(payload.to_string()).is_ok());
            if subs.is_empty() {
                guard.remove(channel);
            }
        }
    }

    async fn publish_redis(
        client: &redis::Client,
        channel: &str,
        payload: &str,
    ) -> redis::RedisResult<()> {
        let mut conn = client.get_multiplexed_async_connection().await?;
        conn.publish::<_, _, ()>(channel, payload).await
    }
}

/// Long-running bridge: subscribes to all chat channel patterns on Redis and
/// re-delivers remote-instance events to local subscribers.
pub async fn start_redis_listener(
    client: redis::Client,
    registry: ChannelRegistry,
) -> redis::RedisResult<()> {
    // Pub/sub needs a dedicated connection, not a multiplexed one
    let conn = client.get_async_connection().await?;
    let mut pubsub = conn.into_pubsub();
    for pattern in ["messages:*", "typing:*", "call:*", "presence:*"] {
        pubsub.psubscribe(pattern).await?;
    }
    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let channel: String = msg.get_channel_name().into();
        let payload: String = msg.get_payload()?;
        registry.deliver_local(&channel, &payload).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_all_subscribers_of_a_channel() {
        let registry = ChannelRegistry::new();
        let channel = messages_channel(Uuid::new_v4());
        let mut a = registry.subscribe(&channel).await;
        let mut b = registry.subscribe(&channel).await;

        let event = ChatEvent::MessageDeleted {
            message_id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
        };
        registry.publish(&channel, &event).await;

        assert!(a.rx.recv().await.unwrap().contains("message.deleted"));
        assert!(b.rx.recv().await.unwrap().contains("message.deleted"));
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent_and_isolated() {
        let registry = ChannelRegistry::new();
        let channel = typing_channel(Uuid::new_v4());
        let a = registry.subscribe(&channel).await;
        let mut b = registry.subscribe(&channel).await;

        registry.unsubscribe(&channel, a.id).await;
        registry.unsubscribe(&channel, a.id).await;
        assert_eq!(registry.subscriber_count(&channel).await, 1);

        let event = ChatEvent::TypingUpdated {
            conversation_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            is_typing: true,
        };
        registry.publish(&channel, &event).await;
        assert!(b.rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn dropped_receivers_are_pruned_on_publish() {
        let registry = ChannelRegistry::new();
        let channel = call_channel(Uuid::new_v4());
        let sub = registry.subscribe(&channel).await;
        drop(sub);

        let event = ChatEvent::CallRinging {
            call_id: Uuid::new_v4(),
        };
        registry.publish(&channel, &event).await;
        assert_eq!(registry.subscriber_count(&channel).await, 0);
    }

    #[tokio::test]
    async fn publish_to_empty_channel_is_a_noop() {
        let registry = ChannelRegistry::new();
        let event = ChatEvent::CallRinging {
            call_id: Uuid::new_v4(),
        };
        registry.publish("call:nobody", &event).await;
    }
}
