// apps/kernel-server/src/bus.rs
// Purpose: Event Bus (C2): two pub/sub channels (state_changed,
// agent_events) and one durable stream with consumer groups (task_queue).
// Architecture: Messaging port
// Dependencies: redis (tokio-comp, connection-manager)

use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;

pub const DEFAULT_STATE_CHANGED_CHANNEL: &str = "devswarm:state_changed";
pub const DEFAULT_AGENT_EVENTS_CHANNEL: &str = "devswarm:agent_events";
pub const DEFAULT_TASK_QUEUE_STREAM: &str = "devswarm:task_queue";
const CONSUMER_GROUP: &str = "devswarm-workers";

/// A claimed stream entry the worker must ack exactly once.
#[derive(Debug, Clone)]
pub struct StreamDelivery {
    pub id: String,
    pub payload: String,
}

/// A live subscription to one of the two pub/sub channels. Dropped when the
/// bridge's subscribe loop exits; `recv` returns `None` once the underlying
/// connection closes.
#[async_trait]
pub trait Subscription: Send {
    async fn recv(&mut self) -> Option<String>;
}

/// The three logical endpoints described in spec.md §4.2. If the bus is
/// unavailable, publishes are silent no-ops and `subscribe` returns `None`
/// (the degraded path C7 falls back to its heartbeat-only loop for).
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish_state_changed(&self);
    async fn publish_agent_event(&self, payload: String);
    async fn subscribe_state_changed(&self) -> Option<Box<dyn Subscription>>;
    async fn subscribe_agent_events(&self) -> Option<Box<dyn Subscription>>;

    /// Appends a goal onto the task queue stream via XADD.
    async fn enqueue_task(&self, payload: String);
    /// Ensures the consumer group exists, then blocks (bounded by
    /// `block_timeout`) for up to one new delivery via XREADGROUP.
    async fn read_task(
        &self,
        consumer: &str,
        block_timeout: Duration,
    ) -> Option<StreamDelivery>;
    async fn ack_task(&self, id: &str);
}

/// Redis-backed implementation. Constructed with an already-open
/// `ConnectionManager` so connection loss is retried transparently by the
/// client rather than tearing down the whole bus.
pub struct RedisEventBus {
    client: redis::Client,
    manager: redis::aio::ConnectionManager,
    state_changed_channel: String,
    agent_events_channel: String,
    task_queue_stream: String,
}

impl RedisEventBus {
    /// Returns `None` (rather than an error) when `redis_url` can't be
    /// reached at construction time, mirroring the teacher's
    /// "persistence disabled, keep booting" posture for optional Redis.
    pub async fn connect(redis_url: &str) -> Option<Self> {
        let client = match redis::Client::open(redis_url) {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!("failed to parse REDIS_URL: {}. Event bus disabled.", e);
                return None;
            }
        };

        match client.get_connection_manager().await {
            Ok(manager) => {
                tracing::info!("event bus connected: {}", redis_url);
                Some(RedisEventBus {
                    client,
                    manager,
                    state_changed_channel: DEFAULT_STATE_CHANGED_CHANNEL.to_string(),
                    agent_events_channel: DEFAULT_AGENT_EVENTS_CHANNEL.to_string(),
                    task_queue_stream: DEFAULT_TASK_QUEUE_STREAM.to_string(),
                })
            }
            Err(e) => {
                tracing::warn!("failed to connect to Redis: {}. Event bus disabled.", e);
                None
            }
        }
    }

    async fn ensure_group(&self, conn: &mut redis::aio::ConnectionManager) {
        let result: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(&self.task_queue_stream, CONSUMER_GROUP, "$")
            .await;
        if let Err(e) = result {
            // BUSYGROUP means the group already exists, benign.
            if !e.to_string().contains("BUSYGROUP") {
                tracing::warn!("xgroup create failed: {}", e);
            }
        }
    }
}

pub struct RedisSubscription {
    stream: std::pin::Pin<Box<dyn futures::Stream<Item = redis::Msg> + Send>>,
}

#[async_trait]
impl Subscription for RedisSubscription {
    async fn recv(&mut self) -> Option<String> {
        use futures::StreamExt;
        let msg = self.stream.next().await?;
        msg.get_payload::<String>().ok()
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn publish_state_changed(&self) {
        let mut conn = self.manager.clone();
        let result: redis::RedisResult<()> = conn.publish(&self.state_changed_channel, "").await;
        if let Err(e) = result {
            tracing::warn!("publish state_changed failed: {}", e);
        }
    }

    async fn publish_agent_event(&self, payload: String) {
        let mut conn = self.manager.clone();
        let result: redis::RedisResult<()> = conn.publish(&self.agent_events_channel, payload).await;
        if let Err(e) = result {
            tracing::warn!("publish agent_events failed: {}", e);
        }
    }

    async fn subscribe_state_changed(&self) -> Option<Box<dyn Subscription>> {
        subscribe_channel(&self.client, &self.state_changed_channel).await
    }

    async fn subscribe_agent_events(&self) -> Option<Box<dyn Subscription>> {
        subscribe_channel(&self.client, &self.agent_events_channel).await
    }

    async fn enqueue_task(&self, payload: String) {
        let mut conn = self.manager.clone();
        let result: redis::RedisResult<String> = conn
            .xadd(&self.task_queue_stream, "*", &[("payload", payload)])
            .await;
        if let Err(e) = result {
            tracing::warn!("xadd task_queue failed: {}", e);
        }
    }

    async fn read_task(&self, consumer: &str, block_timeout: Duration) -> Option<StreamDelivery> {
        let mut conn = self.manager.clone();
        self.ensure_group(&mut conn).await;

        let opts = redis::streams::StreamReadOptions::default()
            .group(CONSUMER_GROUP, consumer)
            .block(block_timeout.as_millis() as usize)
            .count(1);

        let reply: redis::RedisResult<redis::streams::StreamReadReply> = conn
            .xread_options(&[&self.task_queue_stream], &[">"], &opts)
            .await;

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("xreadgroup failed: {}", e);
                return None;
            }
        };

        for key in reply.keys {
            for entry in key.ids {
                let payload: String = entry
                    .map
                    .get("payload")
                    .and_then(|v| match v {
                        redis::Value::Data(bytes) => String::from_utf8(bytes.clone()).ok(),
                        _ => None,
                    })
                    .unwrap_or_default();
                return Some(StreamDelivery {
                    id: entry.id,
                    payload,
                });
            }
        }
        None
    }

    async fn ack_task(&self, id: &str) {
        let mut conn = self.manager.clone();
        let result: redis::RedisResult<()> = conn
            .xack(&self.task_queue_stream, CONSUMER_GROUP, &[id])
            .await;
        if let Err(e) = result {
            tracing::warn!("xack failed: {}", e);
        }
    }
}

async fn subscribe_channel(
    client: &redis::Client,
    channel: &str,
) -> Option<Box<dyn Subscription>> {
    let conn = match client.get_async_connection().await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!("failed to open pub/sub connection: {}", e);
            return None;
        }
    };
    let mut pubsub = conn.into_pubsub();
    if let Err(e) = pubsub.subscribe(channel).await {
        tracing::warn!("subscribe to {} failed: {}", channel, e);
        return None;
    }
    Some(Box::new(RedisSubscription {
        stream: Box::pin(pubsub.into_on_message()),
    }))
}

/// Always-degraded bus: every publish is a no-op, every subscribe/read
/// returns nothing. Used when `REDIS_URL` is unset and in tests that don't
/// exercise the bus at all.
#[derive(Default)]
pub struct NullEventBus;

#[async_trait]
impl EventBus for NullEventBus {
    async fn publish_state_changed(&self) {}
    async fn publish_agent_event(&self, _payload: String) {}
    async fn subscribe_state_changed(&self) -> Option<Box<dyn Subscription>> {
        None
    }
    async fn subscribe_agent_events(&self) -> Option<Box<dyn Subscription>> {
        None
    }
    async fn enqueue_task(&self, _payload: String) {}
    async fn read_task(&self, _consumer: &str, block_timeout: Duration) -> Option<StreamDelivery> {
        tokio::time::sleep(block_timeout).await;
        None
    }
    async fn ack_task(&self, _id: &str) {}
}
