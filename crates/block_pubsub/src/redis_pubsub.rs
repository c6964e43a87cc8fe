use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use redis::{aio::ConnectionManager, AsyncCommands};
use serde_json::Value;

use crate::{PubSub, PubSubConnection};

pub struct RedisPubSub {
    client: redis::Client,
    publish_conn: ConnectionManager,
}

impl RedisPubSub {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let publish_conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self { client, publish_conn })
    }
}

#[async_trait]
impl PubSub for RedisPubSub {
    async fn publish(&self, channel: &str, message: Value) -> anyhow::Result<()> {
        let mut conn = self.publish_conn.clone();
        let payload = serde_json::to_string(&message)?;
        let _: () = conn.publish(channel, payload).await?;
        Ok(())
    }

    async fn connect(&self) -> anyhow::Result<Box<dyn PubSubConnection>> {
        let pubsub = self.client.get_async_pubsub().await?;
        Ok(Box::new(RedisConnection { pubsub: Some(pubsub), current: None }))
    }
}

/// One native `SUBSCRIBE`/`PSUBSCRIBE` connection. Redis only allows one
/// active pattern per connection in our usage, so a second `subscribe`
/// call unsubscribes the previous one first.
struct RedisConnection {
    pubsub: Option<redis::aio::PubSub>,
    current: Option<(String, bool)>,
}

#[async_trait]
impl PubSubConnection for RedisConnection {
    async fn subscribe(&mut self, channel: &str, wildcard: bool) -> anyhow::Result<()> {
        let pubsub = self.pubsub.as_mut().context("pubsub connection already closed")?;
        if let Some((old_channel, old_wildcard)) = self.current.take() {
            if old_wildcard {
                pubsub.punsubscribe(&old_channel).await?;
            } else {
                pubsub.unsubscribe(&old_channel).await?;
            }
        }
        if wildcard {
            pubsub.psubscribe(channel).await?;
        } else {
            pubsub.subscribe(channel).await?;
        }
        self.current = Some((channel.to_string(), wildcard));
        Ok(())
    }

    async fn next_message(&mut self) -> anyhow::Result<Option<Value>> {
        let pubsub = self.pubsub.as_mut().context("pubsub connection already closed")?;
        let Some(msg) = pubsub.on_message().next().await else { return Ok(None) };
        let payload: String = msg.get_payload()?;
        Ok(Some(serde_json::from_str(&payload)?))
    }

    async fn close(mut self: Box<Self>) -> anyhow::Result<()> {
        self.pubsub = None;
        Ok(())
    }
}
