use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{PubSub, PubSubConnection};

/// In-process fan-out for single-node debugging and tests: every publish
/// goes to every subscriber's channel, each connection filters down to its
/// own subscription client-side. A slow reader that falls behind the
/// broadcast capacity drops messages rather than blocking the publisher -
/// the same "no reordering guarantee, messages may be dropped" contract as
/// the networked variant.
pub struct InMemoryPubSub {
    tx: broadcast::Sender<(String, Value)>,
}

impl InMemoryPubSub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }
}

impl Default for InMemoryPubSub {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl PubSub for InMemoryPubSub {
    async fn publish(&self, channel: &str, message: Value) -> anyhow::Result<()> {
        // Err means there are no subscribers right now; not a failure.
        let _ = self.tx.send((channel.to_string(), message));
        Ok(())
    }

    async fn connect(&self) -> anyhow::Result<Box<dyn PubSubConnection>> {
        Ok(Box::new(InMemoryConnection { rx: self.tx.subscribe(), filter: None }))
    }
}

struct InMemoryConnection {
    rx: broadcast::Receiver<(String, Value)>,
    filter: Option<(String, bool)>,
}

fn matches(pattern: &str, wildcard: bool, channel: &str) -> bool {
    if wildcard {
        glob::Pattern::new(pattern).map(|p| p.matches(channel)).unwrap_or(false)
    } else {
        pattern == channel
    }
}

#[async_trait]
impl PubSubConnection for InMemoryConnection {
    async fn subscribe(&mut self, channel: &str, wildcard: bool) -> anyhow::Result<()> {
        self.filter = Some((channel.to_string(), wildcard));
        Ok(())
    }

    async fn next_message(&mut self) -> anyhow::Result<Option<Value>> {
        let Some((pattern, wildcard)) = self.filter.clone() else { return Ok(None) };
        loop {
            match self.rx.recv().await {
                Ok((channel, msg)) if matches(&pattern, wildcard, &channel) => return Ok(Some(msg)),
                Ok(_) => continue,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return Ok(None),
            }
        }
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn exact_subscription_only_sees_its_channel() {
        let bus = InMemoryPubSub::new(16);
        let mut conn = bus.connect().await.unwrap();
        conn.subscribe("prefix1", false).await.unwrap();

        bus.publish("prefix2", json!({"operation": "POST"})).await.unwrap();
        bus.publish("prefix1", json!({"operation": "DELETE"})).await.unwrap();

        let msg = conn.next_message().await.unwrap().unwrap();
        assert_eq!(msg["operation"], "DELETE");
    }

    #[tokio::test]
    async fn wildcard_subscription_matches_glob() {
        let bus = InMemoryPubSub::new(16);
        let mut conn = bus.connect().await.unwrap();
        conn.subscribe("prefix1/*", true).await.unwrap();

        bus.publish("prefix1/f", json!({"operation": "POST"})).await.unwrap();
        let msg = conn.next_message().await.unwrap().unwrap();
        assert_eq!(msg["operation"], "POST");
    }

    #[tokio::test]
    async fn resubscribe_replaces_filter() {
        let bus = InMemoryPubSub::new(16);
        let mut conn = bus.connect().await.unwrap();
        conn.subscribe("a", false).await.unwrap();
        conn.subscribe("b", false).await.unwrap();

        bus.publish("a", json!({"x": 1})).await.unwrap();
        bus.publish("b", json!({"x": 2})).await.unwrap();
        let msg = conn.next_message().await.unwrap().unwrap();
        assert_eq!(msg["x"], 2);
    }
}
