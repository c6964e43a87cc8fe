//! Change notification fan-out: a publish side used by the request engine
//! after every mutation, and a per-connection subscribe side used by the
//! WebSocket handler.

pub mod memory;
pub mod redis_pubsub;

use async_trait::async_trait;
use serde_json::Value;

/// One subscriber's view of the bus. Each WebSocket connection owns exactly
/// one of these; a second `subscribe` call on the same connection replaces
/// the first subscription rather than adding to it.
#[async_trait]
pub trait PubSubConnection: Send {
    async fn subscribe(&mut self, channel: &str, wildcard: bool) -> anyhow::Result<()>;

    /// Next message in arrival order, or `None` once the connection has
    /// been closed. Back-pressure is the caller's problem: a slow reader
    /// may miss messages under load, by design.
    async fn next_message(&mut self) -> anyhow::Result<Option<Value>>;

    async fn close(self: Box<Self>) -> anyhow::Result<()>;
}

#[async_trait]
pub trait PubSub: Send + Sync {
    async fn publish(&self, channel: &str, message: Value) -> anyhow::Result<()>;

    /// Opens a fresh per-connection subscription context.
    async fn connect(&self) -> anyhow::Result<Box<dyn PubSubConnection>>;
}
