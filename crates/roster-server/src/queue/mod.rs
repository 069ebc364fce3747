//! Message queue client
//!
//! One durable work queue per entity type, each dead-lettering into its own
//! `<queue>.dlq` through a shared direct exchange. The worker and the
//! publisher talk to the broker through [`MessageChannel`] so the job flow
//! can run against [`MemoryChannel`] in tests.

pub mod amqp;
pub mod connection;
pub mod memory;
pub mod publisher;
pub mod topology;

use async_trait::async_trait;
use roster_common::RosterError;
use std::sync::Arc;

pub use amqp::AmqpChannel;
pub use connection::{ConnectionManager, ReconnectPolicy};
pub use memory::{MemoryChannel, PublishedMessage, Settlement};
pub use publisher::JobPublisher;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("Queue connection is shut down")]
    ShutDown,

    #[error("Gave up reconnecting to the broker after {0} attempts")]
    ReconnectExhausted(u32),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] RosterError),

    #[error("Publish failed: {0}")]
    Publish(String),
}

/// A delivery pulled off a work queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub delivery_tag: u64,
    pub queue: String,
    pub body: Vec<u8>,
    pub retry_count: u32,
}

/// Publish and settle operations on one broker channel
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Persistent publish to `queue` with the retry counter header set
    async fn publish(&self, queue: &str, payload: &[u8], retry_count: u32) -> Result<(), QueueError>;

    async fn ack(&self, delivery_tag: u64) -> Result<(), QueueError>;

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), QueueError>;
}

/// Source of a ready-to-use channel
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    async fn channel(&self) -> Result<Arc<dyn MessageChannel>, QueueError>;
}
