//! Recording in-memory channel
//!
//! Stands in for the broker in tests and when running without one: every
//! publish and settlement is kept for inspection.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ChannelProvider, MessageChannel, QueueError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub queue: String,
    pub payload: Vec<u8>,
    pub retry_count: u32,
}

/// How a delivery was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Ack,
    Nack { requeue: bool },
}

#[derive(Debug, Default)]
struct Recorded {
    published: Vec<PublishedMessage>,
    settlements: Vec<(u64, Settlement)>,
    publish_failure: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryChannel {
    inner: Arc<Mutex<Recorded>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make publishes fail with `reason` until cleared
    pub fn fail_publishes(&self, reason: Option<&str>) {
        self.recorded().publish_failure = reason.map(str::to_string);
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.recorded().published.clone()
    }

    /// Remove and return everything published so far
    pub fn take_published(&self) -> Vec<PublishedMessage> {
        std::mem::take(&mut self.recorded().published)
    }

    pub fn settlements(&self) -> Vec<(u64, Settlement)> {
        self.recorded().settlements.clone()
    }

    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MessageChannel for MemoryChannel {
    async fn publish(&self, queue: &str, payload: &[u8], retry_count: u32) -> Result<(), QueueError> {
        let mut recorded = self.recorded();
        if let Some(reason) = &recorded.publish_failure {
            return Err(QueueError::Publish(reason.clone()));
        }
        recorded.published.push(PublishedMessage {
            queue: queue.to_string(),
            payload: payload.to_vec(),
            retry_count,
        });
        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), QueueError> {
        self.recorded().settlements.push((delivery_tag, Settlement::Ack));
        Ok(())
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), QueueError> {
        self.recorded()
            .settlements
            .push((delivery_tag, Settlement::Nack { requeue }));
        Ok(())
    }
}

#[async_trait]
impl ChannelProvider for MemoryChannel {
    async fn channel(&self) -> Result<Arc<dyn MessageChannel>, QueueError> {
        Ok(Arc::new(self.clone()))
    }
}
