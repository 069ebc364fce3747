use roster_common::JobMessage;
use std::sync::Arc;
use tracing::info;

use super::{ChannelProvider, QueueError};

/// Enqueues new import jobs on their entity type's work queue
#[derive(Clone)]
pub struct JobPublisher {
    channels: Arc<dyn ChannelProvider>,
}

impl JobPublisher {
    pub fn new(channels: Arc<dyn ChannelProvider>) -> Self {
        Self { channels }
    }

    pub async fn publish(&self, message: &JobMessage) -> Result<(), QueueError> {
        let body = message.to_vec()?;
        let queue = message.entity_type.queue_name();

        self.channels.channel().await?.publish(queue, &body, 0).await?;

        info!(job_id = %message.job_id, queue, total_rows = message.total_rows, "Published import job");
        Ok(())
    }
}
