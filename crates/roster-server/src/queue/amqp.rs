//! `MessageChannel` over a lapin channel

use async_trait::async_trait;
use lapin::options::{BasicAckOptions, BasicNackOptions, BasicPublishOptions};
use lapin::types::{AMQPValue, FieldTable, ShortString};
use lapin::{BasicProperties, Channel};

use super::topology::RETRY_COUNT_HEADER;
use super::{MessageChannel, QueueError};

const PERSISTENT: u8 = 2;
const CONTENT_TYPE: &str = "application/json";

#[derive(Clone)]
pub struct AmqpChannel {
    channel: Channel,
}

impl AmqpChannel {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    pub fn inner(&self) -> &Channel {
        &self.channel
    }
}

#[async_trait]
impl MessageChannel for AmqpChannel {
    async fn publish(&self, queue: &str, payload: &[u8], retry_count: u32) -> Result<(), QueueError> {
        let mut headers = FieldTable::default();
        headers.insert(
            ShortString::from(RETRY_COUNT_HEADER),
            AMQPValue::LongInt(i32::try_from(retry_count).unwrap_or(i32::MAX)),
        );
        let properties = BasicProperties::default()
            .with_delivery_mode(PERSISTENT)
            .with_content_type(ShortString::from(CONTENT_TYPE))
            .with_headers(headers);

        // Default exchange: the routing key is the queue name
        let confirm = self
            .channel
            .basic_publish("", queue, BasicPublishOptions::default(), payload, properties)
            .await?;
        let confirmation = confirm.await?;
        if confirmation.is_nack() {
            return Err(QueueError::Publish(format!("broker rejected message for {}", queue)));
        }

        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), QueueError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await?;
        Ok(())
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), QueueError> {
        self.channel
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    multiple: false,
                    requeue,
                },
            )
            .await?;
        Ok(())
    }
}

/// Retry counter carried in the message headers, 0 when absent or not an integer
pub fn retry_count_from_headers(headers: Option<&FieldTable>) -> u32 {
    let Some(value) = headers.and_then(|h| {
        h.inner()
            .iter()
            .find(|(key, _)| key.as_str() == RETRY_COUNT_HEADER)
            .map(|(_, value)| value)
    }) else {
        return 0;
    };

    let count: i64 = match value {
        AMQPValue::ShortShortInt(v) => i64::from(*v),
        AMQPValue::ShortShortUInt(v) => i64::from(*v),
        AMQPValue::ShortInt(v) => i64::from(*v),
        AMQPValue::ShortUInt(v) => i64::from(*v),
        AMQPValue::LongInt(v) => i64::from(*v),
        AMQPValue::LongUInt(v) => i64::from(*v),
        AMQPValue::LongLongInt(v) => *v,
        _ => 0,
    };

    u32::try_from(count).unwrap_or(0)
}
