//! Queue and exchange declarations

use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{Channel, ExchangeKind};
use roster_common::EntityType;
use tracing::debug;

use super::QueueError;

pub const DEAD_LETTER_EXCHANGE: &str = "dlx.exchange";
pub const RETRY_COUNT_HEADER: &str = "x-retry-count";
pub const PREFETCH_COUNT: u16 = 1;

pub fn dead_letter_queue_name(queue: &str) -> String {
    format!("{}.dlq", queue)
}

/// Arguments routing rejected messages to the queue's dead-letter twin
pub fn work_queue_arguments(queue: &str) -> FieldTable {
    let mut arguments = FieldTable::default();
    arguments.insert(
        ShortString::from("x-dead-letter-exchange"),
        AMQPValue::LongString(LongString::from(DEAD_LETTER_EXCHANGE)),
    );
    arguments.insert(
        ShortString::from("x-dead-letter-routing-key"),
        AMQPValue::LongString(LongString::from(queue)),
    );
    arguments
}

fn durable_queue() -> QueueDeclareOptions {
    QueueDeclareOptions {
        durable: true,
        ..QueueDeclareOptions::default()
    }
}

/// Declare the dead-letter exchange and every work/dead-letter queue pair
///
/// Declarations are idempotent, so this runs on every (re)connect.
pub async fn declare(channel: &Channel) -> Result<(), QueueError> {
    let durable_exchange = ExchangeDeclareOptions {
        durable: true,
        ..ExchangeDeclareOptions::default()
    };

    channel
        .exchange_declare(
            DEAD_LETTER_EXCHANGE,
            ExchangeKind::Direct,
            durable_exchange,
            FieldTable::default(),
        )
        .await?;

    for entity_type in EntityType::ALL {
        let queue = entity_type.queue_name();
        let dlq = dead_letter_queue_name(queue);

        channel
            .queue_declare(&dlq, durable_queue(), FieldTable::default())
            .await?;
        channel
            .queue_bind(
                &dlq,
                DEAD_LETTER_EXCHANGE,
                queue,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_declare(queue, durable_queue(), work_queue_arguments(queue))
            .await?;

        debug!(queue, dlq = %dlq, "Declared queue pair");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dead_letter_names() {
        assert_eq!(dead_letter_queue_name("class_import"), "class_import.dlq");
    }

    #[test]
    fn test_work_queue_routes_to_own_dlq() {
        let arguments = work_queue_arguments("room_import");
        let inner = arguments.inner();

        assert_eq!(
            inner.get(&ShortString::from("x-dead-letter-exchange")),
            Some(&AMQPValue::LongString(LongString::from("dlx.exchange")))
        );
        assert_eq!(
            inner.get(&ShortString::from("x-dead-letter-routing-key")),
            Some(&AMQPValue::LongString(LongString::from("room_import")))
        );
    }
}
