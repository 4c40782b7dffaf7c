//! RabbitMQ backend built on lapin.
//!
//! Consumers run with manual acknowledgement and a prefetch window;
//! publishers use publisher confirms so `publish` only returns once the
//! broker has taken responsibility for the message. Messages are persistent.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};

use super::{
    redact_url, Acknowledge, BrokerError, Delivery, DeliveryHandle, MessageSource, Publisher,
};

const PERSISTENT: u8 = 2;
const DELIVERY_COUNT_HEADER: &str = "x-delivery-count";

/// A connection to RabbitMQ.
pub struct AmqpBroker {
    connection: Connection,
    channel: Channel,
}

impl AmqpBroker {
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| BrokerError::Connection(format!("{}: {}", redact_url(url), e)))?;
        let channel = connection.create_channel().await?;
        tracing::info!(url = %redact_url(url), "Connected to AMQP broker");
        Ok(Self {
            connection,
            channel,
        })
    }

    /// Declare a durable queue, routing rejected messages to `dead_letter`
    /// through the default exchange when given.
    pub async fn declare_queue(
        &self,
        name: &str,
        dead_letter: Option<&str>,
    ) -> Result<(), BrokerError> {
        let durable = QueueDeclareOptions {
            durable: true,
            ..Default::default()
        };

        let mut arguments = FieldTable::default();
        if let Some(dlq) = dead_letter {
            self.channel
                .queue_declare(dlq, durable, FieldTable::default())
                .await?;
            arguments.insert(
                ShortString::from("x-dead-letter-exchange"),
                AMQPValue::LongString(LongString::from("")),
            );
            arguments.insert(
                ShortString::from("x-dead-letter-routing-key"),
                AMQPValue::LongString(LongString::from(dlq)),
            );
        }

        self.channel.queue_declare(name, durable, arguments).await?;
        tracing::debug!(queue = name, dead_letter = ?dead_letter, "Declared queue");
        Ok(())
    }

    /// Start consuming `queue` with at most `prefetch` unacknowledged messages.
    pub async fn consumer(&self, queue: &str, prefetch: u16) -> Result<AmqpConsumer, BrokerError> {
        let channel = self.connection.create_channel().await?;
        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await?;
        let consumer_tag = format!("nlpipe-{}", uuid::Uuid::new_v4());
        let consumer = channel
            .basic_consume(
                queue,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        tracing::info!(queue, prefetch, consumer_tag = %consumer_tag, "Consuming");
        Ok(AmqpConsumer {
            _channel: channel,
            consumer,
        })
    }

    /// A confirming publisher for `queue` on its own channel.
    pub async fn publisher(&self, queue: &str) -> Result<AmqpPublisher, BrokerError> {
        let channel = self.connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        Ok(AmqpPublisher {
            channel,
            queue: queue.to_string(),
        })
    }

    pub async fn close(&self) -> Result<(), BrokerError> {
        self.connection.close(200, "shutdown").await?;
        Ok(())
    }
}

fn header_count(value: &AMQPValue) -> Option<u32> {
    let count: i64 = match value {
        AMQPValue::ShortShortInt(v) => (*v).into(),
        AMQPValue::ShortShortUInt(v) => (*v).into(),
        AMQPValue::ShortInt(v) => (*v).into(),
        AMQPValue::ShortUInt(v) => (*v).into(),
        AMQPValue::LongInt(v) => (*v).into(),
        AMQPValue::LongUInt(v) => (*v).into(),
        AMQPValue::LongLongInt(v) => *v,
        _ => return None,
    };
    u32::try_from(count).ok()
}

fn delivery_count(properties: &BasicProperties) -> Option<u32> {
    properties
        .headers()
        .as_ref()
        .and_then(|headers| headers.inner().get(DELIVERY_COUNT_HEADER))
        .and_then(header_count)
}

pub struct AmqpConsumer {
    _channel: Channel,
    consumer: Consumer,
}

#[async_trait]
impl MessageSource for AmqpConsumer {
    async fn recv(&mut self) -> Result<Option<DeliveryHandle>, BrokerError> {
        let Some(next) = self.consumer.next().await else {
            return Ok(None);
        };
        let delivery = next?;
        let handle = DeliveryHandle::new(
            Delivery {
                delivery_count: delivery_count(&delivery.properties),
                payload: delivery.data,
                delivery_tag: delivery.delivery_tag,
                redelivered: delivery.redelivered,
            },
            Box::new(delivery.acker),
        );
        Ok(Some(handle))
    }
}

#[async_trait]
impl Acknowledge for Acker {
    async fn ack(&self) -> Result<(), BrokerError> {
        Acker::ack(self, BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        Acker::nack(
            self,
            BasicNackOptions {
                requeue,
                ..Default::default()
            },
        )
        .await?;
        Ok(())
    }
}

pub struct AmqpPublisher {
    channel: Channel,
    queue: String,
}

#[async_trait]
impl Publisher for AmqpPublisher {
    async fn publish(&self, payload: &[u8]) -> Result<(), BrokerError> {
        if !self.channel.status().connected() {
            return Err(BrokerError::Closed);
        }
        let properties = BasicProperties::default()
            .with_content_type(ShortString::from("application/json"))
            .with_delivery_mode(PERSISTENT);
        let confirmation = self
            .channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await?
            .await?;
        if confirmation.is_nack() {
            return Err(BrokerError::PublishRejected(format!(
                "broker nacked publish to {}",
                self.queue
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_count_header() {
        let mut headers = FieldTable::default();
        headers.insert(
            ShortString::from(DELIVERY_COUNT_HEADER),
            AMQPValue::LongLongInt(3),
        );
        let properties = BasicProperties::default().with_headers(headers);
        assert_eq!(delivery_count(&properties), Some(3));
        assert_eq!(delivery_count(&BasicProperties::default()), None);
        assert_eq!(header_count(&AMQPValue::LongInt(-1)), None);
    }
}
