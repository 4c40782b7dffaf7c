//! Delivery handle: a received message plus its acknowledgement channel.

use super::error::BrokerError;
use super::{Acknowledge, Delivery};

/// A delivery awaiting a disposition. Move semantics: consumed by `ack()` or
/// `nack()`.
///
/// If dropped without being consumed, logs a warning and requeues the
/// message so it is not stranded until the connection closes.
pub struct DeliveryHandle {
    pub delivery: Delivery,
    acker: Option<Box<dyn Acknowledge>>,
}

impl DeliveryHandle {
    pub fn new(delivery: Delivery, acker: Box<dyn Acknowledge>) -> Self {
        Self {
            delivery,
            acker: Some(acker),
        }
    }

    /// Acknowledge successful processing; the broker forgets the message.
    pub async fn ack(mut self) -> Result<Delivery, BrokerError> {
        let acker = self
            .acker
            .take()
            .ok_or(BrokerError::AlreadyAcknowledged(self.delivery.delivery_tag))?;
        acker.ack().await?;
        Ok(self.take_delivery())
    }

    /// Reject the message. `requeue` puts it back on its queue; otherwise it
    /// is dead-lettered (or dropped when the queue has no dead-letter route).
    pub async fn nack(mut self, requeue: bool) -> Result<Delivery, BrokerError> {
        let acker = self
            .acker
            .take()
            .ok_or(BrokerError::AlreadyAcknowledged(self.delivery.delivery_tag))?;
        acker.nack(requeue).await?;
        Ok(self.take_delivery())
    }

    fn take_delivery(&mut self) -> Delivery {
        std::mem::take(&mut self.delivery)
    }
}

impl Drop for DeliveryHandle {
    fn drop(&mut self) {
        let Some(acker) = self.acker.take() else {
            return;
        };
        tracing::warn!(
            delivery_tag = self.delivery.delivery_tag,
            "DeliveryHandle dropped without ack or nack, requeueing"
        );
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = acker.nack(true).await {
                    tracing::warn!("Failed to requeue dropped delivery: {}", e);
                }
            });
        }
    }
}
