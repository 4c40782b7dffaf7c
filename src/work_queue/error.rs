//! Broker error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[cfg(feature = "amqp-broker")]
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Publish rejected: {0}")]
    PublishRejected(String),
    #[error("Delivery {0} already acknowledged")]
    AlreadyAcknowledged(u64),
    #[error("Queue not declared: {0}")]
    UnknownQueue(String),
    #[error("Broker closed")]
    Closed,
}
