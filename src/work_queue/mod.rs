//! Broker abstraction for the receive/ack/nack lifecycle.
//!
//! The relay consumes from a `MessageSource`, publishes results through a
//! `Publisher`, and settles each `DeliveryHandle` exactly once. Two backends
//! implement it: RabbitMQ via lapin (feature `amqp-broker`) and an in-process
//! broker used by tests and the one-shot CLI commands.

mod error;
mod handle;
pub mod memory;

#[cfg(feature = "amqp-broker")]
pub mod amqp;

pub use error::BrokerError;
pub use handle::DeliveryHandle;
pub use memory::MemoryBroker;

use async_trait::async_trait;

/// A message received from the broker.
#[derive(Debug, Clone, Default)]
pub struct Delivery {
    pub payload: Vec<u8>,
    pub delivery_tag: u64,
    /// Whether the broker has delivered this message before.
    pub redelivered: bool,
    /// Number of earlier delivery attempts, when the broker reports it.
    pub delivery_count: Option<u32>,
}

/// Settles one delivery.
#[async_trait]
pub trait Acknowledge: Send + Sync {
    async fn ack(&self) -> Result<(), BrokerError>;

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError>;
}

/// A stream of deliveries from one queue.
#[async_trait]
pub trait MessageSource: Send {
    /// Wait for the next delivery. `Ok(None)` means the source is closed.
    async fn recv(&mut self) -> Result<Option<DeliveryHandle>, BrokerError>;
}

/// Publishes payloads to one queue, returning once the broker has accepted
/// the message.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, payload: &[u8]) -> Result<(), BrokerError>;
}

/// Queue topology the service needs.
#[derive(Debug, Clone)]
pub struct QueueTopology {
    pub input: String,
    pub output: String,
    pub dead_letter: Option<String>,
}

/// Strip credentials from a broker URL for logs and display.
pub fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => {
            format!("{}://***@{}", &url[..scheme], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}
