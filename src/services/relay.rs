//! Broker relay: deliveries in, annotation results out.
//!
//! Every delivery ends in exactly one disposition:
//!
//! | outcome                                 | broker action            |
//! |-----------------------------------------|--------------------------|
//! | ok / partial, published                 | ack                      |
//! | ok / partial, publish failed, in bound  | nack, requeue            |
//! | ok / partial, publish failed, exhausted | nack                     |
//! | transient failure within retry bound    | nack, requeue            |
//! | transient failure, retries exhausted    | publish failed, nack     |
//! | deterministic failure                   | publish failed, nack     |
//! | malformed payload                       | nack                     |
//!
//! Publish failures and transient failures share one retry budget per
//! document. A plain nack (no requeue) dead-letters the message when the
//! input queue has a dead-letter route.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::models::{peek_id, AnnotationResult, InboundMessage, OutboundMessage};
use crate::services::annotation::FailureKind;
use crate::services::coordinator::Coordinator;
use crate::services::retry::RetryTracker;
use crate::work_queue::{BrokerError, DeliveryHandle, MessageSource, Publisher};

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Result published and the delivery acknowledged.
    Completed,
    /// Returned to the queue for another attempt.
    Requeued,
    /// Rejected without requeue.
    DeadLettered,
}

#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Redeliveries allowed after a transient failure.
    pub max_retries: u32,
    /// Publish a `failed` result before dead-lettering a decoded document.
    pub publish_failures: bool,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            publish_failures: true,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    completed: AtomicU64,
    requeued: AtomicU64,
    dead_lettered: AtomicU64,
    malformed: AtomicU64,
    publish_errors: AtomicU64,
}

/// Snapshot of relay activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub received: u64,
    pub completed: u64,
    pub requeued: u64,
    pub dead_lettered: u64,
    pub malformed: u64,
    pub publish_errors: u64,
}

pub struct Relay {
    coordinator: Arc<Coordinator>,
    publisher: Arc<dyn Publisher>,
    retries: RetryTracker,
    options: RelayOptions,
    counters: Counters,
}

impl Relay {
    pub fn new(
        coordinator: Arc<Coordinator>,
        publisher: Arc<dyn Publisher>,
        options: RelayOptions,
    ) -> Self {
        Self {
            coordinator,
            publisher,
            retries: RetryTracker::default(),
            options,
            counters: Counters::default(),
        }
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Consume `source` until it closes or `shutdown` flips to `true`, then
    /// wait for in-flight documents to settle.
    ///
    /// Admission is taken before each receive, so at most
    /// `workers + queue_capacity` deliveries are held at once.
    pub async fn run<S>(
        self: Arc<Self>,
        mut source: S,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<RelayStats, BrokerError>
    where
        S: MessageSource,
    {
        let mut in_flight = JoinSet::new();
        let mut outcome = Ok(());

        loop {
            let permit = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                permit = self.coordinator.admit() => permit,
            };

            let next = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                next = source.recv() => next,
            };

            let handle = match next {
                Ok(Some(handle)) => handle,
                Ok(None) => {
                    tracing::info!("Input closed");
                    break;
                }
                Err(e) => {
                    tracing::error!("Failed to receive from broker: {}", e);
                    outcome = Err(e);
                    break;
                }
            };

            let relay = Arc::clone(&self);
            in_flight.spawn(async move {
                let _permit = permit;
                relay.handle(handle).await
            });

            while let Some(joined) = in_flight.try_join_next() {
                log_join(joined);
            }
        }

        if !in_flight.is_empty() {
            tracing::info!(in_flight = in_flight.len(), "Draining in-flight documents");
        }
        while let Some(joined) = in_flight.join_next().await {
            log_join(joined);
        }

        let stats = self.stats();
        tracing::info!(
            received = stats.received,
            completed = stats.completed,
            requeued = stats.requeued,
            dead_lettered = stats.dead_lettered,
            "Relay stopped"
        );
        outcome.map(|()| stats)
    }

    /// Process one delivery and settle it with the broker.
    pub async fn handle(&self, handle: DeliveryHandle) -> Disposition {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        let delivery_tag = handle.delivery.delivery_tag;

        let message = match InboundMessage::decode(&handle.delivery.payload) {
            Ok(message) => message,
            Err(e) => {
                self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    delivery_tag,
                    document_id = ?peek_id(&handle.delivery.payload),
                    "Rejecting malformed payload: {}",
                    e
                );
                return self.dead_letter(handle, "", None).await;
            }
        };

        let id = message.id.clone();
        let broker_count = handle.delivery.delivery_count.unwrap_or(0);
        let attempt = self.retries.attempt(&id, broker_count);
        tracing::debug!(document_id = %id, attempt, delivery_tag, "Received document");

        match self.coordinator.submit(message.into_document()).await {
            Ok(result) => match self.publish(&result).await {
                Ok(()) => {
                    self.retries.clear(&id);
                    self.settle(handle, &id, Settlement::Ack).await
                }
                Err(e) if attempt <= self.options.max_retries => {
                    tracing::warn!(document_id = %id, attempt, "Publish failed, requeueing: {}", e);
                    self.retries.record_failure(&id, attempt);
                    self.settle(handle, &id, Settlement::Requeue).await
                }
                Err(e) => {
                    tracing::error!(
                        document_id = %id,
                        attempt,
                        "Publish failed, retries exhausted: {}",
                        e
                    );
                    self.retries.clear(&id);
                    self.settle(handle, &id, Settlement::Reject).await
                }
            },
            Err(error) => {
                let kind = error.kind();
                if kind == FailureKind::Transient && attempt <= self.options.max_retries {
                    tracing::warn!(
                        document_id = %id,
                        attempt,
                        max_retries = self.options.max_retries,
                        "Transient failure, requeueing: {}",
                        error
                    );
                    self.retries.record_failure(&id, attempt);
                    return self.settle(handle, &id, Settlement::Requeue).await;
                }

                if kind == FailureKind::Transient {
                    tracing::error!(document_id = %id, attempt, "Retries exhausted: {}", error);
                } else {
                    tracing::error!(document_id = %id, attempt, "Document failed: {}", error);
                }
                self.retries.clear(&id);
                let partial = error.into_partial();
                self.dead_letter(handle, &id, Some(&partial)).await
            }
        }
    }

    async fn publish(&self, result: &AnnotationResult) -> Result<(), BrokerError> {
        let payload = OutboundMessage::from(result)
            .encode()
            .map_err(|e| BrokerError::PublishRejected(format!("encode failed: {}", e)))?;
        self.publisher.publish(&payload).await.inspect_err(|_| {
            self.counters.publish_errors.fetch_add(1, Ordering::Relaxed);
        })
    }

    /// Reject a delivery for good, reporting the failed result first when
    /// there is one.
    async fn dead_letter(
        &self,
        handle: DeliveryHandle,
        id: &str,
        failed: Option<&AnnotationResult>,
    ) -> Disposition {
        if let (Some(result), true) = (failed, self.options.publish_failures) {
            if let Err(e) = self.publish(result).await {
                tracing::warn!(document_id = %id, "Could not publish failed result: {}", e);
            }
        }
        self.settle(handle, id, Settlement::Reject).await
    }

    async fn settle(&self, handle: DeliveryHandle, id: &str, settlement: Settlement) -> Disposition {
        let delivery_tag = handle.delivery.delivery_tag;
        let (result, disposition) = match settlement {
            Settlement::Ack => (handle.ack().await, Disposition::Completed),
            Settlement::Requeue => (handle.nack(true).await, Disposition::Requeued),
            Settlement::Reject => (handle.nack(false).await, Disposition::DeadLettered),
        };
        if let Err(e) = result {
            tracing::warn!(document_id = %id, delivery_tag, "Failed to settle delivery: {}", e);
        }

        let counter = match disposition {
            Disposition::Completed => &self.counters.completed,
            Disposition::Requeued => &self.counters.requeued,
            Disposition::DeadLettered => &self.counters.dead_lettered,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        disposition
    }

    pub fn stats(&self) -> RelayStats {
        let c = &self.counters;
        RelayStats {
            received: c.received.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            requeued: c.requeued.load(Ordering::Relaxed),
            dead_lettered: c.dead_lettered.load(Ordering::Relaxed),
            malformed: c.malformed.load(Ordering::Relaxed),
            publish_errors: c.publish_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Settlement {
    Ack,
    Requeue,
    Reject,
}

/// Resolves once `true` is sent. A dropped sender never triggers shutdown.
fn shutdown_requested(rx: &mut watch::Receiver<bool>) -> impl Future<Output = ()> + '_ {
    async move {
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

fn log_join(joined: Result<Disposition, tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!("Delivery task failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, ResultStatus};
    use crate::services::annotation::{Annotator, DocumentFailed};
    use crate::services::coordinator::{AnnotatorFactory, CoordinatorOptions};
    use crate::work_queue::MemoryBroker;

    /// Fails transiently on documents whose text is "flaky".
    struct Flaky;

    impl Annotator for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn annotate(&self, document: Document) -> Result<AnnotationResult, DocumentFailed> {
            if document.text() == "flaky" {
                return Err(DocumentFailed {
                    kind: FailureKind::Transient,
                    stage: "pos".to_string(),
                    reason: "model unavailable".to_string(),
                    partial: Box::new(AnnotationResult::finish(document, None)),
                });
            }
            Ok(AnnotationResult::finish(document, None))
        }
    }

    fn relay(broker: &MemoryBroker, max_retries: u32) -> Relay {
        broker.declare_queue("in", Some("dlq"));
        broker.declare_queue("dlq", None);
        broker.declare_queue("out", None);
        let factory: AnnotatorFactory = Arc::new(|| Box::new(Flaky) as Box<dyn Annotator>);
        let coordinator = Coordinator::new(&CoordinatorOptions::default(), factory);
        Relay::new(
            Arc::new(coordinator),
            Arc::new(broker.publisher("out")),
            RelayOptions {
                max_retries,
                publish_failures: true,
            },
        )
    }

    async fn next(broker: &MemoryBroker) -> DeliveryHandle {
        broker
            .consumer("in", 1)
            .recv()
            .await
            .unwrap()
            .expect("a delivery")
    }

    #[tokio::test]
    async fn test_success_publishes_then_acks() {
        let broker = MemoryBroker::new();
        let relay = relay(&broker, 1);
        broker
            .publish_to("in", br#"{"id":"a","text":"fine"}"#)
            .unwrap();

        assert_eq!(relay.handle(next(&broker).await).await, Disposition::Completed);
        let out = broker.drain("out");
        assert_eq!(out.len(), 1);
        assert_eq!(OutboundMessage::decode(&out[0]).unwrap().id, "a");
        assert_eq!(broker.unsettled_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_failure_requeues() {
        let broker = MemoryBroker::new();
        let relay = relay(&broker, 1);
        broker
            .publish_to("in", br#"{"id":"a","text":"fine"}"#)
            .unwrap();
        broker.reject_next_publishes(1);

        assert_eq!(relay.handle(next(&broker).await).await, Disposition::Requeued);
        assert_eq!(broker.ready_count("in"), 1);
        assert_eq!(relay.stats().publish_errors, 1);

        assert_eq!(relay.handle(next(&broker).await).await, Disposition::Completed);
        assert_eq!(broker.drain("out").len(), 1);
    }

    #[tokio::test]
    async fn test_persistent_publish_failure_is_bounded() {
        let broker = MemoryBroker::new();
        let relay = relay(&broker, 2);
        broker
            .publish_to("in", br#"{"id":"a","text":"fine"}"#)
            .unwrap();
        broker.reject_next_publishes(1_000);

        let mut dispositions = Vec::new();
        for _ in 0..10 {
            if broker.ready_count("in") == 0 {
                break;
            }
            dispositions.push(relay.handle(next(&broker).await).await);
        }

        assert_eq!(
            dispositions,
            vec![
                Disposition::Requeued,
                Disposition::Requeued,
                Disposition::DeadLettered
            ]
        );
        assert_eq!(broker.ready_count("in"), 0);
        assert_eq!(broker.ready_count("dlq"), 1);
        assert_eq!(relay.stats().publish_errors, 3);
        assert_eq!(broker.unsettled_count(), 0);
    }

    #[tokio::test]
    async fn test_transient_failure_is_bounded() {
        let broker = MemoryBroker::new();
        let relay = relay(&broker, 2);
        broker
            .publish_to("in", br#"{"id":"f","text":"flaky"}"#)
            .unwrap();

        assert_eq!(relay.handle(next(&broker).await).await, Disposition::Requeued);
        assert_eq!(relay.handle(next(&broker).await).await, Disposition::Requeued);
        assert_eq!(relay.handle(next(&broker).await).await, Disposition::DeadLettered);

        assert_eq!(broker.ready_count("in"), 0);
        assert_eq!(broker.ready_count("dlq"), 1);
        let out = broker.drain("out");
        assert_eq!(out.len(), 1);
        let failed = OutboundMessage::decode(&out[0]).unwrap();
        assert_eq!(failed.status, ResultStatus::Failed);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dead_lettered_silently() {
        let broker = MemoryBroker::new();
        let relay = relay(&broker, 3);
        broker.publish_to("in", br#"{"id":"d2"}"#).unwrap();

        assert_eq!(relay.handle(next(&broker).await).await, Disposition::DeadLettered);
        assert!(broker.drain("out").is_empty());
        assert_eq!(broker.ready_count("dlq"), 1);
        assert_eq!(relay.stats().malformed, 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_consuming() {
        let broker = MemoryBroker::new();
        let relay = Arc::new(relay(&broker, 1));
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        broker
            .publish_to("in", br#"{"id":"a","text":"fine"}"#)
            .unwrap();
        let stats = relay.run(broker.consumer("in", 8), rx).await.unwrap();
        assert_eq!(stats.received, 0);
        assert_eq!(broker.ready_count("in"), 1);
    }
}
