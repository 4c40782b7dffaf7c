//! In-process broker with AMQP-like semantics.
//!
//! Queues are FIFO. Each consumer has a prefetch window bounding its
//! unsettled deliveries. A requeued message goes back to the head of its
//! queue with `redelivered` set and its delivery count bumped; a rejected one
//! moves to the queue's dead-letter queue if it has one.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{Acknowledge, BrokerError, Delivery, DeliveryHandle, MessageSource, Publisher};

#[derive(Debug, Clone)]
struct Message {
    payload: Vec<u8>,
    attempts: u32,
}

#[derive(Debug, Default)]
struct Queue {
    ready: VecDeque<Message>,
    dead_letter: Option<String>,
}

#[derive(Debug)]
struct Unsettled {
    queue: String,
    message: Message,
}

#[derive(Debug, Default)]
struct State {
    queues: HashMap<String, Queue>,
    unsettled: HashMap<u64, Unsettled>,
    next_tag: u64,
    closed: bool,
    /// Number of upcoming publishes to reject, for failure injection.
    reject_publishes: usize,
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<State>,
    notify: Notify,
}

/// Cheaply cloneable handle to a shared in-memory broker.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Declare a queue (idempotent). `dead_letter` names the queue that
    /// receives rejected messages; it is declared too.
    pub fn declare_queue(&self, name: &str, dead_letter: Option<&str>) {
        let mut state = self.lock();
        if let Some(dlq) = dead_letter {
            state.queues.entry(dlq.to_string()).or_default();
        }
        let queue = state.queues.entry(name.to_string()).or_default();
        if dead_letter.is_some() {
            queue.dead_letter = dead_letter.map(str::to_string);
        }
    }

    pub fn publish_to(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError> {
        {
            let mut state = self.lock();
            if state.reject_publishes > 0 {
                state.reject_publishes -= 1;
                return Err(BrokerError::PublishRejected(format!(
                    "injected failure publishing to {}",
                    queue
                )));
            }
            let target = state
                .queues
                .get_mut(queue)
                .ok_or_else(|| BrokerError::UnknownQueue(queue.to_string()))?;
            target.ready.push_back(Message {
                payload: payload.to_vec(),
                attempts: 0,
            });
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }

    /// Reject the next `count` publishes, as a broker refusing writes would.
    pub fn reject_next_publishes(&self, count: usize) {
        self.lock().reject_publishes = count;
    }

    pub fn publisher(&self, queue: &str) -> MemoryPublisher {
        MemoryPublisher {
            broker: self.clone(),
            queue: queue.to_string(),
        }
    }

    /// A consumer on `queue` with at most `prefetch` unsettled deliveries.
    pub fn consumer(&self, queue: &str, prefetch: usize) -> MemoryConsumer {
        MemoryConsumer {
            broker: self.clone(),
            queue: queue.to_string(),
            prefetch: prefetch.max(1),
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of messages waiting on `queue`.
    pub fn ready_count(&self, queue: &str) -> usize {
        self.lock().queues.get(queue).map_or(0, |q| q.ready.len())
    }

    /// Number of delivered messages not yet acked or nacked.
    pub fn unsettled_count(&self) -> usize {
        self.lock().unsettled.len()
    }

    /// Remove and return every message waiting on `queue`.
    pub fn drain(&self, queue: &str) -> Vec<Vec<u8>> {
        self.lock()
            .queues
            .get_mut(queue)
            .map(|q| q.ready.drain(..).map(|m| m.payload).collect())
            .unwrap_or_default()
    }

    /// Signal end of input: consumers return `None` once their queue is
    /// empty and their own deliveries are settled.
    pub fn close(&self) {
        self.lock().closed = true;
        self.inner.notify.notify_waiters();
    }

    fn settle(&self, tag: u64, outcome: Outcome) -> Result<(), BrokerError> {
        {
            let mut state = self.lock();
            let Unsettled { queue, mut message } = state
                .unsettled
                .remove(&tag)
                .ok_or(BrokerError::AlreadyAcknowledged(tag))?;
            match outcome {
                Outcome::Ack => {}
                Outcome::Requeue => {
                    message.attempts += 1;
                    if let Some(q) = state.queues.get_mut(&queue) {
                        q.ready.push_front(message);
                    }
                }
                Outcome::Reject => {
                    let dead_letter = state
                        .queues
                        .get(&queue)
                        .and_then(|q| q.dead_letter.clone());
                    let target = match dead_letter {
                        Some(dlq) => state.queues.get_mut(&dlq),
                        None => None,
                    };
                    match target {
                        Some(dlq) => dlq.ready.push_back(Message {
                            payload: message.payload,
                            attempts: 0,
                        }),
                        None => {
                            tracing::debug!(
                                queue = %queue,
                                delivery_tag = tag,
                                "Dropped rejected message"
                            );
                        }
                    }
                }
            }
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Ack,
    Requeue,
    Reject,
}

pub struct MemoryPublisher {
    broker: MemoryBroker,
    queue: String,
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, payload: &[u8]) -> Result<(), BrokerError> {
        self.broker.publish_to(&self.queue, payload)
    }
}

pub struct MemoryConsumer {
    broker: MemoryBroker,
    queue: String,
    prefetch: usize,
    outstanding: Arc<AtomicUsize>,
}

impl MemoryConsumer {
    fn try_take(&self) -> Result<Option<DeliveryHandle>, BrokerError> {
        let mut state = self.broker.lock();
        if self.outstanding.load(Ordering::SeqCst) >= self.prefetch {
            return Ok(None);
        }
        let queue = state
            .queues
            .get_mut(&self.queue)
            .ok_or_else(|| BrokerError::UnknownQueue(self.queue.clone()))?;
        let Some(message) = queue.ready.pop_front() else {
            return Ok(None);
        };

        state.next_tag += 1;
        let tag = state.next_tag;
        let delivery = Delivery {
            payload: message.payload.clone(),
            delivery_tag: tag,
            redelivered: message.attempts > 0,
            delivery_count: Some(message.attempts),
        };
        state.unsettled.insert(
            tag,
            Unsettled {
                queue: self.queue.clone(),
                message,
            },
        );
        self.outstanding.fetch_add(1, Ordering::SeqCst);

        let acker = MemoryAck {
            broker: self.broker.clone(),
            tag,
            outstanding: self.outstanding.clone(),
        };
        Ok(Some(DeliveryHandle::new(delivery, Box::new(acker))))
    }

    fn is_finished(&self) -> bool {
        let state = self.broker.lock();
        state.closed
            && state.queues.get(&self.queue).map_or(true, |q| q.ready.is_empty())
            && self.outstanding.load(Ordering::SeqCst) == 0
    }
}

#[async_trait]
impl MessageSource for MemoryConsumer {
    async fn recv(&mut self) -> Result<Option<DeliveryHandle>, BrokerError> {
        loop {
            let notified = self.broker.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(handle) = self.try_take()? {
                return Ok(Some(handle));
            }
            if self.is_finished() {
                return Ok(None);
            }
            notified.await;
        }
    }
}

struct MemoryAck {
    broker: MemoryBroker,
    tag: u64,
    outstanding: Arc<AtomicUsize>,
}

impl MemoryAck {
    fn settle(&self, outcome: Outcome) -> Result<(), BrokerError> {
        self.broker.settle(self.tag, outcome)?;
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        self.broker.inner.notify.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl Acknowledge for MemoryAck {
    async fn ack(&self) -> Result<(), BrokerError> {
        self.settle(Outcome::Ack)
    }

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        self.settle(if requeue {
            Outcome::Requeue
        } else {
            Outcome::Reject
        })
    }
}
