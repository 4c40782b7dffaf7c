//! Bounded pool of annotator instances.
//!
//! Each in-flight document holds a `Lease` on one instance, so no instance
//! is shared between concurrent documents. A lease whose instance is lost
//! (its run timed out or panicked) is backfilled from the factory, keeping
//! the pool at full strength.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::services::annotation::Annotator;

/// Builds a fresh annotator instance.
pub type AnnotatorFactory = Arc<dyn Fn() -> Box<dyn Annotator> + Send + Sync>;

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub size: usize,
    /// Instances currently leased.
    pub active: usize,
    /// Highest `active` seen.
    pub peak: usize,
    /// Instances given up on after a timeout or panic.
    pub abandoned: usize,
}

#[derive(Default)]
struct Counters {
    active: AtomicUsize,
    peak: AtomicUsize,
    abandoned: AtomicUsize,
}

pub struct AnnotatorPool {
    size: usize,
    idle: Mutex<Vec<Box<dyn Annotator>>>,
    factory: AnnotatorFactory,
    permits: Arc<Semaphore>,
    counters: Counters,
}

impl AnnotatorPool {
    /// Build `size` instances up front.
    pub fn new(size: usize, factory: AnnotatorFactory) -> Arc<Self> {
        let size = size.max(1);
        let idle = (0..size).map(|_| factory()).collect();
        Arc::new(Self {
            size,
            idle: Mutex::new(idle),
            factory,
            permits: Arc::new(Semaphore::new(size)),
            counters: Counters::default(),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Wait for a free instance.
    pub async fn lease(self: &Arc<Self>) -> Lease {
        // The pool never closes its semaphore.
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .expect("annotator pool semaphore closed");

        let annotator = self.take_idle().unwrap_or_else(|| (self.factory)());
        let active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(active, Ordering::SeqCst);

        Lease {
            annotator: Some(annotator),
            abandoned: false,
            pool: Arc::clone(self),
            _permit: permit,
        }
    }

    fn take_idle(&self) -> Option<Box<dyn Annotator>> {
        self.idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop()
    }

    fn put_idle(&self, annotator: Box<dyn Annotator>) {
        self.idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(annotator);
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.size,
            active: self.counters.active.load(Ordering::SeqCst),
            peak: self.counters.peak.load(Ordering::SeqCst),
            abandoned: self.counters.abandoned.load(Ordering::SeqCst),
        }
    }
}

/// Exclusive use of one annotator instance.
pub struct Lease {
    annotator: Option<Box<dyn Annotator>>,
    abandoned: bool,
    pool: Arc<AnnotatorPool>,
    _permit: OwnedSemaphorePermit,
}

impl Lease {
    /// Move the instance out, e.g. into a blocking task.
    pub fn take(&mut self) -> Option<Box<dyn Annotator>> {
        self.annotator.take()
    }

    /// Hand the instance back after a clean run.
    pub fn restore(&mut self, annotator: Box<dyn Annotator>) {
        self.annotator = Some(annotator);
    }

    /// Give up on the instance; the pool builds a replacement.
    pub fn abandon(&mut self) {
        self.abandoned = true;
        self.annotator = None;
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let annotator = match self.annotator.take() {
            Some(annotator) => annotator,
            None => {
                if self.abandoned {
                    self.pool.counters.abandoned.fetch_add(1, Ordering::SeqCst);
                } else {
                    tracing::warn!("Lease dropped without its annotator; rebuilding");
                }
                (self.pool.factory)()
            }
        };
        self.pool.put_idle(annotator);
        self.pool.counters.active.fetch_sub(1, Ordering::SeqCst);
    }
}
