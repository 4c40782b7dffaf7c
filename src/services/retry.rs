//! Per-document retry accounting.
//!
//! Classic RabbitMQ queues only flag a redelivery, they don't count it, so
//! transient failures are also counted here by document id. The attempt
//! number used for the retry bound is the larger of the two counts.

use std::collections::HashMap;
use std::sync::Mutex;

/// Entries kept before the tracker forgets the oldest half.
const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug)]
pub struct RetryTracker {
    failures: Mutex<HashMap<String, Entry>>,
    capacity: usize,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    failures: u32,
    touched: u64,
}

impl Default for RetryTracker {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl RetryTracker {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            failures: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// The 1-based attempt number of the current delivery of `id`.
    ///
    /// `broker_count` is the number of earlier deliveries the broker reports.
    pub fn attempt(&self, id: &str, broker_count: u32) -> u32 {
        let tracked = self
            .lock()
            .get(id)
            .map(|entry| entry.failures)
            .unwrap_or(0);
        tracked.max(broker_count) + 1
    }

    /// Remember that `attempt` of `id` failed transiently.
    pub fn record_failure(&self, id: &str, attempt: u32) {
        let mut failures = self.lock();
        let clock = failures
            .values()
            .map(|entry| entry.touched)
            .max()
            .unwrap_or(0)
            + 1;

        if failures.len() >= self.capacity && !failures.contains_key(id) {
            evict_oldest_half(&mut failures);
        }

        let entry = failures.entry(id.to_string()).or_insert(Entry {
            failures: 0,
            touched: clock,
        });
        entry.failures = entry.failures.max(attempt);
        entry.touched = clock;
    }

    /// Forget `id` once its delivery has been settled for good.
    pub fn clear(&self, id: &str) {
        self.lock().remove(id);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn evict_oldest_half(failures: &mut HashMap<String, Entry>) {
    let mut ages: Vec<u64> = failures.values().map(|entry| entry.touched).collect();
    ages.sort_unstable();
    let cutoff = ages[ages.len() / 2];
    failures.retain(|_, entry| entry.touched >= cutoff);
    tracing::debug!(remaining = failures.len(), "Trimmed retry tracker");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_uses_larger_count() {
        let tracker = RetryTracker::default();
        assert_eq!(tracker.attempt("d1", 0), 1);

        tracker.record_failure("d1", 1);
        assert_eq!(tracker.attempt("d1", 0), 2);
        // Broker knows about more deliveries than we do, e.g. after a restart.
        assert_eq!(tracker.attempt("d1", 4), 5);

        tracker.clear("d1");
        assert_eq!(tracker.attempt("d1", 0), 1);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_failures_never_decrease() {
        let tracker = RetryTracker::default();
        tracker.record_failure("d", 3);
        tracker.record_failure("d", 2);
        assert_eq!(tracker.attempt("d", 0), 4);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let tracker = RetryTracker::with_capacity(4);
        for id in ["a", "b", "c", "d"] {
            tracker.record_failure(id, 1);
        }
        tracker.record_failure("e", 1);
        assert!(tracker.len() <= 4);
        assert_eq!(tracker.attempt("e", 0), 2);
        assert_eq!(tracker.attempt("a", 0), 1);
    }
}
