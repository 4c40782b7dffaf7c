//! Runs documents through a bounded pool of annotators.
//!
//! Annotation is CPU-bound, so each document runs on the blocking thread
//! pool with an exclusively leased annotator. A separate admission semaphore
//! caps how many documents may be accepted but not yet finished
//! (`workers + queue_capacity`); the relay takes an admission permit before
//! pulling the next delivery, which is how backpressure reaches the broker.

mod pool;

pub use pool::{AnnotatorFactory, AnnotatorPool, Lease, PoolStats};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::models::{AnnotationResult, Document, DocumentStatus, StageErrorRecord};
use crate::services::annotation::{DocumentFailed, FailureKind};

/// Why a submitted document produced no successful result.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Failed(#[from] DocumentFailed),

    #[error("document {id} timed out after {after:?}")]
    Timeout {
        id: String,
        after: Duration,
        partial: Box<AnnotationResult>,
    },

    #[error("annotator panicked on document {id}: {message}")]
    Panicked {
        id: String,
        message: String,
        partial: Box<AnnotationResult>,
    },
}

impl CoordinatorError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Failed(failed) => failed.kind,
            Self::Timeout { .. } => FailureKind::Transient,
            Self::Panicked { .. } => FailureKind::Deterministic,
        }
    }

    /// The failed result to report downstream.
    pub fn partial(&self) -> &AnnotationResult {
        match self {
            Self::Failed(failed) => &failed.partial,
            Self::Timeout { partial, .. } | Self::Panicked { partial, .. } => partial,
        }
    }

    /// Consume the error into a result whose status is always failed.
    pub fn into_partial(self) -> AnnotationResult {
        match self {
            Self::Failed(failed) => failed.partial.into_failed(&failed.stage, &failed.reason),
            Self::Timeout { partial, .. } | Self::Panicked { partial, .. } => *partial,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub workers: usize,
    /// Documents admitted beyond those being annotated.
    pub queue_capacity: usize,
    /// Per-document limit. `None` waits forever.
    pub document_timeout: Option<Duration>,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 4,
            document_timeout: Some(Duration::from_secs(60)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub pool: PoolStats,
    /// Documents admitted and not yet finished.
    pub in_flight: usize,
    pub completed: usize,
    pub failed: usize,
}

pub struct Coordinator {
    pool: Arc<AnnotatorPool>,
    admission: Arc<Semaphore>,
    admission_limit: usize,
    document_timeout: Option<Duration>,
    completed: AtomicUsize,
    failed: AtomicUsize,
}

impl Coordinator {
    pub fn new(options: &CoordinatorOptions, factory: AnnotatorFactory) -> Self {
        let workers = options.workers.max(1);
        let admission_limit = workers + options.queue_capacity;
        tracing::debug!(
            workers,
            queue_capacity = options.queue_capacity,
            timeout = ?options.document_timeout,
            "Starting annotator pool"
        );
        Self {
            pool: AnnotatorPool::new(workers, factory),
            admission: Arc::new(Semaphore::new(admission_limit)),
            admission_limit,
            document_timeout: options.document_timeout,
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    pub fn workers(&self) -> usize {
        self.pool.size()
    }

    /// Total documents that may be admitted at once.
    pub fn admission_limit(&self) -> usize {
        self.admission_limit
    }

    /// Wait for room to accept another document. Hold the permit until the
    /// document's outcome has been settled with the broker.
    pub async fn admit(&self) -> OwnedSemaphorePermit {
        // Admission is never closed.
        self.admission
            .clone()
            .acquire_owned()
            .await
            .expect("admission semaphore closed")
    }

    /// Annotate one document on a leased annotator.
    pub async fn submit(&self, document: Document) -> Result<AnnotationResult, CoordinatorError> {
        let mut lease = self.pool.lease().await;
        let Some(annotator) = lease.take() else {
            unreachable!("fresh lease always carries an annotator");
        };

        let id = document.id().to_string();
        let fallback = Document::new(document.id(), document.text())
            .with_chunk(document.chunk().cloned());

        let task = tokio::task::spawn_blocking(move || {
            let outcome = annotator.annotate(document);
            (annotator, outcome)
        });

        let joined = match self.document_timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    // The blocking thread keeps running; its annotator is
                    // discarded when it finishes.
                    lease.abandon();
                    tracing::warn!(document_id = %id, after = ?limit, "Annotation timed out");
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    let reason = format!("timed out after {:?}", limit);
                    return Err(CoordinatorError::Timeout {
                        id,
                        after: limit,
                        partial: Box::new(failed_result(fallback, &reason)),
                    });
                }
            },
            None => task.await,
        };

        match joined {
            Ok((annotator, outcome)) => {
                lease.restore(annotator);
                match outcome {
                    Ok(result) => {
                        self.completed.fetch_add(1, Ordering::Relaxed);
                        Ok(result)
                    }
                    Err(failed) => {
                        self.failed.fetch_add(1, Ordering::Relaxed);
                        Err(CoordinatorError::Failed(failed))
                    }
                }
            }
            Err(join_error) => {
                lease.abandon();
                self.failed.fetch_add(1, Ordering::Relaxed);
                let message = panic_message(join_error);
                tracing::error!(document_id = %id, "Annotator panicked: {}", message);
                let reason = format!("annotator panicked: {}", message);
                Err(CoordinatorError::Panicked {
                    id,
                    message,
                    partial: Box::new(failed_result(fallback, &reason)),
                })
            }
        }
    }

    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            pool: self.pool.stats(),
            in_flight: self.admission_limit - self.admission.available_permits(),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

fn failed_result(mut document: Document, reason: &str) -> AnnotationResult {
    let _ = document.transition(DocumentStatus::Failed);
    AnnotationResult::finish(
        document,
        Some(StageErrorRecord {
            stage: "pipeline".to_string(),
            sentence: None,
            message: reason.to_string(),
        }),
    )
}

fn panic_message(error: tokio::task::JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    let payload = error.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResultStatus;
    use crate::services::annotation::Annotator;

    struct Sleepy {
        delay: Duration,
        running: Arc<AtomicUsize>,
        max_running: Arc<AtomicUsize>,
    }

    impl Annotator for Sleepy {
        fn name(&self) -> &str {
            "sleepy"
        }

        fn annotate(&self, document: Document) -> Result<AnnotationResult, DocumentFailed> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            if document.text() == "panic" {
                self.running.fetch_sub(1, Ordering::SeqCst);
                panic!("boom");
            }
            let delay = if document.text() == "slow" {
                self.delay * 20
            } else {
                self.delay
            };
            std::thread::sleep(delay);
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(AnnotationResult::finish(document, None))
        }
    }

    fn coordinator(workers: usize, timeout: Option<Duration>) -> (Coordinator, Arc<AtomicUsize>) {
        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));
        let (r, m) = (running.clone(), max_running.clone());
        let factory: AnnotatorFactory = Arc::new(move || {
            Box::new(Sleepy {
                delay: Duration::from_millis(20),
                running: r.clone(),
                max_running: m.clone(),
            }) as Box<dyn Annotator>
        });
        let options = CoordinatorOptions {
            workers,
            queue_capacity: 2,
            document_timeout: timeout,
        };
        (Coordinator::new(&options, factory), max_running)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded_by_workers() {
        let (coordinator, max_running) = coordinator(2, None);
        let coordinator = Arc::new(coordinator);

        let mut tasks = Vec::new();
        for i in 0..8 {
            let coordinator = coordinator.clone();
            tasks.push(tokio::spawn(async move {
                coordinator
                    .submit(Document::new(format!("d{}", i), "text"))
                    .await
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }

        assert!(max_running.load(Ordering::SeqCst) <= 2);
        let stats = coordinator.stats();
        assert_eq!(stats.completed, 8);
        assert!(stats.pool.peak <= 2);
        assert_eq!(stats.pool.active, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timeout_is_transient_and_frees_the_slot() {
        let (coordinator, _) = coordinator(1, Some(Duration::from_millis(100)));

        let err = coordinator
            .submit(Document::new("slow-1", "slow"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::Timeout { .. }));
        assert_eq!(err.kind(), FailureKind::Transient);
        assert_eq!(err.partial().status(), ResultStatus::Failed);
        assert_eq!(coordinator.stats().pool.abandoned, 1);

        let ok = coordinator.submit(Document::new("fast", "quick")).await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn test_panic_is_deterministic() {
        let (coordinator, _) = coordinator(1, None);
        let err = coordinator
            .submit(Document::new("p", "panic"))
            .await
            .unwrap_err();
        match &err {
            CoordinatorError::Panicked { message, .. } => assert_eq!(message, "boom"),
            other => panic!("expected panic error, got {:?}", other),
        }
        assert_eq!(err.kind(), FailureKind::Deterministic);
        assert_eq!(err.partial().id(), "p");
    }

    #[tokio::test]
    async fn test_admission_limit() {
        let (coordinator, _) = coordinator(1, None);
        assert_eq!(coordinator.admission_limit(), 3);
        let _a = coordinator.admit().await;
        let _b = coordinator.admit().await;
        let _c = coordinator.admit().await;
        assert_eq!(coordinator.stats().in_flight, 3);
        let blocked =
            tokio::time::timeout(Duration::from_millis(30), coordinator.admit()).await;
        assert!(blocked.is_err());
    }
}
