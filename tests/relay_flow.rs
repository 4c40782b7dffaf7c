//! End-to-end relay tests
//!
//! Drives the full consume, annotate, publish, settle loop against the
//! in-process broker.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nlpipe::models::{AnnotationResult, Document, OutboundMessage, ResultStatus, Sentiment};
use nlpipe::services::annotation::{
    AnnotationPipeline, Annotator, DocumentFailed, FailureKind, LanguageModels, PipelineOptions,
};
use nlpipe::services::coordinator::AnnotatorFactory;
use nlpipe::services::{Coordinator, CoordinatorOptions, Relay, RelayOptions, RelayStats};
use nlpipe::work_queue::MemoryBroker;
use tokio::sync::watch;

const INPUT: &str = "tasks";
const OUTPUT: &str = "results";
const DEAD: &str = "tasks.dead";

fn broker() -> MemoryBroker {
    let broker = MemoryBroker::new();
    broker.declare_queue(DEAD, None);
    broker.declare_queue(INPUT, Some(DEAD));
    broker.declare_queue(OUTPUT, None);
    broker
}

fn standard_factory() -> AnnotatorFactory {
    let models = Arc::new(LanguageModels::builtin());
    Arc::new(move || {
        Box::new(AnnotationPipeline::standard(
            Arc::clone(&models),
            &PipelineOptions::default(),
        )) as Box<dyn Annotator>
    })
}

/// Publish `payloads`, close the input, and run a relay until it drains.
async fn run_relay(
    broker: &MemoryBroker,
    factory: AnnotatorFactory,
    coordinator: CoordinatorOptions,
    relay: RelayOptions,
    payloads: &[&str],
) -> RelayStats {
    for payload in payloads {
        broker.publish_to(INPUT, payload.as_bytes()).unwrap();
    }
    broker.close();

    let prefetch = coordinator.workers + coordinator.queue_capacity;
    let coordinator = Arc::new(Coordinator::new(&coordinator, factory));
    let relay = Arc::new(Relay::new(
        coordinator,
        Arc::new(broker.publisher(OUTPUT)),
        relay,
    ));
    let (_tx, rx) = watch::channel(false);
    let stats = tokio::time::timeout(
        Duration::from_secs(30),
        relay.run(broker.consumer(INPUT, prefetch), rx),
    )
    .await
    .expect("relay drained in time")
    .unwrap();
    assert_eq!(broker.unsettled_count(), 0);
    stats
}

fn results(broker: &MemoryBroker) -> Vec<OutboundMessage> {
    broker
        .drain(OUTPUT)
        .iter()
        .map(|payload| OutboundMessage::decode(payload).unwrap())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_annotates_and_dead_letters_malformed() {
    let broker = broker();
    let stats = run_relay(
        &broker,
        standard_factory(),
        CoordinatorOptions::default(),
        RelayOptions::default(),
        &[r#"{"id":"d1","text":"Alice met Bob."}"#, r#"{"id":"d2"}"#],
    )
    .await;

    assert_eq!(stats.received, 2);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.dead_lettered, 1);
    assert_eq!(stats.malformed, 1);

    let out = results(&broker);
    assert_eq!(out.len(), 1);
    let d1 = &out[0];
    assert_eq!(d1.id, "d1");
    assert_eq!(d1.status, ResultStatus::Ok);
    assert_eq!(d1.error, None);
    assert_eq!(d1.sentences.len(), 1);

    let tokens = &d1.sentences[0].tokens;
    let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
    assert_eq!(texts, vec!["Alice", "met", "Bob", "."]);
    assert!(tokens.iter().all(|t| t.pos.is_some()));
    assert_eq!(tokens[0].ner.as_deref(), Some("PERSON"));
    assert_eq!(tokens[2].ner.as_deref(), Some("PERSON"));
    assert_eq!(tokens[2].span, [10, 13]);
    assert_eq!(d1.sentences[0].sentiment, Some(Sentiment::Neutral));

    let dead = broker.drain(DEAD);
    assert_eq!(dead, vec![br#"{"id":"d2"}"#.to_vec()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bad_sentence_yields_partial_result() {
    let broker = broker();
    run_relay(
        &broker,
        standard_factory(),
        CoordinatorOptions::default(),
        RelayOptions::default(),
        &[r#"{"id":"p","text":"Alice met Bob. Bad \u0007 input. Bob left."}"#],
    )
    .await;

    let out = results(&broker);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].status, ResultStatus::Partial);
    assert!(out[0].error.is_some());
    assert_eq!(out[0].sentences.len(), 3);
    assert!(out[0].sentences[1].error.is_some());
    assert!(out[0].sentences[2].tokens.iter().all(|t| t.ner.is_some()));
    assert!(broker.drain(DEAD).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_chunk_metadata_is_echoed() {
    let broker = broker();
    run_relay(
        &broker,
        standard_factory(),
        CoordinatorOptions::default(),
        RelayOptions::default(),
        &[r#"{"id":"t-1","text":"Hello there.","chunk":{"task_id":"t","index":1,"total":3}}"#],
    )
    .await;

    let out = results(&broker);
    let chunk = out[0].chunk.as_ref().expect("chunk echoed");
    assert_eq!((chunk.task_id.as_str(), chunk.index, chunk.total), ("t", 1, 3));
}

/// Fails transiently until it has been called `failures` times.
struct Flaky {
    calls: Arc<AtomicUsize>,
    failures: usize,
}

impl Annotator for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    fn annotate(&self, document: Document) -> Result<AnnotationResult, DocumentFailed> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(DocumentFailed {
                kind: FailureKind::Transient,
                stage: "pos".into(),
                reason: "model warming up".into(),
                partial: Box::new(AnnotationResult::finish(document, None)),
            });
        }
        Ok(AnnotationResult::finish(document, None))
    }
}

fn flaky_factory(calls: Arc<AtomicUsize>, failures: usize) -> AnnotatorFactory {
    Arc::new(move || {
        Box::new(Flaky {
            calls: Arc::clone(&calls),
            failures,
        }) as Box<dyn Annotator>
    })
}

#[tokio::test]
async fn test_redelivery_eventually_succeeds() {
    let broker = broker();
    let calls = Arc::new(AtomicUsize::new(0));
    let stats = run_relay(
        &broker,
        flaky_factory(Arc::clone(&calls), 2),
        CoordinatorOptions::default(),
        RelayOptions {
            max_retries: 3,
            publish_failures: true,
        },
        &[r#"{"id":"f","text":"x"}"#],
    )
    .await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(stats.requeued, 2);
    assert_eq!(stats.completed, 1);
    let out = results(&broker);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].status, ResultStatus::Ok);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let broker = broker();
    let calls = Arc::new(AtomicUsize::new(0));
    let stats = run_relay(
        &broker,
        flaky_factory(Arc::clone(&calls), usize::MAX),
        CoordinatorOptions::default(),
        RelayOptions {
            max_retries: 2,
            publish_failures: true,
        },
        &[r#"{"id":"f","text":"x"}"#],
    )
    .await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(stats.requeued, 2);
    assert_eq!(stats.dead_lettered, 1);

    let out = results(&broker);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].status, ResultStatus::Failed);
    assert!(out[0].error.as_deref().unwrap().contains("model warming up"));
    assert_eq!(broker.drain(DEAD).len(), 1);
}

#[tokio::test]
async fn test_failed_result_can_be_suppressed() {
    let broker = broker();
    let calls = Arc::new(AtomicUsize::new(0));
    run_relay(
        &broker,
        flaky_factory(calls, usize::MAX),
        CoordinatorOptions::default(),
        RelayOptions {
            max_retries: 0,
            publish_failures: false,
        },
        &[r#"{"id":"f","text":"x"}"#],
    )
    .await;

    assert!(results(&broker).is_empty());
    assert_eq!(broker.drain(DEAD).len(), 1);
}

/// Records how many annotate calls overlap.
struct Tracked {
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    delay: Duration,
}

impl Annotator for Tracked {
    fn name(&self) -> &str {
        "tracked"
    }

    fn annotate(&self, document: Document) -> Result<AnnotationResult, DocumentFailed> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(AnnotationResult::finish(document, None))
    }
}

fn tracked_factory(peak: Arc<AtomicUsize>, delay: Duration) -> AnnotatorFactory {
    let running = Arc::new(AtomicUsize::new(0));
    Arc::new(move || {
        Box::new(Tracked {
            running: Arc::clone(&running),
            peak: Arc::clone(&peak),
            delay,
        }) as Box<dyn Annotator>
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_never_exceeds_pool() {
    let broker = broker();
    let peak = Arc::new(AtomicUsize::new(0));
    let payloads: Vec<String> = (0..24)
        .map(|i| format!(r#"{{"id":"doc-{}","text":"text {}"}}"#, i, i))
        .collect();
    let payloads: Vec<&str> = payloads.iter().map(String::as_str).collect();

    let stats = run_relay(
        &broker,
        tracked_factory(Arc::clone(&peak), Duration::from_millis(15)),
        CoordinatorOptions {
            workers: 3,
            queue_capacity: 2,
            document_timeout: None,
        },
        RelayOptions::default(),
        &payloads,
    )
    .await;

    assert_eq!(stats.completed, 24);
    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(peak.load(Ordering::SeqCst) >= 1);

    let mut ids: Vec<String> = results(&broker).into_iter().map(|r| r.id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 24);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timeouts_are_retried_then_dead_lettered() {
    let broker = broker();
    let peak = Arc::new(AtomicUsize::new(0));
    let stats = run_relay(
        &broker,
        tracked_factory(peak, Duration::from_millis(200)),
        CoordinatorOptions {
            workers: 1,
            queue_capacity: 1,
            document_timeout: Some(Duration::from_millis(40)),
        },
        RelayOptions {
            max_retries: 1,
            publish_failures: true,
        },
        &[r#"{"id":"slow","text":"x"}"#],
    )
    .await;

    assert_eq!(stats.requeued, 1);
    assert_eq!(stats.dead_lettered, 1);
    let out = results(&broker);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].status, ResultStatus::Failed);
    assert!(out[0].error.as_deref().unwrap().contains("timed out"));
}
