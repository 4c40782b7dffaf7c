//! Collects chunk results into one report per task.
//!
//! Results for a task arrive in any order and possibly more than once
//! (redelivery). A task is reported once every chunk index has been seen.
//! Tasks that stop receiving chunks (a chunk was dead-lettered without a
//! result) are dropped once they have been idle longer than the stale limit.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::{OutboundMessage, OutboundSentence, ResultStatus, Sentiment};
use crate::services::annotation::{EntityType, OUTSIDE};
use crate::work_queue::{BrokerError, MessageSource};

pub const DEFAULT_TOP_N: usize = 5;
/// Idle time after which an incomplete task is abandoned.
pub const DEFAULT_STALE_AFTER_SECS: i64 = 3600;
const REDACTION: &str = "[NAME]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordCount {
    pub word: String,
    pub count: u64,
}

/// Sentence polarity totals for a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SentimentReport {
    pub positive_sentences: u64,
    pub negative_sentences: u64,
}

/// Final per-task output.
#[derive(Debug, Clone, Serialize)]
pub struct FinalReport {
    pub task_id: String,
    pub processing_time_ms: i64,
    pub chunks: usize,
    pub failed_chunks: usize,
    pub total_words: u64,
    pub sentiment: SentimentReport,
    pub top_words: Vec<WordCount>,
    pub entities: BTreeMap<String, u64>,
    pub redacted_text: String,
    pub sorted_sentences: Vec<String>,
}

/// What one chunk contributes to its task's report.
#[derive(Debug, Clone, Default)]
struct ChunkSummary {
    failed: bool,
    words: u64,
    sentiment: SentimentReport,
    frequencies: HashMap<String, u64>,
    entities: BTreeMap<String, u64>,
    redacted: String,
    /// Sentence texts, shortest first.
    sentences: Vec<String>,
}

impl ChunkSummary {
    fn from_message(message: &OutboundMessage) -> Self {
        let mut summary = ChunkSummary {
            failed: message.status == ResultStatus::Failed,
            ..Default::default()
        };

        let mut redacted_parts = Vec::with_capacity(message.sentences.len());
        for sentence in &message.sentences {
            for token in &sentence.tokens {
                if token.text.chars().any(char::is_alphanumeric) {
                    summary.words += 1;
                    *summary
                        .frequencies
                        .entry(token.text.to_lowercase())
                        .or_default() += 1;
                }
            }
            match sentence.sentiment {
                Some(Sentiment::Positive) => summary.sentiment.positive_sentences += 1,
                Some(Sentiment::Negative) => summary.sentiment.negative_sentences += 1,
                Some(Sentiment::Neutral) | None => {}
            }
            count_entities(sentence, &mut summary.entities);
            redacted_parts.push(render(sentence, true));
            summary.sentences.push(render(sentence, false));
        }

        summary.redacted = redacted_parts.join(" ");
        summary.sentences.sort_by_key(|s| s.chars().count());
        summary
    }
}

/// Rebuild sentence text from tokens, optionally replacing person names.
///
/// Whitespace between tokens is normalised to a single space; consecutive
/// person tokens collapse into one placeholder.
fn render(sentence: &OutboundSentence, redact: bool) -> String {
    let person = EntityType::Person.as_label();
    let mut out = String::new();
    let mut previous_end: Option<usize> = None;
    let mut in_name = false;

    for token in &sentence.tokens {
        let is_person = redact && token.ner.as_deref() == Some(person);
        if is_person && in_name {
            previous_end = Some(token.span[1]);
            continue;
        }
        if let Some(end) = previous_end {
            if token.span[0] > end {
                out.push(' ');
            }
        }
        out.push_str(if is_person { REDACTION } else { &token.text });
        in_name = is_person;
        previous_end = Some(token.span[1]);
    }
    out
}

/// Count entity mentions; a run of tokens with the same label is one mention.
fn count_entities(sentence: &OutboundSentence, counts: &mut BTreeMap<String, u64>) {
    let mut current: Option<&str> = None;
    for token in &sentence.tokens {
        let label = token.ner.as_deref().filter(|l| *l != OUTSIDE);
        if label != current {
            if let Some(label) = label {
                *counts.entry(label.to_string()).or_default() += 1;
            }
        }
        current = label;
    }
}

/// Merge lists that are each sorted by length into one list sorted by
/// length. Ties keep list order.
pub fn merge_by_length(lists: Vec<Vec<String>>) -> Vec<String> {
    let total = lists.iter().map(Vec::len).sum();
    let mut iters: Vec<_> = lists.into_iter().map(|l| l.into_iter().peekable()).collect();
    let mut heap = BinaryHeap::new();
    for (index, iter) in iters.iter_mut().enumerate() {
        if let Some(first) = iter.peek() {
            heap.push(Reverse((first.chars().count(), index)));
        }
    }

    let mut merged = Vec::with_capacity(total);
    while let Some(Reverse((_, index))) = heap.pop() {
        let iter = &mut iters[index];
        if let Some(sentence) = iter.next() {
            merged.push(sentence);
        }
        if let Some(next) = iter.peek() {
            heap.push(Reverse((next.chars().count(), index)));
        }
    }
    merged
}

#[derive(Debug)]
struct TaskState {
    total: usize,
    started: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    chunks: BTreeMap<usize, ChunkSummary>,
}

/// Accumulates chunk results until each task is complete.
#[derive(Debug)]
pub struct Aggregator {
    tasks: HashMap<String, TaskState>,
    top_n: usize,
    stale_after: Duration,
    abandoned: usize,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_N)
    }
}

impl Aggregator {
    pub fn new(top_n: usize) -> Self {
        Self::with_stale_after(top_n, Duration::seconds(DEFAULT_STALE_AFTER_SECS))
    }

    pub fn with_stale_after(top_n: usize, stale_after: Duration) -> Self {
        Self {
            tasks: HashMap::new(),
            top_n,
            stale_after,
            abandoned: 0,
        }
    }

    /// Tasks with chunks still outstanding.
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Incomplete tasks dropped after going stale.
    pub fn abandoned_tasks(&self) -> usize {
        self.abandoned
    }

    /// Drop incomplete tasks that have not received a chunk since
    /// `now - stale_after`. Returns how many were dropped.
    pub fn evict_stale(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.stale_after;
        let before = self.tasks.len();
        self.tasks.retain(|task_id, state| {
            if state.last_seen >= cutoff {
                return true;
            }
            tracing::warn!(
                task_id = %task_id,
                received = state.chunks.len(),
                total = state.total,
                "Abandoning incomplete task"
            );
            false
        });
        let evicted = before - self.tasks.len();
        self.abandoned += evicted;
        evicted
    }

    pub fn accept(&mut self, message: &OutboundMessage) -> Option<FinalReport> {
        self.accept_at(message, Utc::now())
    }

    /// Add one chunk result. Returns the report when it completes its task.
    pub fn accept_at(&mut self, message: &OutboundMessage, now: DateTime<Utc>) -> Option<FinalReport> {
        let Some(chunk) = &message.chunk else {
            tracing::debug!(document_id = %message.id, "Ignoring result without chunk metadata");
            return None;
        };
        if chunk.total == 0 || chunk.index >= chunk.total {
            tracing::warn!(
                document_id = %message.id,
                index = chunk.index,
                total = chunk.total,
                "Ignoring result with inconsistent chunk metadata"
            );
            return None;
        }

        self.evict_stale(now);
        let state = self
            .tasks
            .entry(chunk.task_id.clone())
            .or_insert_with(|| TaskState {
                total: chunk.total,
                started: now,
                last_seen: now,
                chunks: BTreeMap::new(),
            });
        state.last_seen = now;
        if state.chunks.contains_key(&chunk.index) {
            tracing::debug!(document_id = %message.id, "Duplicate chunk result");
            return None;
        }
        state
            .chunks
            .insert(chunk.index, ChunkSummary::from_message(message));
        tracing::debug!(
            task_id = %chunk.task_id,
            received = state.chunks.len(),
            total = state.total,
            "Collected chunk"
        );

        if state.chunks.len() < state.total {
            return None;
        }
        let state = self.tasks.remove(&chunk.task_id)?;
        Some(self.finalize(chunk.task_id.clone(), state, now))
    }

    fn finalize(&self, task_id: String, state: TaskState, now: DateTime<Utc>) -> FinalReport {
        let mut total_words = 0;
        let mut frequencies: HashMap<String, u64> = HashMap::new();
        let mut entities: BTreeMap<String, u64> = BTreeMap::new();
        let mut redacted = Vec::with_capacity(state.chunks.len());
        let mut sentence_lists = Vec::with_capacity(state.chunks.len());
        let mut failed_chunks = 0;
        let mut sentiment = SentimentReport::default();

        // BTreeMap iteration keeps chunk order for the reconstructed text.
        for chunk in state.chunks.into_values() {
            if chunk.failed {
                failed_chunks += 1;
            }
            total_words += chunk.words;
            sentiment.positive_sentences += chunk.sentiment.positive_sentences;
            sentiment.negative_sentences += chunk.sentiment.negative_sentences;
            for (word, count) in chunk.frequencies {
                *frequencies.entry(word).or_default() += count;
            }
            for (label, count) in chunk.entities {
                *entities.entry(label).or_default() += count;
            }
            if !chunk.redacted.is_empty() {
                redacted.push(chunk.redacted);
            }
            sentence_lists.push(chunk.sentences);
        }

        let mut top_words: Vec<WordCount> = frequencies
            .into_iter()
            .map(|(word, count)| WordCount { word, count })
            .collect();
        top_words.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.word.cmp(&b.word)));
        top_words.truncate(self.top_n);

        let report = FinalReport {
            task_id,
            processing_time_ms: (now - state.started).num_milliseconds(),
            chunks: state.total,
            failed_chunks,
            total_words,
            sentiment,
            top_words,
            entities,
            redacted_text: redacted.join(" "),
            sorted_sentences: merge_by_length(sentence_lists),
        };
        tracing::info!(
            task_id = %report.task_id,
            chunks = report.chunks,
            words = report.total_words,
            elapsed_ms = report.processing_time_ms,
            "Task complete"
        );
        report
    }
}

/// Feed results from `source` into `aggregator` until the source closes or
/// `on_report` returns `false`. Undecodable results are rejected.
pub async fn consume<S, F>(
    mut source: S,
    aggregator: &mut Aggregator,
    mut on_report: F,
) -> Result<usize, BrokerError>
where
    S: MessageSource,
    F: FnMut(FinalReport) -> bool,
{
    let mut reports = 0;
    while let Some(handle) = source.recv().await? {
        let message = match OutboundMessage::decode(&handle.delivery.payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(
                    delivery_tag = handle.delivery.delivery_tag,
                    "Rejecting malformed result: {}",
                    e
                );
                handle.nack(false).await?;
                continue;
            }
        };
        let report = aggregator.accept(&message);
        handle.ack().await?;
        if let Some(report) = report {
            reports += 1;
            if !on_report(report) {
                break;
            }
        }
    }
    Ok(reports)
}
