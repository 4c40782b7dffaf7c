//! Splits source text into chunked annotation tasks and publishes them.

use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

use crate::models::{ChunkInfo, InboundMessage};
use crate::services::annotation::SentenceSegmenter;
use crate::work_queue::{BrokerError, Publisher};

pub const DEFAULT_CHUNK_SIZE: usize = 50;

#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("source path is neither a file nor a directory: {0}")]
    InvalidSource(PathBuf),

    #[error("source text is empty")]
    Empty,

    #[error("failed to encode task: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Read a text file, or every `.txt` file under a directory in path order.
pub fn read_source(path: &Path) -> Result<String, ProducerError> {
    let io = |source| ProducerError::Io {
        path: path.to_path_buf(),
        source,
    };

    if path.is_file() {
        return std::fs::read_to_string(path).map_err(io);
    }
    if !path.is_dir() {
        return Err(ProducerError::InvalidSource(path.to_path_buf()));
    }

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        match entry {
            Ok(entry)
                if entry.file_type().is_file()
                    && entry.path().extension().is_some_and(|ext| ext == "txt") =>
            {
                files.push(entry.into_path());
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Skipping unreadable entry: {}", e),
        }
    }

    let mut text = String::new();
    for file in &files {
        match std::fs::read_to_string(file) {
            Ok(contents) => {
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(&contents);
            }
            Err(e) => tracing::error!(path = %file.display(), "Error reading file: {}", e),
        }
    }
    tracing::info!(files = files.len(), chars = text.len(), "Read source directory");
    Ok(text)
}

/// Group the sentences of `text` into chunks of at most `sentences_per_chunk`.
pub fn chunk_sentences(text: &str, sentences_per_chunk: usize) -> Vec<String> {
    let per_chunk = sentences_per_chunk.max(1);
    let sentences: Vec<&str> = SentenceSegmenter::new()
        .segment(text)
        .into_iter()
        .filter_map(|span| span.slice(text))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    sentences
        .chunks(per_chunk)
        .map(|group| group.join(" "))
        .collect()
}

/// Build one inbound message per chunk, all tagged with `task_id`.
pub fn build_tasks(task_id: &str, chunks: Vec<String>) -> Vec<InboundMessage> {
    let total = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(index, text)| InboundMessage {
            id: format!("{}-{}", task_id, index),
            text,
            chunk: Some(ChunkInfo {
                task_id: task_id.to_string(),
                index,
                total,
            }),
        })
        .collect()
}

/// Publish tasks in order, calling `on_sent` after each one.
pub async fn publish_tasks(
    publisher: &dyn Publisher,
    tasks: &[InboundMessage],
    mut on_sent: impl FnMut(&InboundMessage),
) -> Result<usize, ProducerError> {
    for task in tasks {
        let payload = task.encode()?;
        publisher.publish(&payload).await?;
        tracing::debug!(document_id = %task.id, "Published task");
        on_sent(task);
    }
    Ok(tasks.len())
}

/// Read `source`, chunk it and build the task list under a fresh task id.
pub fn prepare(source: &Path, sentences_per_chunk: usize) -> Result<Vec<InboundMessage>, ProducerError> {
    let text = read_source(source)?;
    if text.trim().is_empty() {
        return Err(ProducerError::Empty);
    }
    let chunks = chunk_sentences(&text, sentences_per_chunk);
    let task_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(
        task_id = %task_id,
        chunks = chunks.len(),
        sentences_per_chunk,
        "Prepared tasks"
    );
    Ok(build_tasks(&task_id, chunks))
}
