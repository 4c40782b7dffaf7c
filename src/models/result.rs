//! Final, immutable annotation output for a document.

use serde::{Deserialize, Serialize};

use super::document::{ChunkInfo, Document, Sentence, SentenceStatus};

/// Overall outcome reported downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Ok,
    Partial,
    Failed,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

/// A recorded stage failure. `sentence` is `None` for document-level errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageErrorRecord {
    pub stage: String,
    pub sentence: Option<usize>,
    pub message: String,
}

/// Annotations of one document, produced once at the end of a pipeline run.
#[derive(Debug, Clone)]
pub struct AnnotationResult {
    id: String,
    text: String,
    chunk: Option<ChunkInfo>,
    sentences: Vec<Sentence>,
    status: ResultStatus,
    errors: Vec<StageErrorRecord>,
}

impl AnnotationResult {
    /// Freeze a document into a result.
    ///
    /// `failure` is the reason for a catastrophic abort; sentence failures are
    /// read from the sentences themselves.
    pub fn finish(document: Document, failure: Option<StageErrorRecord>) -> Self {
        let mut errors: Vec<StageErrorRecord> = document
            .sentences()
            .iter()
            .enumerate()
            .filter_map(|(index, sentence)| match sentence.status() {
                SentenceStatus::Ok => None,
                SentenceStatus::Failed { stage, reason } => Some(StageErrorRecord {
                    stage: stage.clone(),
                    sentence: Some(index),
                    message: reason.clone(),
                }),
            })
            .collect();

        let status = if failure.is_some() {
            ResultStatus::Failed
        } else if errors.is_empty() {
            ResultStatus::Ok
        } else {
            ResultStatus::Partial
        };

        if let Some(failure) = failure {
            errors.insert(0, failure);
        }

        let id = document.id().to_string();
        let text = document.text().to_string();
        let chunk = document.chunk().cloned();
        let sentences = document.sentences().to_vec();

        Self {
            id,
            text,
            chunk,
            sentences,
            status,
            errors,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn chunk(&self) -> Option<&ChunkInfo> {
        self.chunk.as_ref()
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    pub fn status(&self) -> ResultStatus {
        self.status
    }

    pub fn errors(&self) -> &[StageErrorRecord] {
        &self.errors
    }

    /// Force the result into the failed state, recording `stage`/`message`
    /// as the document-level error unless one is already present.
    pub fn into_failed(mut self, stage: &str, message: &str) -> Self {
        if self.status != ResultStatus::Failed || !self.errors.iter().any(|e| e.sentence.is_none()) {
            self.errors.insert(
                0,
                StageErrorRecord {
                    stage: stage.to_string(),
                    sentence: None,
                    message: message.to_string(),
                },
            );
        }
        self.status = ResultStatus::Failed;
        self
    }

    /// One-line error summary for the outbound envelope.
    pub fn error_summary(&self) -> Option<String> {
        match self.status {
            ResultStatus::Ok => None,
            ResultStatus::Failed => self
                .errors
                .iter()
                .find(|e| e.sentence.is_none())
                .map(|e| format!("{}: {}", e.stage, e.message)),
            ResultStatus::Partial => {
                let failed = self.errors.iter().filter(|e| e.sentence.is_some()).count();
                let first = self.errors.first().map(|e| {
                    format!(
                        "sentence {} ({}): {}",
                        e.sentence.unwrap_or_default(),
                        e.stage,
                        e.message
                    )
                });
                Some(format!(
                    "{} of {} sentences failed; first: {}",
                    failed,
                    self.sentences.len(),
                    first.unwrap_or_default()
                ))
            }
        }
    }
}
