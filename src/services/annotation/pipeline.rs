//! Ordered stage runner that turns a document into an annotation result.

use std::sync::Arc;
use std::time::Instant;

use crate::models::{AnnotationResult, Document, DocumentStatus, StageErrorRecord};

use super::annotator::{Annotator, Stage};
use super::dependency::DependencyParser;
use super::lexicon::LanguageModels;
use super::ner_annotator::NerAnnotator;
use super::pos_tagger::PosTagger;
use super::segmenter::SentenceSegmenter;
use super::sentiment::SentimentScorer;
use super::tokenizer::Tokenizer;
use super::types::{DocumentFailed, FailureKind, StageError};

/// Documents longer than this many characters are rejected by default.
pub const DEFAULT_MAX_DOCUMENT_CHARS: usize = 1_000_000;

/// Tunables for the built-in pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Run the dependency parser after NER.
    pub dependency_parse: bool,
    /// Label each sentence positive, negative or neutral.
    pub sentiment: bool,
    /// Reject documents longer than this (in characters). 0 disables the check.
    pub max_document_chars: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            dependency_parse: false,
            sentiment: true,
            max_document_chars: DEFAULT_MAX_DOCUMENT_CHARS,
        }
    }
}

/// Runs stages in a fixed order over one document at a time.
pub struct AnnotationPipeline {
    stages: Vec<Box<dyn Stage>>,
    max_document_chars: usize,
}

impl AnnotationPipeline {
    /// Segment, tokenize, tag, recognise entities, then optionally parse and
    /// score sentiment.
    pub fn standard(models: Arc<LanguageModels>, options: &PipelineOptions) -> Self {
        let mut stages: Vec<Box<dyn Stage>> = vec![
            Box::new(SentenceSegmenter::new()),
            Box::new(Tokenizer::new()),
            Box::new(PosTagger::new(models.clone())),
            Box::new(NerAnnotator::new(models.clone())),
        ];
        if options.dependency_parse {
            stages.push(Box::new(DependencyParser::new()));
        }
        if options.sentiment {
            stages.push(Box::new(SentimentScorer::new(models)));
        }
        Self::with_stages(stages, options.max_document_chars)
    }

    pub fn with_stages(stages: Vec<Box<dyn Stage>>, max_document_chars: usize) -> Self {
        Self {
            stages,
            max_document_chars,
        }
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage, isolating sentence failures and aborting on stage
    /// failures.
    pub fn run(&self, mut document: Document) -> Result<AnnotationResult, DocumentFailed> {
        let started = Instant::now();
        if let Err(e) = document.transition(DocumentStatus::InProgress) {
            return Err(abort(document, "pipeline", StageError::Invalid(e)));
        }

        if self.max_document_chars > 0 {
            let chars = document.text().chars().count();
            if chars > self.max_document_chars {
                let error = StageError::Rejected {
                    stage: "pipeline".to_string(),
                    reason: format!(
                        "document has {} characters, limit is {}",
                        chars, self.max_document_chars
                    ),
                };
                return Err(abort(document, "pipeline", error));
            }
        }

        for stage in &self.stages {
            let stage_started = Instant::now();
            let outcome = stage
                .check_ready()
                .and_then(|()| stage.process(&mut document));
            if let Err(error) = outcome {
                tracing::warn!(
                    document_id = %document.id(),
                    stage = stage.name(),
                    "Stage failed: {}",
                    error
                );
                return Err(abort(document, stage.name(), error));
            }
            tracing::trace!(
                document_id = %document.id(),
                stage = stage.name(),
                elapsed_ms = stage_started.elapsed().as_millis() as u64,
                "Stage complete"
            );
        }

        if let Err(e) = document.transition(DocumentStatus::Completed) {
            return Err(abort(document, "pipeline", StageError::Invalid(e)));
        }

        let result = AnnotationResult::finish(document, None);
        tracing::debug!(
            document_id = %result.id(),
            sentences = result.sentences().len(),
            status = result.status().as_str(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Annotated document"
        );
        Ok(result)
    }
}

/// Freeze a document after a stage failure.
fn abort(mut document: Document, stage: &str, error: StageError) -> DocumentFailed {
    let kind: FailureKind = error.kind();
    let reason = error.to_string();
    // Pending or in-progress documents can always move to failed.
    let _ = document.transition(DocumentStatus::Failed);
    let partial = AnnotationResult::finish(
        document,
        Some(StageErrorRecord {
            stage: stage.to_string(),
            sentence: None,
            message: reason.clone(),
        }),
    );
    DocumentFailed {
        kind,
        stage: stage.to_string(),
        reason,
        partial: Box::new(partial),
    }
}

impl Annotator for AnnotationPipeline {
    fn name(&self) -> &str {
        "pipeline"
    }

    fn annotate(&self, document: Document) -> Result<AnnotationResult, DocumentFailed> {
        self.run(document)
    }
}
