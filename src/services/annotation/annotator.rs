//! Annotator and stage traits.

use crate::models::{AnnotationResult, Document};

use super::types::{DocumentFailed, SentenceError, StageError};

/// Something that turns a raw document into a finished annotation result.
///
/// Annotation is CPU-bound and synchronous; callers run it on a blocking
/// thread. An `Annotator` is leased to one document at a time, so
/// implementations may hold per-instance scratch state.
pub trait Annotator: Send + Sync {
    /// Identifier used in logs.
    fn name(&self) -> &str;

    fn annotate(&self, document: Document) -> Result<AnnotationResult, DocumentFailed>;
}

/// One step of an annotation pipeline.
///
/// Stages mutate the document only through its validating mutators. The
/// default [`Stage::process`] visits every sentence that has not failed yet,
/// and a [`SentenceError`] fails just that sentence.
pub trait Stage: Send + Sync {
    /// Stage name recorded in error reports ("tokenize", "ner", ...).
    fn name(&self) -> &str;

    /// Whether the stage can run right now. An error aborts the document.
    fn check_ready(&self) -> Result<(), StageError> {
        Ok(())
    }

    fn process(&self, document: &mut Document) -> Result<(), StageError> {
        for index in document.live_sentences() {
            if let Err(err) = self.process_sentence(document, index) {
                tracing::debug!(
                    document_id = %document.id(),
                    sentence = index,
                    stage = self.name(),
                    "Sentence failed: {}",
                    err
                );
                document.fail_sentence(index, self.name(), err.to_string())?;
            }
        }
        Ok(())
    }

    /// Annotate one live sentence.
    fn process_sentence(&self, _document: &mut Document, _sentence: usize) -> Result<(), SentenceError> {
        Ok(())
    }
}
