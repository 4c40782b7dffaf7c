//! Named entity stage: wraps a `NerBackend` behind the `Stage` trait.

use std::sync::Arc;

use crate::models::Document;

use super::annotator::Stage;
use super::lexicon::LanguageModels;
use super::ner::{NerBackend, NerToken, PatternNerBackend, OUTSIDE};
use super::types::SentenceError;

/// Stage that labels every token of a sentence with an entity type or "O".
///
/// Accepts any `NerBackend` implementation. Defaults to `PatternNerBackend`.
pub struct NerAnnotator {
    backend: Box<dyn NerBackend>,
}

impl NerAnnotator {
    pub fn new(models: Arc<LanguageModels>) -> Self {
        Self {
            backend: Box::new(PatternNerBackend::new(models)),
        }
    }

    pub fn with_backend(backend: Box<dyn NerBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_id(&self) -> &str {
        self.backend.backend_id()
    }
}

impl Stage for NerAnnotator {
    fn name(&self) -> &str {
        "ner"
    }

    fn process_sentence(&self, document: &mut Document, sentence: usize) -> Result<(), SentenceError> {
        let labels = {
            let tokens: Vec<NerToken<'_>> = document
                .sentence(sentence)?
                .tokens()
                .iter()
                .map(|token| NerToken {
                    text: token.text(),
                    pos: token.pos(),
                })
                .collect();
            let labels = self.backend.label(&tokens);
            if labels.len() != tokens.len() {
                return Err(SentenceError::Backend(format!(
                    "{} returned {} labels for {} tokens",
                    self.backend.backend_id(),
                    labels.len(),
                    tokens.len()
                )));
            }
            labels
        };

        for (index, label) in labels.into_iter().enumerate() {
            let label = label.map_or(OUTSIDE, |entity| entity.as_label());
            document.set_ner(sentence, index, label)?;
        }
        Ok(())
    }
}
