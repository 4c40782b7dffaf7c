//! Annotation stages and the pipeline that chains them.
//!
//! `Stage` implementations each add one layer (sentences, tokens, POS tags,
//! entity labels, dependency arcs, sentence sentiment) to a `Document`;
//! `AnnotationPipeline` runs them in order and is exposed to the coordinator
//! through the `Annotator` trait.

mod annotator;
mod dependency;
mod lexicon;
mod ner;
mod ner_annotator;
mod pipeline;
mod pos_tagger;
mod segmenter;
mod sentiment;
mod tokenizer;
mod types;

pub use annotator::{Annotator, Stage};
pub use dependency::DependencyParser;
pub use lexicon::{LanguageModels, ModelError};
pub use ner::{EntityType, NerBackend, NerToken, PatternNerBackend, OUTSIDE};
pub use ner_annotator::NerAnnotator;
pub use pipeline::{AnnotationPipeline, PipelineOptions, DEFAULT_MAX_DOCUMENT_CHARS};
pub use pos_tagger::{PosTagger, TagInput};
pub use segmenter::SentenceSegmenter;
pub use sentiment::SentimentScorer;
pub use tokenizer::Tokenizer;
pub use types::{DocumentFailed, FailureKind, SentenceError, StageError};
