//! Data models for documents, annotation results and broker envelopes.

mod document;
mod message;
mod result;
mod span;

pub use document::{
    ChunkInfo, Dependency, DependencyGraph, Document, DocumentStatus, Sentence, SentenceStatus,
    Sentiment, Token, ValidationError,
};
pub use message::{
    peek_id, DecodeError, InboundMessage, OutboundMessage, OutboundSentence, OutboundToken,
};
pub use result::{AnnotationResult, ResultStatus, StageErrorRecord};
pub use span::{CharOffsets, Span};
