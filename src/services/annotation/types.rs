//! Types shared across annotation stages.

use std::fmt;

use thiserror::Error;

use crate::models::{AnnotationResult, ValidationError};

/// Whether a failure may succeed on a later attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Resource unavailable, timeout, broker hiccup. Worth retrying.
    Transient,
    /// Bad input or a bug. Retrying will fail the same way.
    Deterministic,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Deterministic => write!(f, "deterministic"),
        }
    }
}

/// A failure confined to one sentence. The sentence is marked failed and the
/// rest of the document carries on.
#[derive(Debug, Error)]
pub enum SentenceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("unsupported input: {0}")]
    Unsupported(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// A failure that aborts the whole document.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{stage} unavailable: {reason}")]
    Unavailable { stage: String, reason: String },

    #[error("{stage} rejected document: {reason}")]
    Rejected { stage: String, reason: String },

    #[error("invalid document state: {0}")]
    Invalid(#[from] ValidationError),
}

impl StageError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Unavailable { .. } => FailureKind::Transient,
            Self::Rejected { .. } | Self::Invalid(_) => FailureKind::Deterministic,
        }
    }
}

/// Terminal failure of a pipeline run. Carries whatever was annotated before
/// the abort so it can be reported downstream.
#[derive(Debug, Error)]
#[error("{stage} failed ({kind}): {reason}")]
pub struct DocumentFailed {
    pub kind: FailureKind,
    pub stage: String,
    pub reason: String,
    pub partial: Box<AnnotationResult>,
}

impl DocumentFailed {
    pub fn is_transient(&self) -> bool {
        self.kind == FailureKind::Transient
    }
}
