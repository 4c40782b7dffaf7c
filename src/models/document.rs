//! In-memory document model shared by the annotation stages.
//!
//! Every mutation goes through a validating mutator so that stages cannot
//! corrupt span ordering or overwrite each other's output. Violations are
//! reported as [`ValidationError`] and scoped to the sentence being worked on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::span::Span;

/// Processing status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    fn can_transition_to(self, next: DocumentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::Pending, Self::Failed)
                | (Self::InProgress, Self::Completed)
                | (Self::InProgress, Self::Failed)
        )
    }
}

/// Position of a document within a larger task split into chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub task_id: String,
    pub index: usize,
    pub total: usize,
}

/// Overall polarity of a sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Negative,
    Neutral,
    Positive,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Negative => "negative",
            Self::Neutral => "neutral",
            Self::Positive => "positive",
        }
    }
}

/// Invariant violations rejected by the document model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("span {span} is outside the text (length {len})")]
    OutOfRange { span: Span, len: usize },

    #[error("span {0} is empty")]
    EmptySpan(Span),

    #[error("span {0} does not fall on character boundaries")]
    NotCharBoundary(Span),

    #[error("sentence span {span} overlaps or precedes previous sentence {previous}")]
    SentenceOrder { span: Span, previous: Span },

    #[error("token span {span} is not contained in sentence {sentence}")]
    TokenOutsideSentence { span: Span, sentence: Span },

    #[error("token span {span} overlaps or precedes previous token {previous}")]
    TokenOrder { span: Span, previous: Span },

    #[error("no sentence at index {0}")]
    NoSuchSentence(usize),

    #[error("no token {token} in sentence {sentence}")]
    NoSuchToken { sentence: usize, token: usize },

    #[error("sentence {0} has already failed")]
    SentenceFailed(usize),

    #[error("{field} already set for token {token} in sentence {sentence}")]
    AlreadyAnnotated {
        field: &'static str,
        sentence: usize,
        token: usize,
    },

    #[error("invalid parse for sentence {sentence}: {reason}")]
    InvalidParse { sentence: usize, reason: String },

    #[error("cannot move document from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },
}

/// A single token with its incrementally filled annotations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    text: String,
    span: Span,
    pos: Option<String>,
    ner: Option<String>,
}

impl Token {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn pos(&self) -> Option<&str> {
        self.pos.as_deref()
    }

    pub fn ner(&self) -> Option<&str> {
        self.ner.as_deref()
    }
}

/// One arc of a dependency graph. `head` is `None` for the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub head: Option<usize>,
    pub dependent: usize,
    pub relation: String,
}

/// Dependency structure over the tokens of one sentence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub edges: Vec<Dependency>,
}

impl DependencyGraph {
    /// Check the graph is a tree over `token_count` tokens: one root, one
    /// head per token, heads in range and no cycles.
    pub fn validate(&self, token_count: usize) -> Result<(), String> {
        if self.edges.len() != token_count {
            return Err(format!(
                "expected {} arcs, found {}",
                token_count,
                self.edges.len()
            ));
        }

        let mut heads: Vec<Option<Option<usize>>> = vec![None; token_count];
        for edge in &self.edges {
            if edge.dependent >= token_count {
                return Err(format!("dependent {} out of range", edge.dependent));
            }
            if let Some(head) = edge.head {
                if head >= token_count {
                    return Err(format!("head {} out of range", head));
                }
                if head == edge.dependent {
                    return Err(format!("token {} is its own head", head));
                }
            }
            if heads[edge.dependent].replace(edge.head).is_some() {
                return Err(format!("token {} has more than one head", edge.dependent));
            }
        }

        let roots = heads.iter().filter(|h| matches!(h, Some(None))).count();
        if token_count > 0 && roots != 1 {
            return Err(format!("expected exactly one root, found {}", roots));
        }

        // Walking up from any token must reach the root within token_count steps.
        for start in 0..token_count {
            let mut current = start;
            let mut steps = 0;
            while let Some(Some(head)) = heads[current] {
                current = head;
                steps += 1;
                if steps > token_count {
                    return Err(format!("cycle through token {}", start));
                }
            }
        }

        Ok(())
    }

    pub fn head_of(&self, dependent: usize) -> Option<&Dependency> {
        self.edges.iter().find(|e| e.dependent == dependent)
    }
}

/// Whether a sentence is still eligible for annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentenceStatus {
    Ok,
    Failed { stage: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    span: Span,
    tokens: Vec<Token>,
    parse: Option<DependencyGraph>,
    sentiment: Option<Sentiment>,
    status: SentenceStatus,
}

impl Sentence {
    pub fn span(&self) -> Span {
        self.span
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn parse(&self) -> Option<&DependencyGraph> {
        self.parse.as_ref()
    }

    pub fn sentiment(&self) -> Option<Sentiment> {
        self.sentiment
    }

    pub fn status(&self) -> &SentenceStatus {
        &self.status
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, SentenceStatus::Failed { .. })
    }
}

/// A document moving through the annotation pipeline.
#[derive(Debug, Clone)]
pub struct Document {
    id: String,
    text: String,
    sentences: Vec<Sentence>,
    status: DocumentStatus,
    chunk: Option<ChunkInfo>,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            sentences: Vec::new(),
            status: DocumentStatus::Pending,
            chunk: None,
        }
    }

    pub fn with_chunk(mut self, chunk: Option<ChunkInfo>) -> Self {
        self.chunk = chunk;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn status(&self) -> DocumentStatus {
        self.status
    }

    pub fn chunk(&self) -> Option<&ChunkInfo> {
        self.chunk.as_ref()
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    pub fn sentence(&self, index: usize) -> Result<&Sentence, ValidationError> {
        self.sentences
            .get(index)
            .ok_or(ValidationError::NoSuchSentence(index))
    }

    /// Indices of sentences that have not failed at an earlier stage.
    pub fn live_sentences(&self) -> Vec<usize> {
        self.sentences
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_failed())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn sentence_text(&self, index: usize) -> Result<&str, ValidationError> {
        let span = self.sentence(index)?.span;
        Ok(&self.text[span.start..span.end])
    }

    fn check_span(&self, span: Span) -> Result<(), ValidationError> {
        if span.end > self.text.len() || span.start > span.end {
            return Err(ValidationError::OutOfRange {
                span,
                len: self.text.len(),
            });
        }
        if span.is_empty() {
            return Err(ValidationError::EmptySpan(span));
        }
        if !self.text.is_char_boundary(span.start) || !self.text.is_char_boundary(span.end) {
            return Err(ValidationError::NotCharBoundary(span));
        }
        Ok(())
    }

    /// Append a sentence. Sentences must arrive in text order without overlap.
    pub fn add_sentence(&mut self, span: Span) -> Result<usize, ValidationError> {
        self.check_span(span)?;
        if let Some(previous) = self.sentences.last() {
            if span.start < previous.span.end {
                return Err(ValidationError::SentenceOrder {
                    span,
                    previous: previous.span,
                });
            }
        }
        self.sentences.push(Sentence {
            span,
            tokens: Vec::new(),
            parse: None,
            sentiment: None,
            status: SentenceStatus::Ok,
        });
        Ok(self.sentences.len() - 1)
    }

    fn live_sentence_mut(&mut self, index: usize) -> Result<&mut Sentence, ValidationError> {
        let sentence = self
            .sentences
            .get_mut(index)
            .ok_or(ValidationError::NoSuchSentence(index))?;
        if sentence.is_failed() {
            return Err(ValidationError::SentenceFailed(index));
        }
        Ok(sentence)
    }

    /// Append a token to a sentence. Tokens must be strictly increasing and
    /// contained in the sentence span.
    pub fn add_token(&mut self, sentence: usize, span: Span) -> Result<usize, ValidationError> {
        self.check_span(span)?;
        let text = self.text[span.start..span.end].to_string();
        let target = self.live_sentence_mut(sentence)?;

        if !target.span.contains(&span) {
            return Err(ValidationError::TokenOutsideSentence {
                span,
                sentence: target.span,
            });
        }
        if let Some(previous) = target.tokens.last() {
            if span.start < previous.span.end {
                return Err(ValidationError::TokenOrder {
                    span,
                    previous: previous.span,
                });
            }
        }

        target.tokens.push(Token {
            text,
            span,
            pos: None,
            ner: None,
        });
        Ok(target.tokens.len() - 1)
    }

    fn token_mut(&mut self, sentence: usize, token: usize) -> Result<&mut Token, ValidationError> {
        self.live_sentence_mut(sentence)?
            .tokens
            .get_mut(token)
            .ok_or(ValidationError::NoSuchToken { sentence, token })
    }

    pub fn set_pos(
        &mut self,
        sentence: usize,
        token: usize,
        tag: impl Into<String>,
    ) -> Result<(), ValidationError> {
        let target = self.token_mut(sentence, token)?;
        if target.pos.is_some() {
            return Err(ValidationError::AlreadyAnnotated {
                field: "pos",
                sentence,
                token,
            });
        }
        target.pos = Some(tag.into());
        Ok(())
    }

    pub fn set_ner(
        &mut self,
        sentence: usize,
        token: usize,
        label: impl Into<String>,
    ) -> Result<(), ValidationError> {
        let target = self.token_mut(sentence, token)?;
        if target.ner.is_some() {
            return Err(ValidationError::AlreadyAnnotated {
                field: "ner",
                sentence,
                token,
            });
        }
        target.ner = Some(label.into());
        Ok(())
    }

    pub fn set_parse(
        &mut self,
        sentence: usize,
        graph: DependencyGraph,
    ) -> Result<(), ValidationError> {
        let target = self.live_sentence_mut(sentence)?;
        if target.parse.is_some() {
            return Err(ValidationError::AlreadyAnnotated {
                field: "parse",
                sentence,
                token: 0,
            });
        }
        graph
            .validate(target.tokens.len())
            .map_err(|reason| ValidationError::InvalidParse { sentence, reason })?;
        target.parse = Some(graph);
        Ok(())
    }

    pub fn set_sentiment(
        &mut self,
        sentence: usize,
        sentiment: Sentiment,
    ) -> Result<(), ValidationError> {
        let target = self.live_sentence_mut(sentence)?;
        if target.sentiment.is_some() {
            return Err(ValidationError::AlreadyAnnotated {
                field: "sentiment",
                sentence,
                token: 0,
            });
        }
        target.sentiment = Some(sentiment);
        Ok(())
    }

    /// Mark a sentence as failed. The first failure wins; later calls are no-ops.
    pub fn fail_sentence(
        &mut self,
        sentence: usize,
        stage: &str,
        reason: impl Into<String>,
    ) -> Result<(), ValidationError> {
        let target = self
            .sentences
            .get_mut(sentence)
            .ok_or(ValidationError::NoSuchSentence(sentence))?;
        if !target.is_failed() {
            target.status = SentenceStatus::Failed {
                stage: stage.to_string(),
                reason: reason.into(),
            };
        }
        Ok(())
    }

    pub fn transition(&mut self, next: DocumentStatus) -> Result<(), ValidationError> {
        if !self.status.can_transition_to(next) {
            return Err(ValidationError::InvalidTransition {
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        self.status = next;
        Ok(())
    }
}
