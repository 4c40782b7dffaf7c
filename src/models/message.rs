//! Wire envelopes exchanged with the broker.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::document::{ChunkInfo, Dependency, Document, SentenceStatus, Sentiment};
use super::result::{AnnotationResult, ResultStatus};
use super::span::CharOffsets;

/// Inbound payloads that cannot be turned into a document.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document id is empty")]
    EmptyId,
}

/// Inbound task: `{ "id": string, "text": string }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<ChunkInfo>,
}

impl InboundMessage {
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let message: InboundMessage = serde_json::from_slice(payload)?;
        if message.id.trim().is_empty() {
            return Err(DecodeError::EmptyId);
        }
        Ok(message)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn into_document(self) -> Document {
        Document::new(self.id, self.text).with_chunk(self.chunk)
    }
}

/// Best-effort id extraction from a payload that failed to decode, for logs.
pub fn peek_id(payload: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(payload).ok()?;
    value.get("id")?.as_str().map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundToken {
    pub text: String,
    pub span: [usize; 2],
    pub pos: Option<String>,
    pub ner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundSentence {
    pub tokens: Vec<OutboundToken>,
    pub span: [usize; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<Dependency>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outbound result envelope. Spans are character offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub id: String,
    pub sentences: Vec<OutboundSentence>,
    pub status: ResultStatus,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<ChunkInfo>,
}

impl OutboundMessage {
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl From<&AnnotationResult> for OutboundMessage {
    fn from(result: &AnnotationResult) -> Self {
        let offsets = CharOffsets::new(result.text());

        let sentences = result
            .sentences()
            .iter()
            .map(|sentence| OutboundSentence {
                tokens: sentence
                    .tokens()
                    .iter()
                    .map(|token| OutboundToken {
                        text: token.text().to_string(),
                        span: offsets.to_chars(token.span()),
                        pos: token.pos().map(str::to_string),
                        ner: token.ner().map(str::to_string),
                    })
                    .collect(),
                span: offsets.to_chars(sentence.span()),
                dependencies: sentence.parse().map(|graph| graph.edges.clone()),
                sentiment: sentence.sentiment(),
                error: match sentence.status() {
                    SentenceStatus::Ok => None,
                    SentenceStatus::Failed { stage, reason } => {
                        Some(format!("{}: {}", stage, reason))
                    }
                },
            })
            .collect();

        Self {
            id: result.id().to_string(),
            sentences,
            status: result.status(),
            error: result.error_summary(),
            chunk: result.chunk().cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Span;

    #[test]
    fn test_decode_valid_inbound() {
        let msg = InboundMessage::decode(br#"{"id":"d1","text":"Alice met Bob."}"#).unwrap();
        assert_eq!(msg.id, "d1");
        assert!(msg.chunk.is_none());
        let doc = msg.into_document();
        assert_eq!(doc.text(), "Alice met Bob.");
    }

    #[test]
    fn test_decode_rejects_missing_text() {
        let err = InboundMessage::decode(br#"{"id":"d2"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
        assert_eq!(peek_id(br#"{"id":"d2"}"#).as_deref(), Some("d2"));
    }

    #[test]
    fn test_decode_rejects_blank_id_and_garbage() {
        assert!(matches!(
            InboundMessage::decode(br#"{"id":"  ","text":"x"}"#),
            Err(DecodeError::EmptyId)
        ));
        assert!(InboundMessage::decode(b"not json").is_err());
        assert_eq!(peek_id(b"not json"), None);
    }

    #[test]
    fn test_outbound_shape_keeps_null_annotations() {
        let mut doc = Document::new("d1", "Hi");
        doc.add_sentence(Span::new(0, 2)).unwrap();
        doc.add_token(0, Span::new(0, 2)).unwrap();
        let result = AnnotationResult::finish(doc, None);

        let value: serde_json::Value =
            serde_json::from_slice(&OutboundMessage::from(&result).encode().unwrap()).unwrap();
        assert_eq!(value["id"], "d1");
        assert_eq!(value["status"], "ok");
        assert!(value["error"].is_null());
        assert!(value.get("chunk").is_none());
        let token = &value["sentences"][0]["tokens"][0];
        assert_eq!(token["text"], "Hi");
        assert_eq!(token["span"], serde_json::json!([0, 2]));
        assert!(token["pos"].is_null());
        assert!(token["ner"].is_null());
        assert!(value["sentences"][0].get("sentiment").is_none());
    }

    #[test]
    fn test_outbound_sentiment_is_lowercase() {
        let mut doc = Document::new("d1", "Great");
        doc.add_sentence(Span::new(0, 5)).unwrap();
        doc.set_sentiment(0, Sentiment::Positive).unwrap();
        let result = AnnotationResult::finish(doc, None);

        let value: serde_json::Value =
            serde_json::from_slice(&OutboundMessage::from(&result).encode().unwrap()).unwrap();
        assert_eq!(value["sentences"][0]["sentiment"], "positive");
        let decoded = OutboundMessage::decode(&OutboundMessage::from(&result).encode().unwrap()).unwrap();
        assert_eq!(decoded.sentences[0].sentiment, Some(Sentiment::Positive));
    }
}
