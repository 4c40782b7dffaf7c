//! Structural properties of pipeline output over generated text
//!
//! Documents are assembled from a fixed vocabulary with a seeded generator so
//! failures reproduce.

use std::sync::Arc;

use nlpipe::models::{Document, OutboundMessage, ResultStatus};
use nlpipe::services::annotation::{AnnotationPipeline, LanguageModels, PipelineOptions};

const WORDS: &[&str] = &[
    "Alice", "Bob", "met", "the", "committee", "in", "Paris", "on", "Monday", "café", "naïve",
    "Zürich", "résumé", "Dr.", "Mr.", "U.S.", "3.14", "42", "don't", "state-of-the-art", "IBM",
    "(quietly)", "\"quoted\"", "e-mail", "über", "東京", "and", "said", "it's", "Smith",
];

const BREAKS: &[&str] = &[" ", " ", " ", ", ", "; ", "  ", "\n", " - "];
const ENDINGS: &[&str] = &[".", "!", "?", "...", ".\"", ""];

/// Small linear congruential generator; deterministic across platforms.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[(self.next() as usize) % items.len()]
    }

    fn range(&mut self, low: usize, high: usize) -> usize {
        low + (self.next() as usize) % (high - low + 1)
    }
}

fn generate(rng: &mut Lcg) -> String {
    let mut text = String::new();
    for _ in 0..rng.range(1, 6) {
        if !text.is_empty() {
            text.push_str(if rng.range(0, 4) == 0 { "\n\n" } else { " " });
        }
        for w in 0..rng.range(1, 14) {
            if w > 0 {
                text.push_str(rng.pick(BREAKS));
            }
            text.push_str(rng.pick(WORDS));
        }
        text.push_str(rng.pick(ENDINGS));
    }
    text
}

fn pipeline(parse: bool) -> AnnotationPipeline {
    AnnotationPipeline::standard(
        Arc::new(LanguageModels::builtin()),
        &PipelineOptions {
            dependency_parse: parse,
            ..PipelineOptions::default()
        },
    )
}

#[test]
fn test_spans_are_ordered_and_contained() {
    let pipeline = pipeline(true);
    let mut rng = Lcg(0x5eed);

    for case in 0..300 {
        let text = generate(&mut rng);
        let result = pipeline
            .run(Document::new(format!("case-{}", case), text.clone()))
            .unwrap_or_else(|e| panic!("case {} failed on {:?}: {}", case, text, e));
        assert_ne!(result.status(), ResultStatus::Failed, "case {}: {:?}", case, text);

        let mut previous_sentence_end = 0;
        for sentence in result.sentences() {
            let span = sentence.span();
            assert!(span.start >= previous_sentence_end, "case {}: {:?}", case, text);
            assert!(span.end <= text.len());
            assert!(!span.is_empty());
            previous_sentence_end = span.end;

            let mut previous_token_end = span.start;
            for token in sentence.tokens() {
                let t = token.span();
                assert!(!t.is_empty(), "case {}: empty token in {:?}", case, text);
                assert!(t.start >= previous_token_end, "case {}: {:?}", case, text);
                assert!(span.contains(&t), "case {}: {:?}", case, text);
                assert_eq!(t.slice(&text), Some(token.text()));
                previous_token_end = t.end;
            }

            if !sentence.is_failed() {
                assert!(sentence.tokens().iter().all(|t| t.pos().is_some() && t.ner().is_some()));
                if let Some(graph) = sentence.parse() {
                    graph.validate(sentence.tokens().len()).unwrap();
                }
            }
        }
    }
}

#[test]
fn test_wire_offsets_count_characters() {
    let pipeline = pipeline(false);
    let mut rng = Lcg(0xfeed_beef);

    for case in 0..200 {
        let text = generate(&mut rng);
        let result = pipeline.run(Document::new("doc", text.clone())).unwrap();
        let message = OutboundMessage::from(&result);
        let chars: Vec<char> = text.chars().collect();

        for sentence in &message.sentences {
            for token in &sentence.tokens {
                let [start, end] = token.span;
                let rebuilt: String = chars[start..end].iter().collect();
                assert_eq!(rebuilt, token.text, "case {}: {:?}", case, text);
            }
        }
    }
}

#[test]
fn test_annotation_is_deterministic() {
    let pipeline = pipeline(true);
    let mut rng = Lcg(7);

    for _ in 0..50 {
        let text = generate(&mut rng);
        let first = OutboundMessage::from(&pipeline.run(Document::new("d", text.clone())).unwrap());
        let second = OutboundMessage::from(&pipeline.run(Document::new("d", text)).unwrap());
        assert_eq!(first, second);
    }
}
