//! Lexicon-based sentence sentiment.

use std::sync::Arc;

use crate::models::{Document, Sentiment};

use super::annotator::Stage;
use super::lexicon::LanguageModels;
use super::types::SentenceError;

/// Polar words after a negator that have their polarity flipped.
const NEGATION_WINDOW: usize = 3;

/// Labels each sentence positive, negative or neutral.
///
/// Polar words from the lexicon are summed. A negator flips the next few
/// words, punctuation ends the negation, and a contrastive conjunction
/// ("but", "however") discards the score built up before it.
pub struct SentimentScorer {
    models: Arc<LanguageModels>,
}

impl SentimentScorer {
    pub fn new(models: Arc<LanguageModels>) -> Self {
        Self { models }
    }

    pub fn score<'a>(&self, words: impl IntoIterator<Item = &'a str>) -> i32 {
        let mut score = 0;
        let mut negated = 0usize;
        for word in words {
            if !word.chars().any(char::is_alphanumeric) && word != "n't" {
                negated = 0;
                continue;
            }
            if self.models.is_contrastive(word) {
                score = 0;
                negated = 0;
                continue;
            }
            if self.models.is_negator(word) {
                negated = NEGATION_WINDOW;
                continue;
            }
            let polarity = self.models.polarity(word);
            score += if negated > 0 { -polarity } else { polarity };
            negated = negated.saturating_sub(1);
        }
        score
    }

    pub fn classify<'a>(&self, words: impl IntoIterator<Item = &'a str>) -> Sentiment {
        match self.score(words) {
            s if s > 0 => Sentiment::Positive,
            s if s < 0 => Sentiment::Negative,
            _ => Sentiment::Neutral,
        }
    }
}

impl Stage for SentimentScorer {
    fn name(&self) -> &str {
        "sentiment"
    }

    fn process_sentence(&self, document: &mut Document, sentence: usize) -> Result<(), SentenceError> {
        let sentiment = self.classify(
            document
                .sentence(sentence)?
                .tokens()
                .iter()
                .map(|token| token.text()),
        );
        document.set_sentiment(sentence, sentiment)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> SentimentScorer {
        SentimentScorer::new(Arc::new(LanguageModels::builtin()))
    }

    fn classify(text: &str) -> Sentiment {
        scorer().classify(text.split_whitespace())
    }

    #[test]
    fn test_polar_sentences() {
        assert_eq!(classify("What a wonderful day ."), Sentiment::Positive);
        assert_eq!(classify("The food was awful and cold ."), Sentiment::Negative);
        assert_eq!(classify("Alice met Bob ."), Sentiment::Neutral);
    }

    #[test]
    fn test_negation_flips_polarity() {
        assert_eq!(classify("It was not good ."), Sentiment::Negative);
        assert_eq!(classify("It is n't bad at all ."), Sentiment::Positive);
        // Punctuation closes the negation.
        assert_eq!(classify("No , it was great ."), Sentiment::Positive);
    }

    #[test]
    fn test_contrast_keeps_the_later_clause() {
        assert_eq!(classify("The start was good but the end was terrible ."), Sentiment::Negative);
        assert_eq!(classify("Sad at first , however it ended happy ."), Sentiment::Positive);
    }

    #[test]
    fn test_stage_labels_live_sentences() {
        use crate::models::Span;

        let mut doc = Document::new("d", "Great. Bad input.");
        doc.add_sentence(Span::new(0, 6)).unwrap();
        doc.add_token(0, Span::new(0, 5)).unwrap();
        doc.add_token(0, Span::new(5, 6)).unwrap();
        doc.add_sentence(Span::new(7, 17)).unwrap();
        doc.fail_sentence(1, "tokenize", "unsupported").unwrap();

        scorer().process(&mut doc).unwrap();
        assert_eq!(doc.sentences()[0].sentiment(), Some(Sentiment::Positive));
        assert_eq!(doc.sentences()[1].sentiment(), None);
    }
}
