//! Sentence segmentation.

use crate::models::{Document, Span};

use super::annotator::Stage;
use super::lexicon::is_abbreviation;
use super::types::StageError;

const TERMINATORS: [char; 3] = ['.', '!', '?'];
const CLOSERS: [char; 8] = ['"', '\'', ')', ']', '}', '”', '’', '»'];

/// Splits text into sentences on terminal punctuation and blank lines.
///
/// A period ends a sentence only when followed by whitespace and something
/// that can start a sentence, and when the word before it is not a known
/// abbreviation or an initial. Closing quotes and brackets after the
/// terminator stay with the sentence.
#[derive(Debug, Default)]
pub struct SentenceSegmenter;

impl SentenceSegmenter {
    pub fn new() -> Self {
        Self
    }

    /// Sentence spans of `text`, in order, trimmed of surrounding whitespace.
    pub fn segment(&self, text: &str) -> Vec<Span> {
        let mut spans = Vec::new();
        let mut start: Option<usize> = None;
        let mut last_content_end = 0usize;
        let mut newlines = 0usize;

        let mut iter = text.char_indices().peekable();
        while let Some((i, c)) = iter.next() {
            if c.is_whitespace() {
                if c == '\n' {
                    newlines += 1;
                    if newlines >= 2 {
                        if let Some(s) = start.take() {
                            spans.push(Span::new(s, last_content_end));
                        }
                    }
                }
                continue;
            }

            newlines = 0;
            if start.is_none() {
                start = Some(i);
            }
            last_content_end = i + c.len_utf8();

            if !TERMINATORS.contains(&c) {
                continue;
            }

            // Swallow runs like "?!" or '."' into the sentence.
            let mut end = last_content_end;
            while let Some(&(j, next)) = iter.peek() {
                if TERMINATORS.contains(&next) || CLOSERS.contains(&next) {
                    end = j + next.len_utf8();
                    iter.next();
                } else {
                    break;
                }
            }
            last_content_end = end;

            let at_end = text[end..].trim().is_empty();
            if !at_end && !is_boundary(text, i, c, end) {
                continue;
            }
            if let Some(s) = start.take() {
                spans.push(Span::new(s, end));
            }
        }

        if let Some(s) = start {
            spans.push(Span::new(s, last_content_end));
        }
        spans
    }
}

/// Decide whether the terminator `c` at byte `i` (with trailing run ending at
/// `end`) closes a sentence.
fn is_boundary(text: &str, i: usize, c: char, end: usize) -> bool {
    let rest = &text[end..];
    if !rest.starts_with(char::is_whitespace) {
        return false;
    }
    let opener = rest.trim_start().chars().next();
    let starts_sentence = match opener {
        Some(ch) => {
            ch.is_uppercase()
                || ch.is_numeric()
                || matches!(ch, '"' | '\'' | '“' | '‘' | '(' | '[')
        }
        None => true,
    };
    if !starts_sentence {
        return false;
    }

    if c == '.' && end == i + 1 {
        let word_start = text[..i]
            .rfind(char::is_whitespace)
            .map(|p| p + text[p..].chars().next().map_or(1, char::len_utf8))
            .unwrap_or(0);
        if is_abbreviation(&text[word_start..i]) {
            return false;
        }
    }
    true
}

impl Stage for SentenceSegmenter {
    fn name(&self) -> &str {
        "segment"
    }

    fn process(&self, document: &mut Document) -> Result<(), StageError> {
        let spans = self.segment(document.text());
        for span in spans {
            document.add_sentence(span)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentences(text: &str) -> Vec<&str> {
        SentenceSegmenter::new()
            .segment(text)
            .into_iter()
            .map(|s| &text[s.start..s.end])
            .collect()
    }

    #[test]
    fn test_single_sentence() {
        assert_eq!(sentences("Alice met Bob."), vec!["Alice met Bob."]);
    }

    #[test]
    fn test_multiple_sentences() {
        assert_eq!(
            sentences("Alice met Bob. They talked! Did it rain?"),
            vec!["Alice met Bob.", "They talked!", "Did it rain?"]
        );
    }

    #[test]
    fn test_abbreviations_and_initials_do_not_split() {
        assert_eq!(
            sentences("Mr. Smith met Dr. J. Doe in the U.S. Army. Then he left."),
            vec!["Mr. Smith met Dr. J. Doe in the U.S. Army.", "Then he left."]
        );
    }

    #[test]
    fn test_lowercase_continuation_and_decimals() {
        assert_eq!(
            sentences("It cost 3.50 dollars. e.g. this stays together."),
            vec!["It cost 3.50 dollars. e.g. this stays together."]
        );
    }

    #[test]
    fn test_closing_quotes_stay_with_sentence() {
        assert_eq!(
            sentences("He said \"stop.\" She agreed."),
            vec!["He said \"stop.\"", "She agreed."]
        );
    }

    #[test]
    fn test_blank_line_ends_sentence() {
        assert_eq!(
            sentences("A heading\n\nBody text here"),
            vec!["A heading", "Body text here"]
        );
    }

    #[test]
    fn test_whitespace_only_and_empty() {
        assert!(sentences("").is_empty());
        assert!(sentences("   \n\t ").is_empty());
    }

    #[test]
    fn test_spans_are_trimmed_and_ordered() {
        let text = "  First one.   Second one  ";
        let spans = SentenceSegmenter::new().segment(text);
        assert_eq!(spans.len(), 2);
        assert_eq!(&text[spans[0].start..spans[0].end], "First one.");
        assert_eq!(&text[spans[1].start..spans[1].end], "Second one");
        assert!(spans[0].end <= spans[1].start);
    }
}
