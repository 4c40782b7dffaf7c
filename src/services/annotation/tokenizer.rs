//! Penn Treebank style tokenization.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{Document, Span};

use super::annotator::Stage;
use super::lexicon::is_abbreviation;
use super::types::SentenceError;

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)(?:https?://|www\.)[^\s<>]+$").expect("valid regex")
});

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("valid regex")
});

static NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d[\d,]*(?:\.\d+)?$").expect("valid regex"));

/// Characters split off the front of a word.
const LEADING: &[char] = &['"', '\'', '(', '[', '{', '“', '‘', '$', '#', '«'];
/// Characters split off the end of a word.
const TRAILING: &[char] = &[
    '.', ',', ';', ':', '!', '?', ')', ']', '}', '"', '\'', '”', '’', '%', '»',
];
/// Punctuation that trails URLs and emails without being part of them.
const URL_TRAILING: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '"', '\'', '”', '’'];

const CLITICS: &[&str] = &[
    "'s", "'re", "'ll", "'ve", "'d", "'m", "’s", "’re", "’ll", "’ve", "’d", "’m",
];

/// Splits sentences into tokens.
///
/// Whitespace separates words; punctuation is peeled off word edges, clitics
/// and negations are split ("don't" -> "do" "n't"), and URLs, emails,
/// numbers and abbreviations stay whole. A sentence containing control
/// characters or U+FFFD is rejected.
#[derive(Debug, Default)]
pub struct Tokenizer;

impl Tokenizer {
    pub fn new() -> Self {
        Self
    }

    /// Byte spans of the tokens of `text`, relative to `text`.
    pub fn tokenize(&self, text: &str) -> Result<Vec<Span>, SentenceError> {
        let mut tokens = Vec::new();
        for (start, word) in words(text) {
            if let Some(bad) = word.chars().find(|c| c.is_control() || *c == '\u{FFFD}') {
                return Err(SentenceError::Unsupported(format!(
                    "character U+{:04X} in {:?}",
                    bad as u32, word
                )));
            }
            split_word(word, start, &mut tokens);
        }
        Ok(tokens)
    }
}

/// Whitespace-separated words with their byte offsets.
fn words(text: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                out.push((s, &text[s..i]));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        out.push((s, &text[s..]));
    }
    out
}

fn is_punct_only(word: &str) -> bool {
    word.chars().all(|c| !c.is_alphanumeric())
}

fn split_word(word: &str, offset: usize, out: &mut Vec<Span>) {
    if is_punct_only(word) {
        if matches!(word, "..." | "--" | "---" | "…") {
            out.push(Span::new(offset, offset + word.len()));
        } else {
            for (i, c) in word.char_indices() {
                out.push(Span::new(offset + i, offset + i + c.len_utf8()));
            }
        }
        return;
    }

    let mut lo = 0usize;
    let mut hi = word.len();

    // URLs and emails: only strip trailing sentence punctuation.
    let url_core = word.trim_end_matches(URL_TRAILING);
    if URL_PATTERN.is_match(url_core) || EMAIL_PATTERN.is_match(url_core) {
        out.push(Span::new(offset, offset + url_core.len()));
        push_chars(&word[url_core.len()..], offset + url_core.len(), out);
        return;
    }

    while let Some(c) = word[lo..hi].chars().next() {
        // A bare clitic ("'s") keeps its apostrophe.
        if is_clitic(word[lo..hi].trim_end_matches(TRAILING)) {
            break;
        }
        if LEADING.contains(&c) && hi - lo > c.len_utf8() {
            out.push(Span::new(offset + lo, offset + lo + c.len_utf8()));
            lo += c.len_utf8();
        } else {
            break;
        }
    }

    let mut trailing = Vec::new();
    loop {
        let core = &word[lo..hi];
        if core.ends_with("...") && core.len() > 3 {
            trailing.push(Span::new(offset + hi - 3, offset + hi));
            hi -= 3;
            continue;
        }
        let Some(c) = core.chars().next_back() else { break };
        if !TRAILING.contains(&c) || core.len() <= c.len_utf8() {
            break;
        }
        if c == '.' {
            let stem = &core[..core.len() - 1];
            // Abbreviations keep their period, even sentence-finally.
            if is_abbreviation(stem) {
                break;
            }
            // Keep decimals intact.
            if NUMBER_PATTERN.is_match(core) {
                break;
            }
        }
        trailing.push(Span::new(offset + hi - c.len_utf8(), offset + hi));
        hi -= c.len_utf8();
    }

    let core = &word[lo..hi];
    split_core(core, offset + lo, out);
    out.extend(trailing.into_iter().rev());
}

fn is_clitic(s: &str) -> bool {
    CLITICS.iter().any(|clitic| s.eq_ignore_ascii_case(clitic))
}

fn push_chars(s: &str, offset: usize, out: &mut Vec<Span>) {
    for (i, c) in s.char_indices() {
        out.push(Span::new(offset + i, offset + i + c.len_utf8()));
    }
}

/// Split clitics and negations off a word whose edge punctuation is gone.
fn split_core(core: &str, offset: usize, out: &mut Vec<Span>) {
    if core.is_empty() {
        return;
    }
    let lower = core.to_lowercase();

    if lower.len() > 3 && (lower.ends_with("n't") || lower.ends_with("n’t")) {
        let suffix_len = if lower.ends_with("n't") { 3 } else { 5 };
        let split = core.len() - suffix_len;
        // "can't" -> "ca" "n't"; keep a bare "n't" whole.
        if split > 0 && core.is_char_boundary(split) {
            out.push(Span::new(offset, offset + split));
            out.push(Span::new(offset + split, offset + core.len()));
            return;
        }
    }

    for clitic in CLITICS {
        if lower.len() > clitic.len() && lower.ends_with(clitic) {
            let split = core.len() - clitic.len();
            if core.is_char_boundary(split) {
                out.push(Span::new(offset, offset + split));
                out.push(Span::new(offset + split, offset + core.len()));
                return;
            }
        }
    }

    out.push(Span::new(offset, offset + core.len()));
}

impl Stage for Tokenizer {
    fn name(&self) -> &str {
        "tokenize"
    }

    fn process_sentence(&self, document: &mut Document, sentence: usize) -> Result<(), SentenceError> {
        let base = document.sentence(sentence)?.span().start;
        let spans = self.tokenize(document.sentence_text(sentence)?)?;
        for span in spans {
            document.add_token(sentence, Span::new(base + span.start, base + span.end))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<&str> {
        Tokenizer::new()
            .tokenize(text)
            .unwrap()
            .into_iter()
            .map(|s| &text[s.start..s.end])
            .collect()
    }

    #[test]
    fn test_simple_sentence() {
        assert_eq!(tokens("Alice met Bob."), vec!["Alice", "met", "Bob", "."]);
    }

    #[test]
    fn test_punctuation_is_peeled() {
        assert_eq!(
            tokens("\"Hello,\" she said (quietly)."),
            vec!["\"", "Hello", ",", "\"", "she", "said", "(", "quietly", ")", "."]
        );
    }

    #[test]
    fn test_clitics_and_negation() {
        assert_eq!(
            tokens("I don't think it's Bob's."),
            vec!["I", "do", "n't", "think", "it", "'s", "Bob", "'s", "."]
        );
        assert_eq!(tokens("We can't"), vec!["We", "ca", "n't"]);
    }

    #[test]
    fn test_standalone_clitic_stays_whole() {
        assert_eq!(tokens("'s"), vec!["'s"]);
        assert_eq!(tokens("James ' 's ."), vec!["James", "'", "'s", "."]);
        assert_eq!(tokens("the 'S."), vec!["the", "'S", "."]);
        assert_eq!(tokens("'ll"), vec!["'ll"]);
        // Quoted words still lose their opening quote.
        assert_eq!(tokens("'sup"), vec!["'", "sup"]);
    }

    #[test]
    fn test_abbreviations_keep_period() {
        assert_eq!(
            tokens("Mr. Smith joined the U.S. Army."),
            vec!["Mr.", "Smith", "joined", "the", "U.S.", "Army", "."]
        );
        assert_eq!(tokens("He lives in the U.S."), vec!["He", "lives", "in", "the", "U.S."]);
    }

    #[test]
    fn test_urls_emails_and_numbers_stay_whole() {
        assert_eq!(
            tokens("Mail bob@example.com or see https://example.com/a?b=1."),
            vec!["Mail", "bob@example.com", "or", "see", "https://example.com/a?b=1", "."]
        );
        assert_eq!(
            tokens("It cost $1,200.50 or 15%."),
            vec!["It", "cost", "$", "1,200.50", "or", "15", "%", "."]
        );
    }

    #[test]
    fn test_ellipsis() {
        assert_eq!(tokens("Wait... no"), vec!["Wait", "...", "no"]);
    }

    #[test]
    fn test_control_characters_rejected() {
        let err = Tokenizer::new().tokenize("bad \u{0007} input").unwrap_err();
        assert!(matches!(err, SentenceError::Unsupported(_)));
        assert!(Tokenizer::new().tokenize("bad \u{FFFD}").is_err());
    }

    #[test]
    fn test_tabs_and_newlines_separate_words() {
        assert_eq!(tokens("one\ttwo\nthree"), vec!["one", "two", "three"]);
    }
}
