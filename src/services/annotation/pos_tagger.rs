//! Part-of-speech tagging with Penn Treebank tags.
//!
//! A lexicon pass assigns each token its most likely tag, falling back to
//! shape and suffix rules for unknown words, then a small set of contextual
//! rules repairs the common ambiguities (verb vs. noun after a determiner,
//! past tense vs. participle after an auxiliary, possessive vs. "is").

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::models::Document;

use super::annotator::Stage;
use super::lexicon::{
    LanguageModels, AUXILIARY_BE, AUXILIARY_HAVE, BASE_VERBS, CLOSED_CLASS, COMMON_ADJECTIVES,
    IRREGULAR_PARTICIPLES, IRREGULAR_PAST,
};
use super::types::SentenceError;

static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(?:\d[\d,]*(?:\.\d+)?|\.\d+)$").expect("valid regex")
});
static ORDINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(?:st|nd|rd|th)$").expect("valid regex"));
static URL_OR_EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:https?://|www\.)|@").expect("valid regex"));

/// A token as seen by the tagger.
#[derive(Debug, Clone, Copy)]
pub struct TagInput<'a> {
    pub text: &'a str,
    /// Whether whitespace (or the sentence start) precedes the token.
    pub spaced: bool,
}

pub struct PosTagger {
    models: Arc<LanguageModels>,
}

impl PosTagger {
    pub fn new(models: Arc<LanguageModels>) -> Self {
        Self { models }
    }

    pub fn tag(&self, tokens: &[TagInput<'_>]) -> Vec<&'static str> {
        let mut tags: Vec<&'static str> = tokens
            .iter()
            .enumerate()
            .map(|(i, token)| self.initial_tag(token, i == 0))
            .collect();
        repair(tokens, &mut tags);
        tags
    }

    fn initial_tag(&self, token: &TagInput<'_>, sentence_start: bool) -> &'static str {
        let word = token.text;
        if let Some(tag) = punctuation_tag(word, token.spaced) {
            return tag;
        }
        if NUMBER.is_match(word) {
            return "CD";
        }
        if ORDINAL.is_match(word) {
            return "JJ";
        }
        if URL_OR_EMAIL.is_match(word) {
            return "NN";
        }

        let lower = word.to_lowercase();
        if word == "I" {
            return "PRP";
        }
        if let Some(tag) = lexicon_tag(&lower) {
            let capitalized = starts_uppercase(word);
            // "May", "Will" and friends mid-sentence are names, not modals.
            if capitalized && !sentence_start && word.len() > 1 {
                return "NNP";
            }
            return tag;
        }

        if starts_uppercase(word) {
            if sentence_start
                && !self.models.is_given_name(word)
                && self.models.lookup([word]).is_none()
            {
                let guess = suffix_tag(&lower);
                if guess != "NN" && guess != "NNS" {
                    return guess;
                }
            }
            return "NNP";
        }
        suffix_tag(&lower)
    }
}

fn starts_uppercase(word: &str) -> bool {
    word.chars().next().is_some_and(char::is_uppercase)
}

fn punctuation_tag(word: &str, spaced: bool) -> Option<&'static str> {
    let tag = match word {
        "." | "!" | "?" => ".",
        "," => ",",
        ":" | ";" | "-" | "--" | "---" | "..." | "…" => ":",
        "(" | "[" | "{" => "-LRB-",
        ")" | "]" | "}" => "-RRB-",
        "“" | "‘" | "``" | "«" => "``",
        "”" | "’" | "''" | "»" => "''",
        "\"" | "'" => {
            if spaced {
                "``"
            } else {
                "''"
            }
        }
        "$" | "€" | "£" => "$",
        "#" => "#",
        "%" => "NN",
        "&" => "CC",
        _ => {
            if word.chars().all(|c| !c.is_alphanumeric()) {
                "SYM"
            } else {
                return None;
            }
        }
    };
    Some(tag)
}

fn lexicon_tag(lower: &str) -> Option<&'static str> {
    if let Some(tag) = CLOSED_CLASS.get(lower) {
        return Some(*tag);
    }
    match lower {
        "'s" | "’s" => return Some("POS"),
        "'re" | "’re" | "'m" | "’m" | "'ve" | "’ve" => return Some("VBP"),
        "'ll" | "’ll" | "'d" | "’d" => return Some("MD"),
        "n't" | "n’t" => return Some("RB"),
        _ => {}
    }
    if IRREGULAR_PAST.contains(lower) {
        return Some("VBD");
    }
    if IRREGULAR_PARTICIPLES.contains(lower) {
        return Some("VBN");
    }
    if BASE_VERBS.contains(lower) {
        return Some("VBP");
    }
    if COMMON_ADJECTIVES.contains(lower) {
        return Some("JJ");
    }
    None
}

fn suffix_tag(lower: &str) -> &'static str {
    let len = lower.chars().count();
    if len > 3 && lower.ends_with("ly") {
        return "RB";
    }
    if len > 4 && lower.ends_with("ing") {
        return "VBG";
    }
    if len > 3 && lower.ends_with("ed") {
        return "VBD";
    }
    const NOUN_SUFFIXES: &[&str] = &[
        "tion", "sion", "ment", "ness", "ity", "ship", "ance", "ence", "ism", "ist", "hood",
    ];
    if len > 4 && NOUN_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
        return "NN";
    }
    const ADJ_SUFFIXES: &[&str] = &["ous", "ful", "ive", "able", "ible", "less", "ish", "ical", "ary"];
    if len > 4 && ADJ_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
        return "JJ";
    }
    if len > 4 && ["ize", "ise", "ify"].iter().any(|s| lower.ends_with(s)) {
        return "VB";
    }
    if len > 3
        && lower.ends_with('s')
        && !lower.ends_with("ss")
        && !lower.ends_with("us")
        && !lower.ends_with("is")
    {
        // Third-person verbs are fixed up in context.
        let stem = &lower[..lower.len() - 1];
        if BASE_VERBS.contains(stem) || BASE_VERBS.contains(lower.trim_end_matches("es")) {
            return "VBZ";
        }
        return "NNS";
    }
    "NN"
}

fn is_noun(tag: &str) -> bool {
    tag.starts_with("NN") || tag == "PRP" || tag == "CD"
}

fn is_verb(tag: &str) -> bool {
    tag.starts_with("VB") || tag == "MD"
}

/// Contextual repairs, applied left to right.
fn repair(tokens: &[TagInput<'_>], tags: &mut [&'static str]) {
    for i in 0..tags.len() {
        let lower = tokens[i].text.to_lowercase();
        let prev = if i > 0 { Some(tags[i - 1]) } else { None };
        let prev_lower = if i > 0 {
            tokens[i - 1].text.to_lowercase()
        } else {
            String::new()
        };
        let next = tags.get(i + 1).copied();

        match tags[i] {
            // "to go", "will go"
            "VBP" | "VBD" | "NN" if matches!(prev, Some("TO") | Some("MD")) => {
                if BASE_VERBS.contains(lower.as_str()) {
                    tags[i] = "VB";
                }
            }
            // "the run", "a walk", "his work"
            "VBP" | "VB" if matches!(prev, Some("DT") | Some("PRP$") | Some("JJ")) => {
                tags[i] = "NN";
            }
            // Sentence-initial base verb reads as an imperative.
            "VBP" if i == 0 => tags[i] = "VB",
            // "has met", "was taken"
            "VBD" if AUXILIARY_HAVE.contains(prev_lower.as_str())
                || AUXILIARY_BE.contains(prev_lower.as_str()) =>
            {
                if !matches!(lower.as_str(), "was" | "were" | "had" | "did") {
                    tags[i] = "VBN";
                }
            }
            "VBZ" if prev.is_some_and(|t| t == "DT" || t == "JJ") => tags[i] = "NNS",
            "POS" => {
                // "it's", "he's" contract "is"; after a noun it's possessive.
                if prev == Some("PRP") || prev == Some("EX") || prev == Some("WP") {
                    tags[i] = "VBZ";
                }
            }
            "NNS" if prev == Some("PRP") && BASE_VERBS.contains(lower.trim_end_matches('s')) => {
                tags[i] = "VBZ";
            }
            "EX" if !next.is_some_and(is_verb) => tags[i] = "RB",
            "PRP$" if lower == "her" => {
                if next.map_or(true, |t| !(is_noun(t) || t == "JJ")) {
                    tags[i] = "PRP";
                }
            }
            "DT" if lower == "that" => {
                if next.is_some_and(|t| t == "DT" || t == "PRP" || t == "NNP" || is_verb(t)) {
                    tags[i] = if next.is_some_and(is_verb) { "WDT" } else { "IN" };
                }
            }
            _ => {}
        }
    }
}

impl Stage for PosTagger {
    fn name(&self) -> &str {
        "pos"
    }

    fn process_sentence(&self, document: &mut Document, sentence: usize) -> Result<(), SentenceError> {
        let tags = {
            let text = document.text();
            let tokens = document.sentence(sentence)?.tokens();
            let inputs: Vec<TagInput<'_>> = tokens
                .iter()
                .enumerate()
                .map(|(i, token)| {
                    let spaced = if i == 0 {
                        true
                    } else {
                        let gap = &text[tokens[i - 1].span().end..token.span().start];
                        !gap.is_empty()
                    };
                    TagInput {
                        text: token.text(),
                        spaced,
                    }
                })
                .collect();
            self.tag(&inputs)
        };

        for (index, tag) in tags.into_iter().enumerate() {
            document.set_pos(sentence, index, tag)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(words: &[&str]) -> Vec<&'static str> {
        let tagger = PosTagger::new(Arc::new(LanguageModels::builtin()));
        let inputs: Vec<TagInput<'_>> = words
            .iter()
            .map(|&w| TagInput {
                text: w,
                spaced: true,
            })
            .collect();
        tagger.tag(&inputs)
    }

    #[test]
    fn test_basic_sentence() {
        assert_eq!(tag(&["Alice", "met", "Bob", "."]), vec!["NNP", "VBD", "NNP", "."]);
    }

    #[test]
    fn test_determiner_noun_and_adjective() {
        assert_eq!(
            tag(&["The", "old", "dog", "runs", "quickly", "."]),
            vec!["DT", "JJ", "NN", "VBZ", "RB", "."]
        );
    }

    #[test]
    fn test_auxiliary_and_participle() {
        assert_eq!(
            tag(&["She", "has", "met", "them"]),
            vec!["PRP", "VBZ", "VBN", "PRP"]
        );
        assert_eq!(tag(&["He", "was", "arrested"]), vec!["PRP", "VBD", "VBN"]);
    }

    #[test]
    fn test_infinitive_and_modal() {
        assert_eq!(tag(&["I", "want", "to", "go"]), vec!["PRP", "VBP", "TO", "VB"]);
        assert_eq!(tag(&["We", "will", "meet"]), vec!["PRP", "MD", "VB"]);
    }

    #[test]
    fn test_possessive_and_contraction() {
        assert_eq!(tag(&["Bob", "'s", "car"]), vec!["NNP", "POS", "NN"]);
        assert_eq!(tag(&["it", "'s", "late"]), vec!["PRP", "VBZ", "JJ"]);
        assert_eq!(tag(&["do", "n't"])[1], "RB");
    }

    #[test]
    fn test_numbers_and_symbols() {
        assert_eq!(tag(&["$", "1,200.50"]), vec!["$", "CD"]);
        assert_eq!(tag(&["15", "%"]), vec!["CD", "NN"]);
        assert_eq!(tag(&["(", "x", ")"]), vec!["-LRB-", "NN", "-RRB-"]);
    }

    #[test]
    fn test_quotes_use_spacing() {
        let tagger = PosTagger::new(Arc::new(LanguageModels::builtin()));
        let tags = tagger.tag(&[
            TagInput { text: "\"", spaced: true },
            TagInput { text: "Hi", spaced: false },
            TagInput { text: "\"", spaced: false },
        ]);
        assert_eq!(tags, vec!["``", "NNP", "''"]);
    }

    #[test]
    fn test_sentence_initial_capitalisation() {
        assert_eq!(tag(&["Quickly", "leave"])[0], "RB");
        assert_eq!(tag(&["Yesterday", "Alice", "left"]), vec!["RB", "NNP", "VBD"]);
    }
}
