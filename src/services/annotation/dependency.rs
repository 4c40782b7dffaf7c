//! Heuristic dependency parsing with Universal Dependencies relations.
//!
//! The parser chunks a tagged sentence into noun phrases and a main verb
//! group, then attaches phrases to the verb by position: the noun phrase
//! before the verb is its subject, the first bare one after it the object,
//! and phrases introduced by a preposition become obliques (or nominal
//! modifiers after "of"). Every token ends up with exactly one head.

use crate::models::{Dependency, DependencyGraph, Document};

use super::annotator::Stage;
use super::types::SentenceError;

#[derive(Debug, Default)]
pub struct DependencyParser;

#[derive(Debug, Clone, Copy)]
struct Phrase {
    start: usize,
    end: usize,
    head: usize,
}

fn is_noun_head(tag: &str) -> bool {
    tag.starts_with("NN") || matches!(tag, "PRP" | "CD" | "EX" | "WP")
}

fn is_np_modifier(tag: &str) -> bool {
    matches!(tag, "DT" | "PRP$" | "JJ" | "JJR" | "JJS" | "CD" | "POS" | "WP$" | "$")
        || tag.starts_with("NN")
}

fn is_verb(tag: &str) -> bool {
    tag.starts_with("VB") || tag == "MD"
}

fn is_punct(tag: &str) -> bool {
    matches!(tag, "." | "," | ":" | "``" | "''" | "-LRB-" | "-RRB-" | "#" | "SYM")
}

impl DependencyParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a sentence given its words and POS tags.
    pub fn parse(&self, words: &[&str], tags: &[&str]) -> DependencyGraph {
        let n = tags.len();
        let mut heads: Vec<Option<Option<usize>>> = vec![None; n];
        let mut relations: Vec<&'static str> = vec!["dep"; n];
        if n == 0 {
            return DependencyGraph::default();
        }

        let phrases = noun_phrases(tags);
        let phrase_of = |token: usize| {
            phrases
                .iter()
                .position(|p| p.start <= token && token <= p.end)
        };

        // Main verb: the last verb of the first verb group.
        let mut root = None;
        let mut auxiliaries = Vec::new();
        if let Some(first) = tags.iter().position(|t| is_verb(t)) {
            let mut last = first;
            let mut j = first + 1;
            while j < n && (is_verb(tags[j]) || tags[j] == "RB") {
                if is_verb(tags[j]) {
                    last = j;
                }
                j += 1;
            }
            auxiliaries.extend((first..last).filter(|&k| is_verb(tags[k])));
            root = Some(last);
        }
        let root = root
            .or_else(|| phrases.first().map(|p| p.head))
            .unwrap_or(0);
        heads[root] = Some(None);
        relations[root] = "root";

        for &aux in &auxiliaries {
            heads[aux] = Some(Some(root));
            let passive = auxiliaries.last() == Some(&aux)
                && tags[root] == "VBN"
                && matches!(
                    words[aux].to_lowercase().as_str(),
                    "is" | "are" | "was" | "were" | "be" | "been" | "being" | "am"
                );
            relations[aux] = if passive { "aux:pass" } else { "aux" };
        }

        // Phrase-internal structure.
        for phrase in &phrases {
            for token in phrase.start..=phrase.end {
                if token == phrase.head || heads[token].is_some() {
                    continue;
                }
                heads[token] = Some(Some(phrase.head));
                let possessor = token < phrase.end && tags[token + 1] == "POS";
                relations[token] = match tags[token] {
                    _ if possessor => "nmod:poss",
                    "DT" | "WP$" => "det",
                    "PRP$" => "nmod:poss",
                    "JJ" | "JJR" | "JJS" => "amod",
                    "CD" => "nummod",
                    "POS" => "case",
                    "$" => "dep",
                    _ => "compound",
                };
            }
        }

        // Attach phrase heads. Bare phrases before the verb are subject
        // candidates; the one nearest the verb wins.
        let mut seen_object = false;
        let mut subjects = Vec::new();
        for (index, phrase) in phrases.iter().enumerate() {
            if phrase.head == root || heads[phrase.head].is_some() {
                continue;
            }
            let before = phrase.start.checked_sub(1);
            let preposition = before.filter(|&b| matches!(tags[b], "IN" | "TO"));

            if let Some(prep) = preposition {
                heads[prep] = Some(Some(phrase.head));
                relations[prep] = "case";
                let previous = index.checked_sub(1).map(|i| phrases[i]);
                let nominal = words[prep].eq_ignore_ascii_case("of")
                    && previous.is_some_and(|p| p.end + 1 == prep);
                match previous.filter(|_| nominal) {
                    Some(prev) => {
                        heads[phrase.head] = Some(Some(prev.head));
                        relations[phrase.head] = "nmod";
                    }
                    None => {
                        heads[phrase.head] = Some(Some(root));
                        relations[phrase.head] = "obl";
                    }
                }
                continue;
            }

            // Coordination: "Alice and Bob".
            if let Some(cc) = before.filter(|&b| tags[b] == "CC") {
                if let Some(prev) = cc.checked_sub(1).and_then(phrase_of) {
                    heads[phrase.head] = Some(Some(phrases[prev].head));
                    relations[phrase.head] = "conj";
                    heads[cc] = Some(Some(phrase.head));
                    relations[cc] = "cc";
                    continue;
                }
            }

            heads[phrase.head] = Some(Some(root));
            relations[phrase.head] = if phrase.head < root {
                subjects.push(phrase.head);
                "dep"
            } else if !seen_object {
                seen_object = true;
                "obj"
            } else {
                "dep"
            };
        }
        if let Some(&subject) = subjects.last() {
            let passive = auxiliaries.iter().any(|&a| relations[a] == "aux:pass");
            relations[subject] = if passive { "nsubj:pass" } else { "nsubj" };
        }

        // Everything else hangs off the root.
        for token in 0..n {
            if heads[token].is_some() {
                continue;
            }
            heads[token] = Some(Some(root));
            relations[token] = match tags[token] {
                t if is_punct(t) => "punct",
                "RB" | "RBR" | "RBS" | "WRB" => "advmod",
                "CC" => "cc",
                "TO" if token + 1 < n && tags[token + 1] == "VB" => "mark",
                "IN" | "TO" => "case",
                "UH" => "discourse",
                t if is_verb(t) => {
                    if token > 0 && tags[token - 1] == "TO" {
                        "xcomp"
                    } else {
                        "conj"
                    }
                }
                _ => "dep",
            };
        }

        // "to" marks the infinitive that follows it.
        for token in 0..n.saturating_sub(1) {
            if relations[token] == "mark" && token + 1 != root {
                heads[token] = Some(Some(token + 1));
            }
        }

        DependencyGraph {
            edges: heads
                .into_iter()
                .enumerate()
                .map(|(dependent, head)| Dependency {
                    head: head.flatten(),
                    dependent,
                    relation: relations[dependent].to_string(),
                })
                .collect(),
        }
    }
}

/// Maximal runs of nominal modifiers ending in a noun head.
fn noun_phrases(tags: &[&str]) -> Vec<Phrase> {
    let mut phrases = Vec::new();
    let mut i = 0;
    while i < tags.len() {
        if !is_np_modifier(tags[i]) && !is_noun_head(tags[i]) {
            i += 1;
            continue;
        }
        if matches!(tags[i], "PRP" | "EX" | "WP") {
            phrases.push(Phrase { start: i, end: i, head: i });
            i += 1;
            continue;
        }
        let start = i;
        let mut head = None;
        while i < tags.len() && is_np_modifier(tags[i]) {
            if is_noun_head(tags[i]) {
                head = Some(i);
            }
            i += 1;
        }
        match head {
            Some(head) => phrases.push(Phrase {
                start,
                end: head,
                head,
            }),
            None => {
                // Modifiers without a noun ("the big") do not form a phrase.
            }
        }
        // Trailing modifiers after the head are left for the root fallback.
        if let Some(last) = phrases.last() {
            if last.end + 1 < i && last.start == start {
                i = last.end + 1;
            }
        }
    }
    phrases
}

impl Stage for DependencyParser {
    fn name(&self) -> &str {
        "parse"
    }

    fn process_sentence(&self, document: &mut Document, sentence: usize) -> Result<(), SentenceError> {
        let graph = {
            let tokens = document.sentence(sentence)?.tokens();
            let words: Vec<&str> = tokens.iter().map(|t| t.text()).collect();
            let tags: Vec<&str> = tokens.iter().map(|t| t.pos().unwrap_or("NN")).collect();
            self.parse(&words, &tags)
        };
        document.set_parse(sentence, graph)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arcs(words: &[&str], tags: &[&str]) -> Vec<(Option<usize>, String)> {
        let graph = DependencyParser::new().parse(words, tags);
        graph.validate(words.len()).unwrap();
        graph
            .edges
            .into_iter()
            .map(|d| (d.head, d.relation))
            .collect()
    }

    #[test]
    fn test_subject_verb_object() {
        let parsed = arcs(&["Alice", "met", "Bob", "."], &["NNP", "VBD", "NNP", "."]);
        assert_eq!(
            parsed,
            vec![
                (Some(1), "nsubj".to_string()),
                (None, "root".to_string()),
                (Some(1), "obj".to_string()),
                (Some(1), "punct".to_string()),
            ]
        );
    }

    #[test]
    fn test_noun_phrase_and_auxiliary() {
        let words = ["The", "old", "dog", "has", "eaten", "the", "food"];
        let tags = ["DT", "JJ", "NN", "VBZ", "VBN", "DT", "NN"];
        let parsed = arcs(&words, &tags);
        assert_eq!(parsed[0], (Some(2), "det".to_string()));
        assert_eq!(parsed[1], (Some(2), "amod".to_string()));
        assert_eq!(parsed[2], (Some(4), "nsubj".to_string()));
        assert_eq!(parsed[3], (Some(4), "aux".to_string()));
        assert_eq!(parsed[4], (None, "root".to_string()));
        assert_eq!(parsed[6], (Some(4), "obj".to_string()));
    }

    #[test]
    fn test_prepositions() {
        let words = ["She", "lives", "in", "the", "city", "of", "Paris"];
        let tags = ["PRP", "VBZ", "IN", "DT", "NN", "IN", "NNP"];
        let parsed = arcs(&words, &tags);
        assert_eq!(parsed[2], (Some(4), "case".to_string()));
        assert_eq!(parsed[4], (Some(1), "obl".to_string()));
        assert_eq!(parsed[6], (Some(4), "nmod".to_string()));
    }

    #[test]
    fn test_passive_and_coordination() {
        let words = ["Alice", "and", "Bob", "were", "arrested"];
        let tags = ["NNP", "CC", "NNP", "VBD", "VBN"];
        let parsed = arcs(&words, &tags);
        assert_eq!(parsed[3], (Some(4), "aux:pass".to_string()));
        assert_eq!(parsed[2], (Some(0), "conj".to_string()));
        assert_eq!(parsed[1], (Some(2), "cc".to_string()));
        assert_eq!(parsed[0], (Some(4), "nsubj:pass".to_string()));
    }

    #[test]
    fn test_verbless_fragment_is_still_a_tree() {
        arcs(&["Hello", ",", "world"], &["UH", ",", "NN"]);
        arcs(&[","], &[","]);
        arcs(&["to", "go", "home", "quickly"], &["TO", "VB", "NN", "RB"]);
    }
}
