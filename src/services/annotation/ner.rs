//! Named entity recognition over tokenized, tagged sentences.
//!
//! Provides a `NerBackend` trait for pluggable labelling backends and the
//! built-in `PatternNerBackend`, which combines gazetteer lookups, name and
//! title heuristics, and numeric patterns.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::lexicon::{LanguageModels, GIVEN_NAMES, MONTHS, ORG_SUFFIXES, TITLES, WEEKDAYS};

/// Classification of recognised entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Date,
    Number,
    Money,
    Percent,
    Email,
    Url,
    Misc,
}

impl EntityType {
    /// Label written into the token's `ner` field.
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Person => "PERSON",
            Self::Organization => "ORGANIZATION",
            Self::Location => "LOCATION",
            Self::Date => "DATE",
            Self::Number => "NUMBER",
            Self::Money => "MONEY",
            Self::Percent => "PERCENT",
            Self::Email => "EMAIL",
            Self::Url => "URL",
            Self::Misc => "MISC",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Some(match label.to_ascii_uppercase().as_str() {
            "PERSON" => Self::Person,
            "ORGANIZATION" | "ORG" => Self::Organization,
            "LOCATION" | "LOC" => Self::Location,
            "DATE" => Self::Date,
            "NUMBER" => Self::Number,
            "MONEY" => Self::Money,
            "PERCENT" => Self::Percent,
            "EMAIL" => Self::Email,
            "URL" => Self::Url,
            "MISC" => Self::Misc,
            _ => return None,
        })
    }
}

/// Label for tokens outside any entity.
pub const OUTSIDE: &str = "O";

/// A token as seen by a NER backend.
#[derive(Debug, Clone, Copy)]
pub struct NerToken<'a> {
    pub text: &'a str,
    pub pos: Option<&'a str>,
}

/// Trait for pluggable NER backends.
///
/// Backends return one label per input token, `None` meaning outside any
/// entity. Statistical backends can implement this and be swapped in via
/// `NerAnnotator::with_backend`.
pub trait NerBackend: Send + Sync {
    /// Human-readable backend identifier (e.g. "pattern").
    fn backend_id(&self) -> &str;

    fn label(&self, tokens: &[NerToken<'_>]) -> Vec<Option<EntityType>>;
}

// ============================================================================
// PatternNerBackend
// ============================================================================

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("valid regex")
});
static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:https?://|www\.)\S+$").expect("valid regex"));
static NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d[\d,]*(?:\.\d+)?$").expect("valid regex"));
static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));
static PERCENT_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(?:\.\d+)?%$").expect("valid regex"));

const CURRENCY_SYMBOLS: &[&str] = &["$", "€", "£"];
const CURRENCY_WORDS: &[&str] = &["dollars", "dollar", "euros", "euro", "pounds", "cents", "usd"];
const MAGNITUDES: &[&str] = &["thousand", "million", "billion", "trillion"];
const RELATIVE_DAYS: &[&str] = &["today", "yesterday", "tomorrow"];
/// Lowercase words allowed inside an organisation name.
const ORG_CONNECTORS: &[&str] = &["of", "for", "and", "&", "the"];

/// Rule-based NER backend using gazetteers and token patterns.
pub struct PatternNerBackend {
    models: Arc<LanguageModels>,
}

impl PatternNerBackend {
    pub fn new(models: Arc<LanguageModels>) -> Self {
        Self { models }
    }
}

impl NerBackend for PatternNerBackend {
    fn backend_id(&self) -> &str {
        "pattern"
    }

    fn label(&self, tokens: &[NerToken<'_>]) -> Vec<Option<EntityType>> {
        let mut labels = vec![None; tokens.len()];

        label_contacts(tokens, &mut labels);
        label_money_and_percent(tokens, &mut labels);
        self.label_gazetteer(tokens, &mut labels);
        label_titled_persons(tokens, &mut labels);
        label_given_names(tokens, &mut labels);
        label_organizations(tokens, &mut labels);
        label_dates(tokens, &mut labels);
        label_numbers(tokens, &mut labels);

        labels
    }
}

fn is_capitalized(text: &str) -> bool {
    text.chars().next().is_some_and(char::is_uppercase)
}

fn is_proper(token: &NerToken<'_>) -> bool {
    match token.pos {
        Some(pos) => pos.starts_with("NNP"),
        None => is_capitalized(token.text),
    }
}

fn is_number(token: &NerToken<'_>) -> bool {
    token.pos == Some("CD") || NUMERIC.is_match(token.text)
}

fn lower(token: &NerToken<'_>) -> String {
    token.text.to_lowercase()
}

fn label_contacts(tokens: &[NerToken<'_>], labels: &mut [Option<EntityType>]) {
    for (i, token) in tokens.iter().enumerate() {
        if EMAIL.is_match(token.text) {
            labels[i] = Some(EntityType::Email);
        } else if URL.is_match(token.text) {
            labels[i] = Some(EntityType::Url);
        }
    }
}

fn label_money_and_percent(tokens: &[NerToken<'_>], labels: &mut [Option<EntityType>]) {
    let n = tokens.len();
    let mut i = 0;
    while i < n {
        let token = &tokens[i];
        if PERCENT_TOKEN.is_match(token.text) {
            labels[i] = Some(EntityType::Percent);
        } else if CURRENCY_SYMBOLS.contains(&token.text) && i + 1 < n && is_number(&tokens[i + 1])
        {
            let mut end = i + 1;
            if end + 1 < n && MAGNITUDES.contains(&lower(&tokens[end + 1]).as_str()) {
                end += 1;
            }
            labels[i..=end].fill(Some(EntityType::Money));
            i = end;
        } else if is_number(token) && i + 1 < n {
            let next = lower(&tokens[i + 1]);
            if CURRENCY_WORDS.contains(&next.as_str()) {
                labels[i..=i + 1].fill(Some(EntityType::Money));
                i += 1;
            } else if next == "%" || next == "percent" {
                labels[i..=i + 1].fill(Some(EntityType::Percent));
                i += 1;
            }
        }
        i += 1;
    }
}

impl PatternNerBackend {
    /// Longest-match gazetteer lookup, anchored on capitalised tokens.
    fn label_gazetteer(&self, tokens: &[NerToken<'_>], labels: &mut [Option<EntityType>]) {
        let max = self.models.max_phrase_tokens();
        let mut i = 0;
        while i < tokens.len() {
            if labels[i].is_some() || !is_capitalized(tokens[i].text) {
                i += 1;
                continue;
            }
            let longest = max.min(tokens.len() - i);
            let hit = (1..=longest).rev().find_map(|len| {
                let window = &tokens[i..i + len];
                if labels[i..i + len].iter().any(Option::is_some) {
                    return None;
                }
                self.models
                    .lookup(window.iter().map(|t| t.text))
                    .map(|entity| (len, entity))
            });
            match hit {
                Some((len, entity)) => {
                    labels[i..i + len].fill(Some(entity));
                    i += len;
                }
                None => i += 1,
            }
        }
    }
}

/// "Dr. Jane Smith", "President Lincoln": the proper nouns after a title.
fn label_titled_persons(tokens: &[NerToken<'_>], labels: &mut [Option<EntityType>]) {
    for i in 0..tokens.len() {
        let title = lower(&tokens[i]);
        if !is_capitalized(tokens[i].text) || !TITLES.contains(title.trim_end_matches('.')) {
            continue;
        }
        let mut j = i + 1;
        while j < tokens.len() && labels[j].is_none() && is_proper(&tokens[j]) {
            labels[j] = Some(EntityType::Person);
            j += 1;
        }
    }
}

/// Known given names, extended over a following surname.
fn label_given_names(tokens: &[NerToken<'_>], labels: &mut [Option<EntityType>]) {
    let mut i = 0;
    while i < tokens.len() {
        if labels[i].is_none() && GIVEN_NAMES.contains(tokens[i].text) && is_proper(&tokens[i]) {
            labels[i] = Some(EntityType::Person);
            let mut j = i + 1;
            while j < tokens.len()
                && labels[j].is_none()
                && is_proper(&tokens[j])
                && !ORG_SUFFIXES.contains(tokens[j].text)
            {
                labels[j] = Some(EntityType::Person);
                j += 1;
            }
            i = j;
        } else {
            i += 1;
        }
    }
}

/// Proper-noun runs ending in an organisation suffix ("Acme Corp"), plus a
/// trailing "of X" complement ("University of Oxford").
fn label_organizations(tokens: &[NerToken<'_>], labels: &mut [Option<EntityType>]) {
    let overridable = |label: Option<EntityType>| {
        matches!(
            label,
            None | Some(EntityType::Location) | Some(EntityType::Person)
        )
    };

    for i in 0..tokens.len() {
        if !ORG_SUFFIXES.contains(tokens[i].text) || !is_capitalized(tokens[i].text) {
            continue;
        }
        if !overridable(labels[i]) {
            continue;
        }

        let mut start = i;
        while start > 0 && is_proper(&tokens[start - 1]) && overridable(labels[start - 1]) {
            start -= 1;
        }

        let mut end = i;
        if i + 2 < tokens.len()
            && ORG_CONNECTORS.contains(&lower(&tokens[i + 1]).as_str())
            && is_proper(&tokens[i + 2])
        {
            end = i + 2;
            while end + 1 < tokens.len()
                && is_proper(&tokens[end + 1])
                && overridable(labels[end + 1])
            {
                end += 1;
            }
        }

        // A lone suffix word ("the Company") is not a name.
        if start == end {
            continue;
        }
        labels[start..=end].fill(Some(EntityType::Organization));
    }
}

fn label_dates(tokens: &[NerToken<'_>], labels: &mut [Option<EntityType>]) {
    let n = tokens.len();
    let is_day = |t: &NerToken<'_>| {
        t.text
            .parse::<u32>()
            .is_ok_and(|d| (1..=31).contains(&d))
    };
    let is_year = |t: &NerToken<'_>| {
        t.text.len() == 4
            && t.text
                .parse::<u32>()
                .is_ok_and(|y| (1000..=2099).contains(&y))
    };

    for i in 0..n {
        if labels[i].is_some() {
            continue;
        }
        let token = &tokens[i];

        if ISO_DATE.is_match(token.text)
            || WEEKDAYS.contains(token.text)
            || RELATIVE_DAYS.contains(&lower(token).as_str())
        {
            labels[i] = Some(EntityType::Date);
            continue;
        }

        if MONTHS.contains(token.text) {
            // "May" on its own is usually the verb.
            let has_number = (i + 1 < n && is_number(&tokens[i + 1]))
                || (i > 0 && is_day(&tokens[i - 1]));
            if token.text == "May" && !has_number {
                continue;
            }
            labels[i] = Some(EntityType::Date);

            if i > 0 && labels[i - 1].is_none() && is_day(&tokens[i - 1]) {
                labels[i - 1] = Some(EntityType::Date);
            }
            let mut j = i + 1;
            if j < n && labels[j].is_none() && (is_day(&tokens[j]) || is_year(&tokens[j])) {
                labels[j] = Some(EntityType::Date);
                j += 1;
            }
            if j + 1 < n && tokens[j].text == "," && is_year(&tokens[j + 1]) {
                labels[j] = Some(EntityType::Date);
                labels[j + 1] = Some(EntityType::Date);
            } else if j < n && labels[j].is_none() && is_year(&tokens[j]) {
                labels[j] = Some(EntityType::Date);
            }
            continue;
        }

        if is_year(token) {
            labels[i] = Some(EntityType::Date);
        }
    }
}

fn label_numbers(tokens: &[NerToken<'_>], labels: &mut [Option<EntityType>]) {
    for (i, token) in tokens.iter().enumerate() {
        if labels[i].is_none() && is_number(token) {
            labels[i] = Some(EntityType::Number);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(words: &[(&str, &str)]) -> Vec<&'static str> {
        let backend = PatternNerBackend::new(Arc::new(LanguageModels::builtin()));
        let tokens: Vec<NerToken<'_>> = words
            .iter()
            .map(|&(text, pos)| NerToken {
                text,
                pos: Some(pos),
            })
            .collect();
        backend
            .label(&tokens)
            .into_iter()
            .map(|l| l.map_or(OUTSIDE, |e| e.as_label()))
            .collect()
    }

    #[test]
    fn test_given_names() {
        assert_eq!(
            label(&[("Alice", "NNP"), ("met", "VBD"), ("Bob", "NNP"), (".", ".")]),
            vec!["PERSON", "O", "PERSON", "O"]
        );
    }

    #[test]
    fn test_full_name_and_title() {
        assert_eq!(
            label(&[("Dr.", "NNP"), ("Jane", "NNP"), ("Okafor", "NNP"), ("spoke", "VBD")]),
            vec!["O", "PERSON", "PERSON", "O"]
        );
        assert_eq!(
            label(&[("Mary", "NNP"), ("Johnson", "NNP"), ("left", "VBD")]),
            vec!["PERSON", "PERSON", "O"]
        );
    }

    #[test]
    fn test_gazetteer_locations_and_organizations() {
        assert_eq!(
            label(&[("She", "PRP"), ("moved", "VBD"), ("to", "TO"), ("New", "NNP"), ("York", "NNP")]),
            vec!["O", "O", "O", "LOCATION", "LOCATION"]
        );
        assert_eq!(
            label(&[("The", "DT"), ("FBI", "NNP"), ("agreed", "VBD")]),
            vec!["O", "ORGANIZATION", "O"]
        );
    }

    #[test]
    fn test_organization_suffix() {
        assert_eq!(
            label(&[("Acme", "NNP"), ("Widgets", "NNP"), ("Inc.", "NNP"), ("grew", "VBD")]),
            vec!["ORGANIZATION", "ORGANIZATION", "ORGANIZATION", "O"]
        );
        assert_eq!(
            label(&[("University", "NNP"), ("of", "IN"), ("Oxford", "NNP")]),
            vec!["ORGANIZATION", "ORGANIZATION", "ORGANIZATION"]
        );
    }

    #[test]
    fn test_dates() {
        assert_eq!(
            label(&[("On", "IN"), ("January", "NNP"), ("5", "CD"), (",", ","), ("2024", "CD")]),
            vec!["O", "DATE", "DATE", "DATE", "DATE"]
        );
        assert_eq!(label(&[("in", "IN"), ("1999", "CD")]), vec!["O", "DATE"]);
        assert_eq!(
            label(&[("You", "PRP"), ("May", "MD"), ("go", "VB")]),
            vec!["O", "O", "O"]
        );
    }

    #[test]
    fn test_money_percent_and_numbers() {
        assert_eq!(
            label(&[("$", "$"), ("5", "CD"), ("million", "CD"), ("and", "CC"), ("15", "CD"), ("%", "NN")]),
            vec!["MONEY", "MONEY", "MONEY", "O", "PERCENT", "PERCENT"]
        );
        assert_eq!(
            label(&[("about", "IN"), ("42", "CD"), ("people", "NNS")]),
            vec!["O", "NUMBER", "O"]
        );
    }

    #[test]
    fn test_contacts() {
        assert_eq!(
            label(&[("bob@example.com", "NN"), ("https://example.com", "NN")]),
            vec!["EMAIL", "URL"]
        );
    }

    #[test]
    fn test_entity_labels_round_trip() {
        for entity in [EntityType::Person, EntityType::Organization, EntityType::Money] {
            assert_eq!(EntityType::from_label(entity.as_label()), Some(entity));
        }
        assert_eq!(EntityType::from_label("org"), Some(EntityType::Organization));
        assert_eq!(EntityType::from_label("PLANET"), None);
    }
}
