//! Character spans into document text.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Half-open range `[start, end)` of UTF-8 byte offsets into a document's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether `other` lies entirely inside this span.
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Borrow the covered text, if the span is valid for `text`.
    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.get(self.start..self.end)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Converts byte offsets to Unicode scalar offsets for the wire format.
///
/// ASCII text maps byte offsets to themselves, so the table is only built
/// when the text contains multi-byte characters.
#[derive(Debug, Clone)]
pub struct CharOffsets {
    /// `table[byte]` is the char index at that byte boundary.
    table: Option<Vec<usize>>,
}

impl CharOffsets {
    pub fn new(text: &str) -> Self {
        if text.is_ascii() {
            return Self { table: None };
        }

        let mut table = vec![0usize; text.len() + 1];
        let mut chars = 0usize;
        for (byte, ch) in text.char_indices() {
            for slot in table.iter_mut().skip(byte).take(ch.len_utf8()) {
                *slot = chars;
            }
            chars += 1;
        }
        table[text.len()] = chars;
        Self { table: Some(table) }
    }

    pub fn to_chars(&self, span: Span) -> [usize; 2] {
        match &self.table {
            None => [span.start, span.end],
            Some(table) => {
                let last = table.len().saturating_sub(1);
                [table[span.start.min(last)], table[span.end.min(last)]]
            }
        }
    }
}
