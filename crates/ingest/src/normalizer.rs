use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::numerals::translate_digits;

/// Recurring running headers of the official bulletin scans.
pub const DEFAULT_HEADER_LINES: [&str; 4] = [
    "مديرية التشريع والدراسات",
    "مديرية التشريع والدرامات",
    "وزارة العدل",
    "المملكة المغربية",
];

static PAGE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\s*\d+\s*-?$").expect("page number regex"));

// "8 - تم تغيير ..." : footnote bodies glued below the text
static FOOTNOTE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\s*-\s+").expect("footnote marker regex"));

static LATIN_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z]+").expect("latin regex"));

static INLINE_PAGE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\s*\d+\s*\n").expect("inline page regex"));

static PAGE_NUMBER_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^-?\s*\d+\s*-?$").expect("page line regex"));

static PREAMBLE_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bقسم\s+تمهيدي\b").expect("preamble regex"));

/// Strips OCR noise from raw text before chunking.
pub struct TextNormalizer {
    header_lines: HashSet<String>,
    header_phrases: Option<Regex>,
}

impl TextNormalizer {
    pub fn new() -> Self {
        Self::with_header_lines(DEFAULT_HEADER_LINES.iter().map(|s| s.to_string()))
    }

    pub fn with_header_lines(lines: impl IntoIterator<Item = String>) -> Self {
        let header_lines: HashSet<String> = lines
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();

        let mut phrases: Vec<String> = header_lines.iter().map(|l| regex::escape(l)).collect();
        // Longest first so overlapping phrases are removed whole
        phrases.sort_by(|a, b| b.len().cmp(&a.len()));
        let header_phrases = if phrases.is_empty() {
            None
        } else {
            Regex::new(&format!("(?:{})", phrases.join("|"))).ok()
        };

        Self {
            header_lines,
            header_phrases,
        }
    }

    /// Drop header lines, standalone page numbers and footnote-marker lines.
    pub fn normalize(&self, raw: &str) -> String {
        let mut kept = Vec::new();
        let mut dropped = 0usize;

        for line in raw.lines() {
            let trimmed = line.trim();
            let ascii = translate_digits(trimmed);

            if self.header_lines.contains(trimmed)
                || PAGE_NUMBER.is_match(&ascii)
                || FOOTNOTE_MARKER.is_match(&ascii)
            {
                dropped += 1;
                continue;
            }
            kept.push(line);
        }

        tracing::debug!(dropped_lines = dropped, kept_lines = kept.len(), "normalized OCR text");
        kept.join("\n")
    }

    /// Cleanup applied to article body text coming back from the service.
    pub fn clean_body_text(&self, text: &str) -> String {
        let text = LATIN_RUN.replace_all(text, "");
        let text = INLINE_PAGE_NUMBER.replace_all(&text, "\n");
        let text = match &self.header_phrases {
            Some(re) => re.replace_all(&text, "").into_owned(),
            None => text.into_owned(),
        };
        let text = PAGE_NUMBER_LINE.replace_all(&text, "");
        text.trim().to_string()
    }
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether the document opens with a preamble part ("قسم تمهيدي").
pub fn has_preamble_heading(text: &str) -> bool {
    PREAMBLE_HEADING.is_match(text)
}
