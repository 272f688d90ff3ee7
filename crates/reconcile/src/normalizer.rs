use ingest::numerals::{canonical_num, canonical_number, fold_alef, translate_digits};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::dates::normalize_date;
use crate::names::normalize_person;
use crate::schema::EntityKind;

/// Citation keywords (alef-folded spelling, display form), longest first
/// within each family so compound keywords win.
const KEYWORDS: &[(&str, &str)] = &[
    ("المادة", "المادة"),
    ("مادة", "المادة"),
    ("الفصل", "الفصل"),
    ("القانون التنظيمي", "القانون التنظيمي"),
    ("القانون الاطار", "القانون الإطار"),
    ("القانون", "القانون"),
    ("قانون", "القانون"),
    ("الظهير الشريف", "الظهير الشريف"),
    ("ظهير شريف", "الظهير الشريف"),
    ("الظهير", "الظهير"),
    ("المرسوم الملكي", "المرسوم الملكي"),
    ("المرسوم", "المرسوم"),
    ("مرسوم", "المرسوم"),
    ("القرار", "القرار"),
    ("قرار", "القرار"),
    ("الدستور", "الدستور"),
];

fn keyword_alternation() -> String {
    let mut folded: Vec<&str> = KEYWORDS.iter().map(|(k, _)| *k).collect();
    folded.sort_by_key(|k| std::cmp::Reverse(k.chars().count()));
    folded.iter().map(|k| regex::escape(k)).collect::<Vec<_>>().join("|")
}

static CITATION: Lazy<Regex> = Lazy::new(|| {
    let pattern = format!(
        r"({})\s+(?:من\s+)?(?:رقم\s+)?([0-9]+(?:[./][0-9]+)*)",
        keyword_alternation()
    );
    Regex::new(&pattern).expect("citation regex")
});

static KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("({})", keyword_alternation())).expect("keyword regex"));

static NUMBER_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]+(?:[./][0-9]+)*").expect("number token regex"));

static PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[.,!?;:'"،؛؟()\[\]]"#).expect("punctuation regex"));

fn display(folded: &str) -> &'static str {
    KEYWORDS
        .iter()
        .find(|(k, _)| *k == folded)
        .map(|(_, d)| *d)
        .unwrap_or("")
}

fn is_article_keyword(display: &str) -> bool {
    matches!(display, "المادة" | "الفصل")
}

/// Entity kind of the instrument named by a citation keyword.
pub fn keyword_kind(display: &str) -> Option<EntityKind> {
    let kind = match display {
        "القانون" | "القانون التنظيمي" | "القانون الإطار" => EntityKind::Law,
        "الظهير" | "الظهير الشريف" => EntityKind::Dahir,
        "المرسوم" | "المرسوم الملكي" => EntityKind::Decree,
        "القرار" => EntityKind::Decision,
        "الدستور" => EntityKind::Constitution,
        _ => return None,
    };
    Some(kind)
}

/// (keyword, number) pairs of a citation, in order of appearance.
pub fn citation_pairs(text: &str) -> Vec<(&'static str, String)> {
    let folded = fold_alef(&translate_digits(text));
    CITATION
        .captures_iter(&folded)
        .map(|caps| (display(&caps[1]), caps[2].to_string()))
        .collect()
}

/// Article and instrument numbers of a mention such as
/// "المادة 15 من القانون رقم 30.09" -> ("15", "30.09").
pub fn parse_law_article_nums(text: &str) -> Option<(String, String)> {
    let pairs = citation_pairs(text);
    let article = pairs.iter().find(|(k, _)| is_article_keyword(k))?;
    let instrument = pairs.iter().find(|(k, _)| keyword_kind(k).is_some())?;
    Some((article.1.clone(), instrument.1.clone()))
}

/// First instrument cited in `text`, with its kind and number.
pub fn governing_instrument(text: &str) -> Option<(EntityKind, String)> {
    citation_pairs(text)
        .into_iter()
        .find_map(|(keyword, number)| keyword_kind(keyword).map(|kind| (kind, number)))
}

/// "<keyword> <number>" pairs joined by spaces, or the keyword and first
/// number found when the citation does not follow the usual shape.
pub fn normalize_instrument(text: &str) -> Option<String> {
    let pairs = citation_pairs(text);
    if !pairs.is_empty() {
        return Some(
            pairs
                .iter()
                .map(|(keyword, number)| format!("{keyword} {number}"))
                .collect::<Vec<_>>()
                .join(" "),
        );
    }

    let folded = fold_alef(text);
    let keyword = KEYWORD.captures(&folded).map(|caps| display(&caps[1]));
    match (keyword, canonical_num(text)) {
        (Some(keyword), Some(number)) => Some(format!("{keyword} {number}")),
        (Some(keyword), None) => Some(keyword.to_string()),
        (None, number) => number,
    }
}

/// Canonical number of an article/chapter/section citation; several numbers
/// in one mention are kept as an underscore-joined composite ("5_9").
pub fn structural_number(text: &str) -> Option<String> {
    if let Some((article, _)) = parse_law_article_nums(text) {
        return Some(article);
    }

    let translated = translate_digits(text);
    let numbers: Vec<String> = NUMBER_TOKEN
        .find_iter(&translated)
        .map(|m| {
            let token = m.as_str();
            if token.chars().all(|c| c.is_ascii_digit()) {
                canonical_number(token).unwrap_or_else(|| token.to_string())
            } else {
                token.to_string()
            }
        })
        .collect();

    if numbers.is_empty() {
        canonical_number(text)
    } else {
        Some(numbers.join("_"))
    }
}

/// Whitespace-collapsed label without diacritics or tatweel.
fn clean_label(text: &str) -> Option<String> {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '\u{064B}'..='\u{0652}' | '\u{0640}'))
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

/// Per-document value canonicalization.
///
/// Holds the person alias table so that variant spellings of a name met
/// later in the same document resolve to the first spelling seen.
#[derive(Debug, Default)]
pub struct EntityNormalizer {
    /// Alias key -> canonical name
    aliases: HashMap<String, String>,
    /// Alias keys in the order they were first seen
    seen: Vec<String>,
}

impl EntityNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical value of a mention, or `None` when nothing can be derived.
    pub fn normalize(&mut self, kind: &EntityKind, text: &str) -> Option<String> {
        match kind {
            EntityKind::Date => normalize_date(text),
            kind if kind.is_instrument() => normalize_instrument(text),
            kind if kind.is_structural() => structural_number(text),
            EntityKind::InternalRef => structural_number(text),
            EntityKind::Person => normalize_person(text).map(|name| self.resolve_alias(&name)),
            _ => clean_label(text),
        }
    }

    /// Map a name onto a previously seen variant when the two are similar.
    pub fn resolve_alias(&mut self, name: &str) -> String {
        let key = alias_key(name);

        if let Some(canonical) = self.aliases.get(&key) {
            return canonical.clone();
        }

        let found = self
            .seen
            .iter()
            .find(|existing| are_similar(&key, existing))
            .and_then(|existing| self.aliases.get(existing))
            .cloned();

        let canonical = found.unwrap_or_else(|| name.to_string());
        self.aliases.insert(key.clone(), canonical.clone());
        self.seen.push(key);
        canonical
    }

    pub fn aliases(&self) -> &HashMap<String, String> {
        &self.aliases
    }
}

fn alias_key(name: &str) -> String {
    let lowered = name.to_lowercase();
    let stripped = PUNCTUATION.replace_all(lowered.trim(), "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Same key, one multi-word name contained in the other, or more than 70% of
/// the words shared.
fn are_similar(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }

    let words_a: Vec<&str> = a.split_whitespace().collect();
    let words_b: Vec<&str> = b.split_whitespace().collect();

    // A single first name says too little to merge on
    let (shorter, longer) = if words_a.len() <= words_b.len() {
        (&words_a, &words_b)
    } else {
        (&words_b, &words_a)
    };
    if shorter.len() > 1 && longer.windows(shorter.len()).any(|w| w == shorter.as_slice()) {
        return true;
    }

    if words_a.len() > 1 && words_b.len() > 1 {
        let common = words_a.iter().filter(|w| words_b.contains(w)).count();
        let total = words_a.len().max(words_b.len());
        return common as f64 / total as f64 > 0.7;
    }

    false
}
