use ingest::numerals::translate_digits;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::offsets::CharText;
use crate::schema::{Entity, EntityKind, NerResult, Relation, RelationKind};

/// Widest "from N to M" range expanded into individual articles.
pub const MAX_RANGE: u64 = 100;

static RANGE_AR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:(?:المواد|الفصول|المادة|الفصل)\s+)?من\s+([0-9]+)\s+(?:إلى|الى|حتى)\s+([0-9]+)",
    )
    .expect("arabic range regex")
});

static RANGE_EN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:articles?|sections?)\s+(?:from\s+)?([0-9]+)\s*(?:to|through|-)\s*([0-9]+)")
        .expect("english range regex")
});

static LIST_AR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:المواد|الفصول|المادتين|المادتان|الفصلين|الفصلان)\s+([0-9]+(?:(?:\s*[،,]\s*(?:و\s*)?|\s+و\s*)[0-9]+)+)",
    )
    .expect("arabic list regex")
});

static LIST_EN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:articles|sections)\s+([0-9]+(?:(?:\s*,\s*(?:and\s+)?|\s+and\s+)[0-9]+)+)")
        .expect("english list regex")
});

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").expect("number regex"));

/// Words that make "من 3 إلى 5" a quantity rather than a reference.
const UNIT_WORDS: &[&str] = &[
    "درهم", "دراهم", "درهما", "سنة", "سنوات", "سنين", "شهر", "أشهر", "اشهر", "شهور", "يوم",
    "أيام", "ايام", "يوما", "ساعة", "ساعات", "دقيقة", "دقائق", "بالمائة", "%", "ألف", "الف",
    "مليون", "مليار", "متر", "كيلومتر", "years", "months", "days", "hours", "dirhams", "percent",
];

/// One detected multi-article mention.
#[derive(Debug, Clone)]
struct Reference {
    start: usize,
    end: usize,
    /// Referenced numbers with the char span of their digits when they are
    /// written out (interior numbers of a range are not).
    numbers: Vec<(u64, Option<(usize, usize)>)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExpansionReport {
    pub references: usize,
    pub articles: usize,
    pub relations: usize,
    pub removed: usize,
}

/// Expands range and list idioms ("من 7 إلى 9", "المواد 3 و 4 و 7") into one
/// synthetic internal reference, one article per number and a `refers_to`
/// relation for each pair.
#[derive(Debug, Clone)]
pub struct ReferenceExpander {
    max_range: u64,
}

impl Default for ReferenceExpander {
    fn default() -> Self {
        Self {
            max_range: MAX_RANGE,
        }
    }
}

impl ReferenceExpander {
    pub fn new(max_range: u64) -> Self {
        Self { max_range }
    }

    pub fn expand(&self, text: &str, result: &mut NerResult) -> ExpansionReport {
        let mut report = ExpansionReport::default();
        let original = CharText::new(text);
        let references = self.detect(text);

        let mut entity_ids: HashSet<String> = result.entities.iter().map(|e| e.id.clone()).collect();
        let mut relation_ids: HashSet<String> =
            result.relations.iter().map(|r| r.id.clone()).collect();
        let spans: Vec<(usize, usize)> = references.iter().map(|r| (r.start, r.end)).collect();
        let mut added = HashSet::new();

        for reference in references {
            let (start, end) = (reference.start, reference.end);
            let expanded = result.entities.iter().any(|e| {
                e.synthetic && e.kind == EntityKind::InternalRef && e.span() == (start, end)
            });
            if expanded {
                continue;
            }
            let Some(matched) = original.slice(start, end) else {
                continue;
            };

            let numbers: Vec<String> = reference.numbers.iter().map(|(n, _)| n.to_string()).collect();
            let ref_id = fresh_id(&mut entity_ids, "ref");
            let mut ref_entity = Entity::new(&ref_id, EntityKind::InternalRef, matched, start, end);
            ref_entity.normalized = Some(numbers.join("_"));
            ref_entity.synthetic = true;
            result.entities.push(ref_entity);
            report.references += 1;

            for ((_, digits), number) in reference.numbers.iter().zip(numbers) {
                let existing = result.entities.iter().find(|e| {
                    e.kind == EntityKind::Article
                        && e.normalized.as_deref() == Some(number.as_str())
                        && !e.within(start, end)
                        && !is_covered(e, &spans)
                });

                let target = match existing {
                    Some(article) => article.id.clone(),
                    None => {
                        let (a_start, a_end) = digits.unwrap_or((start, end));
                        let a_text = original.slice(a_start, a_end).unwrap_or(matched);
                        let id = fresh_id(&mut entity_ids, "art");
                        let mut article = Entity::new(&id, EntityKind::Article, a_text, a_start, a_end);
                        article.normalized = Some(number);
                        article.synthetic = true;
                        result.entities.push(article);
                        report.articles += 1;
                        id
                    }
                };

                let id = fresh_id(&mut relation_ids, "rel");
                added.insert(id.clone());
                result
                    .relations
                    .push(Relation::new(id, RelationKind::RefersTo, &ref_id, target));
            }
        }

        report.removed = remove_covered(result, &spans);
        report.relations = result.relations.iter().filter(|r| added.contains(&r.id)).count();
        if report.references > 0 {
            tracing::debug!(
                references = report.references,
                articles = report.articles,
                removed = report.removed,
                "expanded multi-article references"
            );
        }
        report
    }

    /// Range mentions first, then list mentions not overlapping a range.
    fn detect(&self, text: &str) -> Vec<Reference> {
        let translated = translate_digits(text);
        let doc = CharText::new(&translated);
        let mut found: Vec<Reference> = Vec::new();

        for regex in [&*RANGE_AR, &*RANGE_EN] {
            for caps in regex.captures_iter(&translated) {
                let (Some(whole), Some(first), Some(last)) = (caps.get(0), caps.get(1), caps.get(2))
                else {
                    continue;
                };
                if followed_by_unit(&translated[whole.end()..]) {
                    continue;
                }
                let (Ok(low), Ok(high)) = (first.as_str().parse::<u64>(), last.as_str().parse::<u64>())
                else {
                    continue;
                };
                if low > high || high - low > self.max_range {
                    continue;
                }

                let first_span = (doc.char_at(first.start()), doc.char_at(first.end()));
                let last_span = (doc.char_at(last.start()), doc.char_at(last.end()));
                let numbers = (low..=high)
                    .map(|n| {
                        let span = if n == low {
                            Some(first_span)
                        } else if n == high {
                            Some(last_span)
                        } else {
                            None
                        };
                        (n, span)
                    })
                    .collect();
                push_disjoint(
                    &mut found,
                    Reference {
                        start: doc.char_at(whole.start()),
                        end: doc.char_at(whole.end()),
                        numbers,
                    },
                );
            }
        }

        for regex in [&*LIST_AR, &*LIST_EN] {
            for caps in regex.captures_iter(&translated) {
                let (Some(whole), Some(list)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                if followed_by_unit(&translated[whole.end()..]) {
                    continue;
                }

                let mut seen = HashSet::new();
                let numbers: Vec<(u64, Option<(usize, usize)>)> = NUMBER
                    .find_iter(list.as_str())
                    .filter_map(|m| {
                        let n = m.as_str().parse::<u64>().ok()?;
                        let span = (
                            doc.char_at(list.start() + m.start()),
                            doc.char_at(list.start() + m.end()),
                        );
                        seen.insert(n).then_some((n, Some(span)))
                    })
                    .collect();
                push_disjoint(
                    &mut found,
                    Reference {
                        start: doc.char_at(whole.start()),
                        end: doc.char_at(whole.end()),
                        numbers,
                    },
                );
            }
        }

        found.sort_by_key(|r| r.start);
        found
    }
}

fn push_disjoint(found: &mut Vec<Reference>, reference: Reference) {
    if !found
        .iter()
        .any(|r| r.start < reference.end && reference.start < r.end)
    {
        found.push(reference);
    }
}

fn followed_by_unit(rest: &str) -> bool {
    if rest.starts_with('%') {
        return true;
    }
    rest.split_whitespace()
        .next()
        .map(|word| word.trim_matches(|c: char| c.is_ascii_punctuation() || c == '،'))
        .is_some_and(|word| UNIT_WORDS.iter().any(|unit| word.eq_ignore_ascii_case(unit)))
}

fn fresh_id(used: &mut HashSet<String>, prefix: &str) -> String {
    let mut n = used.len() + 1;
    loop {
        let id = format!("{prefix}_{n}");
        if used.insert(id.clone()) {
            return id;
        }
        n += 1;
    }
}

/// An extractor mention that a synthetic reference in `spans` replaces.
fn is_covered(e: &Entity, spans: &[(usize, usize)]) -> bool {
    if e.synthetic {
        return false;
    }
    spans.iter().any(|&(start, end)| match e.kind {
        EntityKind::InternalRef => e.within(start, end),
        EntityKind::Article => {
            e.within(start, end)
                || (e.overlaps(start, end) && e.normalized.as_deref().is_some_and(|n| n.contains('_')))
        }
        _ => false,
    })
}

/// Drop extractor mentions already represented by a synthetic reference:
/// articles or references inside its span, and multi-number articles
/// overlapping it. Relations left dangling go with them.
fn remove_covered(result: &mut NerResult, spans: &[(usize, usize)]) -> usize {
    if spans.is_empty() {
        return 0;
    }

    let before = result.entities.len();
    result.entities.retain(|e| !is_covered(e, spans));
    let removed = before - result.entities.len();

    if removed > 0 {
        let ids: HashSet<&str> = result.entities.iter().map(|e| e.id.as_str()).collect();
        result
            .relations
            .retain(|r| ids.contains(r.source.as_str()) && ids.contains(r.target.as_str()));
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn articles(result: &NerResult) -> Vec<&str> {
        result
            .entities
            .iter()
            .filter(|e| e.kind == EntityKind::Article)
            .filter_map(|e| e.normalized.as_deref())
            .collect()
    }

    #[test]
    fn test_range_expansion() {
        let mut result = NerResult::default();
        let report = ReferenceExpander::default().expand("من 7 إلى 9", &mut result);

        assert_eq!(report.references, 1);
        let refs: Vec<&Entity> = result
            .entities
            .iter()
            .filter(|e| e.kind == EntityKind::InternalRef)
            .collect();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].text, "من 7 إلى 9");
        assert_eq!(articles(&result), ["7", "8", "9"]);
        assert_eq!(result.relations.len(), 3);
        assert!(result
            .relations
            .iter()
            .all(|r| r.kind == RelationKind::RefersTo && r.source == refs[0].id));
    }

    #[test]
    fn test_written_numbers_are_anchored_on_digits() {
        let text = "تطبق المواد من 7 إلى 9";
        let mut result = NerResult::default();
        ReferenceExpander::default().expand(text, &mut result);

        let doc = CharText::new(text);
        for entity in &result.entities {
            assert_eq!(doc.slice(entity.start, entity.end), Some(entity.text.as_str()));
        }
        let seven = result
            .entities
            .iter()
            .find(|e| e.normalized.as_deref() == Some("7"))
            .unwrap();
        assert_eq!(seven.text, "7");
    }

    #[test]
    fn test_list_expansion_reuses_existing_article() {
        let text = "المادة 4 ثم المواد 3 و 4 و 7";
        let mut existing = Entity::new("a", EntityKind::Article, "المادة 4", 0, 8);
        existing.normalized = Some("4".into());
        let mut result = NerResult {
            entities: vec![existing],
            relations: Vec::new(),
        };

        let report = ReferenceExpander::default().expand(text, &mut result);
        assert_eq!(report.articles, 2);
        assert_eq!(result.relations.len(), 3);
        assert!(result.relations.iter().any(|r| r.target == "a"));
    }

    #[test]
    fn test_shared_number_keeps_every_relation() {
        let text = "المواد من 3 إلى 5 ثم المادتين 4 و 6";
        let mut later = Entity::new("a", EntityKind::Article, "4", 30, 31);
        later.normalized = Some("4".into());
        let mut result = NerResult {
            entities: vec![later],
            relations: Vec::new(),
        };

        let report = ReferenceExpander::default().expand(text, &mut result);
        assert_eq!(report.references, 2);
        assert_eq!(report.removed, 1);
        assert!(result.entity("a").is_none());
        assert_eq!(report.relations, result.relations.len());
        assert_eq!(result.relations.len(), 5);

        for reference in result.entities.iter().filter(|e| e.kind == EntityKind::InternalRef) {
            let targets: Vec<&str> = result
                .relations
                .iter()
                .filter(|r| r.source == reference.id)
                .filter_map(|r| result.entity(&r.target))
                .filter_map(|e| e.normalized.as_deref())
                .collect();
            let expected: Vec<&str> = reference.normalized.as_deref().unwrap_or_default().split('_').collect();
            assert_eq!(targets, expected);
        }
    }

    #[test]
    fn test_quantities_are_not_references() {
        let mut result = NerResult::default();
        ReferenceExpander::default().expand("بالحبس من 1 إلى 5 سنوات وغرامة من 200 إلى 500 درهم", &mut result);
        assert!(result.is_empty());
    }

    #[test]
    fn test_wide_ranges_are_skipped() {
        let mut result = NerResult::default();
        ReferenceExpander::default().expand("المواد من 1 إلى 500", &mut result);
        assert!(result.is_empty());
    }

    #[test]
    fn test_covered_mentions_are_removed() {
        let text = "المواد 5 و 9";
        let mut plain = Entity::new("p", EntityKind::Article, "المواد 5 و 9", 0, 12);
        plain.normalized = Some("5_9".into());
        let date = Entity::new("d", EntityKind::Date, "2011", 0, 4);
        let mut result = NerResult {
            entities: vec![plain, date],
            relations: vec![Relation::new("r", RelationKind::RefersTo, "p", "d")],
        };

        let report = ReferenceExpander::default().expand(text, &mut result);
        assert_eq!(report.removed, 1);
        assert!(result.entity("p").is_none());
        assert!(result.relations.iter().all(|r| r.id != "r"));
        assert_eq!(articles(&result), ["5", "9"]);
    }

    #[test]
    fn test_expansion_runs_once() {
        let text = "المواد من 2 إلى 4";
        let mut result = NerResult::default();
        let expander = ReferenceExpander::default();
        expander.expand(text, &mut result);
        let count = result.entities.len();

        let again = expander.expand(text, &mut result);
        assert_eq!(again.references, 0);
        assert_eq!(result.entities.len(), count);
    }

    #[test]
    fn test_english_idioms() {
        let mut result = NerResult::default();
        ReferenceExpander::default().expand("see articles 3, 5 and 8", &mut result);
        assert_eq!(articles(&result), ["3", "5", "8"]);
    }
}
