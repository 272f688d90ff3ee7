use std::collections::BTreeMap;

use crate::schema::Entity;

/// Default neighborhood (in characters) searched around a stated start.
pub const SEARCH_RADIUS: usize = 50;

/// Character-offset view of a text over its byte representation.
pub(crate) struct CharText<'a> {
    text: &'a str,
    bounds: Vec<usize>,
}

impl<'a> CharText<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        bounds.push(text.len());
        Self { text, bounds }
    }

    pub(crate) fn len(&self) -> usize {
        self.bounds.len() - 1
    }

    pub(crate) fn slice(&self, start: usize, end: usize) -> Option<&'a str> {
        if start > end || end > self.len() {
            return None;
        }
        Some(&self.text[self.bounds[start]..self.bounds[end]])
    }

    /// Char offset of a byte offset lying on a char boundary.
    pub(crate) fn char_at(&self, byte: usize) -> usize {
        self.bounds.partition_point(|&b| b < byte)
    }

    /// Start offsets of every (possibly overlapping) occurrence of `needle`
    /// lying entirely inside the char window `[from, to)`.
    pub(crate) fn occurrences(&self, needle: &str, from: usize, to: usize) -> Vec<usize> {
        let to = to.min(self.len());
        if needle.is_empty() || from >= to {
            return Vec::new();
        }
        let base = self.bounds[from];
        let hay = &self.text[base..self.bounds[to]];

        let mut found = Vec::new();
        let mut pos = 0;
        while let Some(i) = hay[pos..].find(needle) {
            let at = pos + i;
            found.push(self.char_at(base + at));
            pos = at + hay[at..].chars().next().map_or(1, char::len_utf8);
        }
        found
    }
}

/// Windows already owned by an entity; claims never overlap.
#[derive(Debug, Default)]
struct Claims {
    spans: BTreeMap<usize, usize>,
}

impl Claims {
    fn is_free(&self, start: usize, end: usize) -> bool {
        match self.spans.range(..end).next_back() {
            Some((_, &claimed_end)) => claimed_end <= start,
            None => true,
        }
    }

    fn claim(&mut self, start: usize, end: usize) {
        self.spans.insert(start, end);
    }
}

#[derive(Debug, Default)]
pub struct RecoveryOutcome {
    /// Entities with verified spans, in input order.
    pub kept: Vec<Entity>,
    pub relocated: usize,
    pub dropped: Vec<Entity>,
}

/// Re-anchors extractor entities on exact windows of the final text.
///
/// An entity keeps its stated span when the text there matches and nobody
/// claimed it yet. Otherwise the nearest unclaimed occurrence of its text is
/// taken, looking first within `radius` characters of the stated start and
/// then across the whole document. Entities whose text cannot be placed are
/// dropped. Synthetic entities are verified the same way but never claim a
/// window, since they deliberately share the span of their reference.
#[derive(Debug, Clone)]
pub struct OffsetRecovery {
    radius: usize,
}

impl Default for OffsetRecovery {
    fn default() -> Self {
        Self::new(SEARCH_RADIUS)
    }
}

impl OffsetRecovery {
    pub fn new(radius: usize) -> Self {
        Self { radius }
    }

    pub fn recover(&self, text: &str, entities: Vec<Entity>) -> RecoveryOutcome {
        let doc = CharText::new(text);
        let mut claims = Claims::default();
        let mut outcome = RecoveryOutcome::default();

        for mut entity in entities {
            let needle = entity.text.trim().to_string();
            if needle.is_empty() {
                outcome.dropped.push(entity);
                continue;
            }
            let width = needle.chars().count();

            let exact = doc.slice(entity.start, entity.end) == Some(needle.as_str());
            let free = |claims: &Claims, start: usize| {
                entity.synthetic || claims.is_free(start, start + width)
            };

            let start = if exact && free(&claims, entity.start) {
                Some(entity.start)
            } else {
                let from = entity.start.saturating_sub(self.radius);
                let to = entity.start.saturating_add(self.radius + width);
                nearest(&doc.occurrences(&needle, from, to), entity.start, |s| free(&claims, s))
                    .or_else(|| {
                        nearest(&doc.occurrences(&needle, 0, doc.len()), entity.start, |s| {
                            free(&claims, s)
                        })
                    })
            };

            let Some(start) = start else {
                tracing::warn!(
                    id = %entity.id,
                    kind = %entity.kind,
                    text = %needle,
                    "entity text not found in document, dropping"
                );
                outcome.dropped.push(entity);
                continue;
            };

            if start != entity.start || start + width != entity.end {
                outcome.relocated += 1;
            }
            entity.start = start;
            entity.end = start + width;
            entity.text = needle;
            if !entity.synthetic {
                claims.claim(entity.start, entity.end);
            }
            outcome.kept.push(entity);
        }

        outcome
    }
}

fn nearest(candidates: &[usize], target: usize, usable: impl Fn(usize) -> bool) -> Option<usize> {
    candidates
        .iter()
        .copied()
        .filter(|&s| usable(s))
        .min_by_key(|&s| (s.abs_diff(target), s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EntityKind;

    fn law(id: &str, text: &str, start: usize, end: usize) -> Entity {
        Entity::new(id, EntityKind::Law, text, start, end)
    }

    #[test]
    fn test_wrong_offsets_are_relocated() {
        let text = "X Y LAW Z";
        let outcome = OffsetRecovery::default().recover(text, vec![law("1", "LAW", 0, 3)]);

        assert_eq!(outcome.kept.len(), 1);
        let entity = &outcome.kept[0];
        assert_eq!((entity.start, entity.end), (4, 7));
        assert_eq!(&text[entity.start..entity.end], "LAW");
        assert_eq!(outcome.relocated, 1);
    }

    #[test]
    fn test_offsets_are_characters() {
        let text = "المادة 7 من القانون رقم 37.22";
        let outcome =
            OffsetRecovery::default().recover(text, vec![law("b", "القانون رقم 37.22", 13, 32)]);

        let entity = &outcome.kept[0];
        assert_eq!((entity.start, entity.end), (12, 29));
        assert_eq!(CharText::new(text).slice(12, 29), Some("القانون رقم 37.22"));
    }

    #[test]
    fn test_claimed_window_is_not_reused() {
        let text = "الفصل 5 ثم الفصل 5";
        let outcome = OffsetRecovery::default().recover(
            text,
            vec![law("a", "الفصل 5", 0, 7), law("b", "الفصل 5", 0, 7)],
        );

        assert_eq!(outcome.kept[0].start, 0);
        assert_eq!(outcome.kept[1].start, 11);
    }

    #[test]
    fn test_nearest_occurrence_wins() {
        let text = "أ ب أ ب أ";
        let outcome = OffsetRecovery::default().recover(text, vec![law("a", "أ", 5, 6)]);
        assert_eq!(outcome.kept[0].start, 4);
    }

    #[test]
    fn test_far_occurrence_found_by_whole_document_search() {
        let text = format!("{}هدف", "ـ".repeat(300));
        let outcome = OffsetRecovery::default().recover(&text, vec![law("a", "هدف", 0, 3)]);
        assert_eq!(outcome.kept[0].start, 300);
    }

    #[test]
    fn test_missing_text_is_dropped() {
        let outcome =
            OffsetRecovery::default().recover("نص قصير", vec![law("a", "غير موجود", 0, 9), law("b", " ", 0, 1)]);
        assert!(outcome.kept.is_empty());
        assert_eq!(outcome.dropped.len(), 2);
    }

    #[test]
    fn test_occurrences_overlap() {
        let doc = CharText::new("aaaa");
        assert_eq!(doc.occurrences("aa", 0, 4), vec![0, 1, 2]);
        assert_eq!(doc.occurrences("aa", 1, 3), vec![1]);
    }
}
