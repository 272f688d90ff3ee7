//! Entity reconciliation: offset recovery, value canonicalization,
//! multi-reference expansion, global ids and id stabilization.

pub mod dates;
pub mod edit;
pub mod expand;
pub mod ids;
pub mod linearize;
pub mod names;
pub mod normalizer;
pub mod offsets;
pub mod schema;

pub use edit::{EditError, EditOp};
pub use expand::{ExpansionReport, ReferenceExpander};
pub use ids::{StabilizeReport, assign_global_ids, stabilize_ids};
pub use linearize::json_to_text;
pub use normalizer::{EntityNormalizer, parse_law_article_nums};
pub use offsets::OffsetRecovery;
pub use schema::{Entity, EntityKind, NerResult, Relation, RelationKind};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileOptions {
    /// Characters searched on each side of a stated start before falling
    /// back to the whole document.
    pub search_radius: usize,
    pub expand_references: bool,
    pub max_range: u64,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            search_radius: offsets::SEARCH_RADIUS,
            expand_references: true,
            max_range: expand::MAX_RANGE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub received: usize,
    pub kept: usize,
    pub relocated: usize,
    pub dropped: usize,
    pub synthesized: usize,
    pub removed_overlaps: usize,
    pub relations_dropped: usize,
    pub id_collisions: usize,
}

/// Turns raw extractor output into a consistent entity graph over the final
/// text of a document.
#[derive(Debug, Clone)]
pub struct EntityReconciler {
    recovery: OffsetRecovery,
    expander: Option<ReferenceExpander>,
}

impl Default for EntityReconciler {
    fn default() -> Self {
        Self::new(&ReconcileOptions::default())
    }
}

impl EntityReconciler {
    pub fn new(options: &ReconcileOptions) -> Self {
        Self {
            recovery: OffsetRecovery::new(options.search_radius),
            expander: options
                .expand_references
                .then(|| ReferenceExpander::new(options.max_range)),
        }
    }

    pub fn reconcile(&self, text: &str, raw: NerResult) -> (NerResult, ReconcileReport) {
        let mut report = ReconcileReport {
            received: raw.entities.len(),
            ..Default::default()
        };

        let recovered = self.recovery.recover(text, raw.entities);
        report.relocated = recovered.relocated;
        report.dropped = recovered.dropped.len();

        let mut result = NerResult {
            entities: recovered.kept,
            relations: raw.relations,
        };

        let mut normalizer = EntityNormalizer::new();
        for entity in result.entities.iter_mut() {
            if let Some(value) = normalizer.normalize(&entity.kind, &entity.text) {
                entity.normalized = Some(value);
            }
        }

        if let Some(expander) = &self.expander {
            let expansion = expander.expand(text, &mut result);
            report.synthesized = expansion.references + expansion.articles;
            report.removed_overlaps = expansion.removed;
        }

        self.finish(&mut result, &mut report);
        tracing::info!(
            received = report.received,
            kept = report.kept,
            relocated = report.relocated,
            dropped = report.dropped,
            synthesized = report.synthesized,
            "reconciled entities"
        );
        (result, report)
    }

    /// Apply an editor correction, then re-run offset recovery, fill in
    /// missing values and renumber. Values set by the editor are kept.
    pub fn apply_edit(
        &self,
        text: &mut String,
        mut result: NerResult,
        op: EditOp,
    ) -> Result<(NerResult, ReconcileReport), EditError> {
        op.apply(text, &mut result)?;

        let mut report = ReconcileReport {
            received: result.entities.len(),
            ..Default::default()
        };
        let recovered = self.recovery.recover(text, result.entities);
        report.relocated = recovered.relocated;
        report.dropped = recovered.dropped.len();
        result.entities = recovered.kept;

        let mut normalizer = EntityNormalizer::new();
        for entity in result.entities.iter_mut().filter(|e| e.normalized.is_none()) {
            entity.normalized = normalizer.normalize(&entity.kind, &entity.text);
        }

        self.finish(&mut result, &mut report);
        Ok((result, report))
    }

    fn finish(&self, result: &mut NerResult, report: &mut ReconcileReport) {
        assign_global_ids(result);
        let stabilized = stabilize_ids(result);
        report.relations_dropped = stabilized.relations_dropped;
        report.id_collisions = stabilized.id_collisions;
        report.kept = result.entities.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offsets::CharText;
    use serde_json::json;

    fn reconcile(text: &str, raw: serde_json::Value) -> NerResult {
        EntityReconciler::default()
            .reconcile(text, NerResult::from_value(&raw))
            .0
    }

    fn by_kind<'a>(result: &'a NerResult, kind: &EntityKind) -> Vec<&'a Entity> {
        result.entities.iter().filter(|e| &e.kind == kind).collect()
    }

    #[test]
    fn test_global_ids_for_law_and_article() {
        let result = reconcile(
            "المادة 7 من القانون رقم 37.22",
            json!({
                "entities": [
                    {"id": "a", "type": "ARTICLE", "text": "المادة 7", "start_char": 0, "end_char": 8},
                    {"id": "b", "type": "LAW", "text": "القانون رقم 37.22", "start_char": 13, "end_char": 32}
                ],
                "relations": [
                    {"relation_id": "r", "type": "refers_to", "source_id": "a", "target_id": "b"}
                ]
            }),
        );

        let law = by_kind(&result, &EntityKind::Law)[0];
        let article = by_kind(&result, &EntityKind::Article)[0];
        assert_eq!(law.global_id.as_deref(), Some("LAW_37.22"));
        assert_eq!(article.global_id.as_deref(), Some("LAW_37.22_ART_7"));
        assert_eq!((law.start, law.end), (12, 29));
        assert_eq!(result.relations[0].source, article.id);
    }

    #[test]
    fn test_article_without_law_gets_simple_global_id() {
        let result = reconcile(
            "تنص المادة 5 على ...",
            json!({"entities": [
                {"id": "1", "type": "ARTICLE", "text": "المادة 5", "start_char": 4, "end_char": 12}
            ]}),
        );
        assert_eq!(result.entities[0].global_id.as_deref(), Some("ART_5"));
    }

    #[test]
    fn test_article_refers_to_dahir() {
        let result = reconcile(
            "المادة 7 من الظهير الشريف رقم 1.23.60",
            json!({
                "entities": [
                    {"id": "a", "type": "ARTICLE", "text": "المادة 7", "start_char": 0, "end_char": 8},
                    {"id": "b", "type": "DAHIR", "text": "الظهير الشريف رقم 1.23.60", "start_char": 13, "end_char": 41}
                ],
                "relations": [
                    {"relation_id": "r", "type": "refers_to", "source_id": "a", "target_id": "b"}
                ]
            }),
        );
        let dahir = by_kind(&result, &EntityKind::Dahir)[0];
        let article = by_kind(&result, &EntityKind::Article)[0];
        assert_eq!(dahir.global_id.as_deref(), Some("DAHIR_1.23.60"));
        assert_eq!(article.global_id.as_deref(), Some("DAHIR_1.23.60_ART_7"));
    }

    #[test]
    fn test_law_mention_embedding_an_article() {
        let text = "المادة 4 من القانون التنظيمي رقم 29.11";
        let result = reconcile(
            text,
            json!({"entities": [
                {"id": "L1", "type": "LAW", "text": text, "start_char": 0, "end_char": 41}
            ]}),
        );
        let law = &result.entities[0];
        assert_eq!(law.normalized.as_deref(), Some("المادة 4 القانون التنظيمي 29.11"));
        assert_eq!(law.global_id.as_deref(), Some("LAW_29.11"));
    }

    #[test]
    fn test_range_mention_is_expanded() {
        let text = "تطبق أحكام المواد من 7 إلى 9 من هذا القانون";
        let result = reconcile(
            text,
            json!({"entities": [
                {"id": "x", "type": "ARTICLE", "text": "المواد من 7 إلى 9", "start_char": 11, "end_char": 28}
            ]}),
        );

        assert_eq!(by_kind(&result, &EntityKind::InternalRef).len(), 1);
        let mut numbers: Vec<&str> = by_kind(&result, &EntityKind::Article)
            .iter()
            .filter_map(|e| e.normalized.as_deref())
            .collect();
        numbers.sort();
        assert_eq!(numbers, ["7", "8", "9"]);
        assert_eq!(result.relations.len(), 3);
    }

    #[test]
    fn test_ids_are_dense_and_spans_exact() {
        let text = "حكمت محكمة النقض في 29 يوليوز 2011 بأن المادة 5 تطبق";
        let result = reconcile(
            text,
            json!({"entities": [
                {"id": "z9", "type": "ARTICLE", "text": "المادة 5", "start_char": 0, "end_char": 0},
                {"id": "k2", "type": "DATE", "text": "29 يوليوز 2011", "start_char": 20, "end_char": 34},
                {"id": "q", "type": "COURT", "text": "محكمة النقض", "start_char": 5, "end_char": 16},
                {"id": "lost", "type": "PERSON", "text": "غير موجود", "start_char": 0, "end_char": 9}
            ]}),
        );

        let ids: Vec<&str> = result.entities.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3"]);
        let doc = CharText::new(text);
        for entity in &result.entities {
            assert_eq!(doc.slice(entity.start, entity.end), Some(entity.text.as_str()));
        }
        assert_eq!(result.entities[1].normalized.as_deref(), Some("2011-07-29"));
    }

    #[test]
    fn test_reconcile_is_stable_on_its_own_output() {
        let text = "المادة 7 من القانون رقم 37.22 والمواد 3 و 4";
        let raw = json!({
            "entities": [
                {"id": "a", "type": "ARTICLE", "text": "المادة 7", "start_char": 0, "end_char": 8},
                {"id": "b", "type": "LAW", "text": "القانون رقم 37.22", "start_char": 12, "end_char": 29}
            ],
            "relations": [{"relation_id": "r", "source_id": "a", "target_id": "b"}]
        });
        let reconciler = EntityReconciler::default();
        let (first, _) = reconciler.reconcile(text, NerResult::from_value(&raw));
        let (second, _) = reconciler.reconcile(text, first.clone());
        assert_eq!(first, second);
    }

    #[test]
    fn test_edit_reenters_recovery() {
        let mut text = "المادة 5 من القانون 12.34".to_string();
        let reconciler = EntityReconciler::default();
        let (result, _) = reconciler.reconcile(
            &text,
            NerResult::from_value(&json!({"entities": [
                {"id": "a", "type": "ARTICLE", "text": "المادة 5", "start_char": 0, "end_char": 8},
                {"id": "b", "type": "LAW", "text": "القانون 12.34", "start_char": 12, "end_char": 25}
            ]})),
        );

        let (edited, _) = reconciler
            .apply_edit(
                &mut text,
                result,
                EditOp::ReplaceRange {
                    start: 0,
                    end: 0,
                    replacement: "تنص ".into(),
                },
            )
            .unwrap();
        let law = by_kind(&edited, &EntityKind::Law)[0];
        assert_eq!((law.start, law.end), (16, 29));
        assert_eq!(law.global_id.as_deref(), Some("LAW_12.34"));

        let (edited, _) = reconciler
            .apply_edit(
                &mut text,
                edited,
                EditOp::Update {
                    id: "2".into(),
                    kind: None,
                    normalized: Some("قانون المالية".into()),
                    start: None,
                    end: None,
                },
            )
            .unwrap();
        assert_eq!(edited.entities[1].normalized.as_deref(), Some("قانون المالية"));
    }
}
