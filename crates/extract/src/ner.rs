use serde_json::Value;
use std::sync::Arc;

use ingest::ChunkPlanner;
use reconcile::{EntityReconciler, NerResult, ReconcileReport, json_to_text};

use crate::artifacts::ArtifactSink;
use crate::error::ExtractError;
use crate::llm::{GenerationRequest, Generator};
use crate::prompt;
use crate::reply;

#[derive(Debug, Clone)]
pub struct EntityOutcome {
    pub result: NerResult,
    pub report: ReconcileReport,
    pub chunks: usize,
    pub failed_chunks: usize,
}

/// Entity extraction over a document's final text, chunked with the Pass 2
/// budget and reconciled against the whole text.
pub struct EntityExtractor {
    generator: Arc<dyn Generator>,
    planner: ChunkPlanner,
    reconciler: EntityReconciler,
    artifacts: Option<ArtifactSink>,
}

impl EntityExtractor {
    pub fn new(generator: Arc<dyn Generator>, planner: ChunkPlanner) -> Self {
        Self {
            generator,
            planner,
            reconciler: EntityReconciler::default(),
            artifacts: None,
        }
    }

    pub fn with_reconciler(mut self, reconciler: EntityReconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    pub fn with_artifacts(mut self, sink: ArtifactSink) -> Self {
        self.artifacts = Some(sink);
        self
    }

    /// Extract and reconcile the entities of `text`.
    ///
    /// A chunk whose call fails or whose reply cannot be read contributes no
    /// entities; the rest of the document is still processed.
    pub async fn extract_entities(&self, doc_name: &str, text: &str) -> EntityOutcome {
        let overhead = self
            .planner
            .prompt_tokens(&GenerationRequest::new(prompt::ner_messages(""), true).role_pairs());
        let chunks = self.planner.plan(doc_name, text, overhead);

        let mut raw = NerResult::default();
        let mut failed_chunks = 0;
        for chunk in &chunks {
            match self.extract_chunk(doc_name, chunk.index, &chunk.text).await {
                Ok(mut found) => {
                    shift_chunk(&mut found, chunk.index, chunk.offset.0);
                    raw.entities.append(&mut found.entities);
                    raw.relations.append(&mut found.relations);
                }
                Err(e) => {
                    tracing::warn!(doc = doc_name, chunk = chunk.index, error = %e, "entity extraction failed for chunk");
                    failed_chunks += 1;
                }
            }
        }

        let (result, report) = self.reconciler.reconcile(text, raw);
        tracing::info!(
            doc = doc_name,
            chunks = chunks.len(),
            failed = failed_chunks,
            entities = result.entities.len(),
            relations = result.relations.len(),
            "entities extracted"
        );

        EntityOutcome {
            result,
            report,
            chunks: chunks.len(),
            failed_chunks,
        }
    }

    /// Entities of an already structured JSON document, over its linearized
    /// text.
    pub async fn extract_from_structure(&self, doc_name: &str, document: &Value) -> (String, EntityOutcome) {
        let text = json_to_text(document);
        let outcome = self.extract_entities(doc_name, &text).await;
        (text, outcome)
    }

    async fn extract_chunk(&self, doc_name: &str, index: usize, text: &str) -> Result<NerResult, ExtractError> {
        let mut request = GenerationRequest::new(prompt::ner_messages(text), true);
        let prompt_tokens = self.planner.prompt_tokens(&request.role_pairs());
        request.max_tokens = self.planner.completion_budget(prompt_tokens).ok_or(
            ExtractError::PromptTooLarge {
                prompt_tokens,
                max_context: self.planner.profile().max_context,
            },
        )?;

        let raw = self
            .generator
            .generate(&request)
            .await
            .map_err(ExtractError::Service)?;

        match reply::parse_entity_reply(&raw) {
            Some(value) => Ok(NerResult::from_value(&value)),
            None => {
                if let Some(sink) = &self.artifacts {
                    sink.record(doc_name, &format!("ner_chunk_{index}_reply"), &raw).await;
                }
                Err(ExtractError::MalformedReply(raw.chars().take(120).collect()))
            }
        }
    }
}

/// Move a chunk's entities into document coordinates and make its ids
/// unique across chunks.
fn shift_chunk(found: &mut NerResult, index: usize, offset: usize) {
    let prefix = format!("c{index}_");
    for entity in found.entities.iter_mut() {
        entity.id = format!("{prefix}{}", entity.id);
        entity.start += offset;
        entity.end += offset;
    }
    for relation in found.relations.iter_mut() {
        relation.id = format!("{prefix}{}", relation.id);
        relation.source = format!("{prefix}{}", relation.source);
        relation.target = format!("{prefix}{}", relation.target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ingest::{ChunkerConfig, ModelProfile};
    use reconcile::EntityKind;
    use serde_json::json;
    use std::sync::Mutex;

    struct Fixed(Mutex<Vec<String>>);

    #[async_trait]
    impl Generator for Fixed {
        async fn generate(&self, _request: &GenerationRequest) -> anyhow::Result<String> {
            let mut replies = self.0.lock().unwrap();
            if replies.is_empty() {
                anyhow::bail!("no reply scripted");
            }
            Ok(replies.remove(0))
        }
    }

    fn extractor(replies: Vec<&str>) -> EntityExtractor {
        let generator = Arc::new(Fixed(Mutex::new(replies.into_iter().map(String::from).collect())));
        EntityExtractor::new(
            generator,
            ChunkPlanner::new(ModelProfile::default(), ChunkerConfig::default()),
        )
    }

    #[tokio::test]
    async fn test_noisy_reply_is_reconciled() {
        let text = "المادة 7 من القانون رقم 37.22";
        let reply = r#"Sure! {"entities": [
            {"id": "E1", "type": "ARTICLE", "text": "المادة 7", "start_char": 3, "end_char": 11},
            {"id": "E2", "type": "LAW", "text": "القانون رقم 37.22", "start_char": 12, "end_char": 29}
        ], "relations": [{"relation_id": "R1", "type": "refers_to", "source_id": "E1", "target_id": "E2"}]} hope it helps"#;

        let outcome = extractor(vec![reply]).extract_entities("doc", text).await;
        assert_eq!(outcome.failed_chunks, 0);
        let article = &outcome.result.entities[0];
        assert_eq!(article.kind, EntityKind::Article);
        assert_eq!((article.start, article.end), (0, 8));
        assert_eq!(article.global_id.as_deref(), Some("LAW_37.22_ART_7"));
        assert_eq!(outcome.result.relations.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_chunk_yields_no_entities() {
        let outcome = extractor(vec!["I cannot help with that"]).extract_entities("doc", "المادة 1").await;
        assert_eq!(outcome.failed_chunks, 1);
        assert!(outcome.result.entities.is_empty());
    }

    #[tokio::test]
    async fn test_structured_document_is_linearized() {
        let reply = r#"{"entities": [{"id": "1", "type": "ARTICLE", "text": "المادة 3", "start_char": 0, "end_char": 8}]}"#;
        let (text, outcome) = extractor(vec![reply])
            .extract_from_structure("doc", &json!({"structure": [{"number": 3, "text": "المادة 3"}]}))
            .await;
        assert_eq!(text, "المادة 3");
        assert_eq!(outcome.result.entities[0].normalized.as_deref(), Some("3"));
    }

    #[test]
    fn test_shift_chunk_offsets_and_ids() {
        let mut found = NerResult::from_value(&json!({
            "entities": [{"id": "1", "type": "DATE", "text": "x", "start_char": 2, "end_char": 3}],
            "relations": [{"relation_id": "1", "source_id": "1", "target_id": "1"}]
        }));
        shift_chunk(&mut found, 4, 100);
        assert_eq!(found.entities[0].id, "c4_1");
        assert_eq!((found.entities[0].start, found.entities[0].end), (102, 103));
        assert_eq!(found.relations[0].source, "c4_1");
    }
}
