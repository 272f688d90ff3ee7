use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;

use ingest::{Chunk, ChunkPlanner, PreparedDocument};
use structure::{
    Anchor, Annex, RepairReport, StructureNode, StructureTree, Table, TreeRepairEngine, collect_annexes,
    merge_chunk,
};

use crate::artifacts::ArtifactSink;
use crate::error::ExtractError;
use crate::llm::{GenerationRequest, Generator, Message};
use crate::prompt;
use crate::reply::{self, ChunkReply};

/// Local recovery steps tried on a failed Pass 2 chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecoveryOptions {
    /// One repair call on a malformed reply.
    pub repair: bool,
    /// One retry with the chunk cut in two halves.
    pub bisect: bool,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self {
            repair: true,
            bisect: true,
        }
    }
}

/// Source text whose content did not make it into the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkGap {
    pub chunk: usize,
    pub start_char: usize,
    pub end_char: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkStats {
    pub total: usize,
    pub ok: usize,
    pub repaired: usize,
    pub bisected: usize,
    pub lost: usize,
}

/// Final structure artifact of one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredDocument {
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
    pub structure: Vec<StructureNode>,
    pub annexes: Vec<Annex>,
    pub tables_and_schedules: Vec<Table>,
    pub has_preamble_heading: bool,
    pub gaps: Vec<ChunkGap>,
}

#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub document: StructuredDocument,
    /// Merged tree before annex collection and repair.
    pub raw_structure: Vec<StructureNode>,
    pub chunks: ChunkStats,
    pub repair: RepairReport,
}

/// Pass 2 state carried from one chunk to the next.
struct Pass2State {
    tree: StructureTree,
    inherited: Option<Anchor>,
    tail: String,
    stats: ChunkStats,
    gaps: Vec<ChunkGap>,
}

/// Drives the two-pass structure extraction of a document.
pub struct Extractor {
    generator: Arc<dyn Generator>,
    planner: ChunkPlanner,
    engine: TreeRepairEngine,
    recovery: RecoveryOptions,
    artifacts: Option<ArtifactSink>,
}

impl Extractor {
    pub fn new(generator: Arc<dyn Generator>, planner: ChunkPlanner) -> Self {
        Self {
            generator,
            planner,
            engine: TreeRepairEngine::default(),
            recovery: RecoveryOptions::default(),
            artifacts: None,
        }
    }

    pub fn with_repair_engine(mut self, engine: TreeRepairEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_recovery(mut self, recovery: RecoveryOptions) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn with_artifacts(mut self, sink: ArtifactSink) -> Self {
        self.artifacts = Some(sink);
        self
    }

    pub fn planner(&self) -> &ChunkPlanner {
        &self.planner
    }

    /// Pass 1 skeleton, Pass 2 over every chunk, then annexes and repair.
    ///
    /// Only Pass 1 failures abort the document; a chunk that cannot be
    /// recovered is reported in `gaps`.
    pub async fn extract_structure(
        &self,
        doc: &PreparedDocument,
    ) -> Result<ExtractionOutcome, ExtractError> {
        let started = Instant::now();
        let (mut metadata, tree) = self.run_pass1(doc).await?;
        let tables = structure::take_tables(&mut metadata);

        let overhead = self.overhead(&prompt::pass2_messages(None, "", ""));
        let chunks = self.planner.plan(&doc.doc_id, &doc.text, overhead);
        tracing::info!(doc = %doc.name, chunks = chunks.len(), "pass 2: extracting chunks");

        let mut state = Pass2State {
            tree,
            inherited: None,
            tail: String::new(),
            stats: ChunkStats::default(),
            gaps: Vec::new(),
        };
        for chunk in &chunks {
            self.run_chunk(doc, chunk, &mut state).await;
        }

        let Pass2State {
            mut tree,
            stats,
            gaps,
            ..
        } = state;
        let raw_structure = tree.to_nodes();
        let annexes = collect_annexes(&mut tree);
        let repair = self.engine.repair(&mut tree, doc.has_preamble_heading);

        tracing::info!(
            doc = %doc.name,
            ok = stats.ok,
            repaired = stats.repaired,
            bisected = stats.bisected,
            lost = stats.lost,
            annexes = annexes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "structure extracted"
        );

        Ok(ExtractionOutcome {
            document: StructuredDocument {
                metadata,
                structure: tree.to_nodes(),
                annexes,
                tables_and_schedules: tables,
                has_preamble_heading: doc.has_preamble_heading,
                gaps,
            },
            raw_structure,
            chunks: stats,
            repair,
        })
    }

    async fn run_pass1(
        &self,
        doc: &PreparedDocument,
    ) -> Result<(Map<String, Value>, StructureTree), ExtractError> {
        let overhead = self.overhead(&prompt::pass1_messages(""));
        let head = self
            .planner
            .head_chunk(&doc.doc_id, &doc.text, overhead)
            .ok_or(ExtractError::EmptyDocument)?;
        tracing::info!(doc = %doc.name, tokens = head.token_count(), "pass 1: extracting skeleton");

        let raw = match self.call(prompt::pass1_messages(&head.text), true).await {
            Ok(raw) => raw,
            Err(ExtractError::Service(e)) => {
                tracing::error!(doc = %doc.name, error = %e, "pass 1 call failed");
                return Err(ExtractError::Pass1Failed(e));
            }
            Err(e) => {
                tracing::error!(doc = %doc.name, error = %e, "pass 1 could not be sent");
                return Err(e);
            }
        };

        let (metadata, mut nodes) = match reply::parse_skeleton_reply(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::error!(doc = %doc.name, "pass 1 reply is malformed");
                self.save(&doc.name, "pass1_reply", &raw).await;
                return Err(e);
            }
        };
        self.engine.canonicalizer().apply_nodes(&mut nodes);
        tracing::debug!(nodes = nodes.len(), "pass 1 skeleton");

        Ok((metadata, StructureTree::from_nodes(nodes)))
    }

    async fn run_chunk(&self, doc: &PreparedDocument, chunk: &Chunk, state: &mut Pass2State) {
        state.stats.total += 1;
        let label = format!("chunk_{}", chunk.index);

        let err = match self.attempt(doc, &label, &chunk.text, state, self.recovery.repair).await {
            Ok((parsed, repaired)) => {
                self.accept(state, parsed, chunk.tail.clone());
                if repaired {
                    state.stats.repaired += 1;
                } else {
                    state.stats.ok += 1;
                }
                return;
            }
            Err(e) => e,
        };
        tracing::warn!(doc = %doc.name, chunk = chunk.index, error = %err, "chunk extraction failed");

        if self.recovery.bisect {
            if let Some((left, right)) = self.planner.bisect(&chunk.text) {
                let left_chars = left.chars().count();
                let halves = [
                    (left, chunk.offset.0, chunk.offset.0 + left_chars),
                    (right, chunk.offset.0 + left_chars, chunk.offset.1),
                ];

                let mut recovered = 0;
                let mut failed = Vec::new();
                for (i, (half, start, end)) in halves.into_iter().enumerate() {
                    let half_label = format!("{label}_half{}", i + 1);
                    match self.attempt(doc, &half_label, &half, state, false).await {
                        Ok((parsed, _)) => {
                            self.accept(state, parsed, self.planner.tail_of(&half));
                            recovered += 1;
                        }
                        Err(e) => {
                            tracing::warn!(chunk = chunk.index, half = i + 1, error = %e, "bisected half failed");
                            failed.push(ChunkGap {
                                chunk: chunk.index,
                                start_char: start,
                                end_char: end,
                                reason: e.to_string(),
                            });
                        }
                    }
                }

                if recovered > 0 {
                    tracing::warn!(chunk = chunk.index, halves = recovered, "chunk recovered by bisection");
                    state.stats.bisected += 1;
                    state.gaps.extend(failed);
                    return;
                }
            }
        }

        tracing::warn!(doc = %doc.name, chunk = chunk.index, "chunk content lost");
        state.stats.lost += 1;
        state.gaps.push(ChunkGap {
            chunk: chunk.index,
            start_char: chunk.offset.0,
            end_char: chunk.offset.1,
            reason: err.to_string(),
        });
        state.tail = chunk.tail.clone();
    }

    /// One Pass 2 call, plus one repair call when allowed. Returns the parsed
    /// reply and whether the repair was needed.
    async fn attempt(
        &self,
        doc: &PreparedDocument,
        label: &str,
        text: &str,
        state: &Pass2State,
        allow_repair: bool,
    ) -> Result<(ChunkReply, bool), ExtractError> {
        let messages = prompt::pass2_messages(state.inherited.as_ref(), &state.tail, text);
        let raw = self.call(messages, false).await?;

        let err = match reply::parse_chunk_reply(&raw) {
            Ok(parsed) => return Ok((parsed, false)),
            Err(e) => e,
        };
        self.save(&doc.name, &format!("{label}_reply"), &raw).await;
        if !allow_repair {
            return Err(err);
        }

        tracing::warn!(doc = %doc.name, chunk = label, "malformed reply, requesting repair");
        let (anchor, _) = reply::split_inherited(&reply::strip_code_fences(&raw));
        let fixed = self.call(prompt::repair_messages(&raw), true).await?;
        match reply::parse_repair_reply(&fixed) {
            Some(nodes) if !nodes.is_empty() => Ok((ChunkReply { anchor, nodes }, true)),
            _ => {
                self.save(&doc.name, &format!("{label}_repair"), &fixed).await;
                Err(err)
            }
        }
    }

    fn accept(&self, state: &mut Pass2State, parsed: ChunkReply, tail: String) {
        let open = last_heading(&parsed.nodes)
            .or_else(|| parsed.anchor.clone())
            .or_else(|| state.inherited.take());

        merge_chunk(
            &mut state.tree,
            parsed.anchor.as_ref(),
            parsed.nodes,
            self.engine.canonicalizer(),
        );
        state.inherited = open;
        state.tail = tail;
    }

    async fn call(&self, messages: Vec<Message>, json_mode: bool) -> Result<String, ExtractError> {
        let mut request = GenerationRequest::new(messages, json_mode);
        let prompt_tokens = self.planner.prompt_tokens(&request.role_pairs());
        request.max_tokens = self.planner.completion_budget(prompt_tokens).ok_or(
            ExtractError::PromptTooLarge {
                prompt_tokens,
                max_context: self.planner.profile().max_context,
            },
        )?;
        tracing::debug!(prompt_tokens, max_tokens = request.max_tokens, json_mode, "calling generation service");

        self.generator
            .generate(&request)
            .await
            .map_err(ExtractError::Service)
    }

    fn overhead(&self, messages: &[Message]) -> usize {
        let pairs: Vec<(&str, &str)> = messages
            .iter()
            .map(|m| (m.role.as_str(), m.content.as_str()))
            .collect();
        self.planner.prompt_tokens(&pairs)
    }

    async fn save(&self, doc: &str, label: &str, payload: &str) {
        if let Some(sink) = &self.artifacts {
            sink.record(doc, label, payload).await;
        }
    }
}

/// The last heading (non-article, known kind) of a reply, in document order.
fn last_heading(nodes: &[StructureNode]) -> Option<Anchor> {
    nodes.iter().rev().find_map(|node| {
        last_heading(&node.children).or_else(|| {
            (node.kind.is_known() && !node.kind.is_leaf())
                .then(|| Anchor::new(node.kind.label(), &node.number, &node.title))
        })
    })
}
