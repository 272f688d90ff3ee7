use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use extract::{ArtifactSink, EntityExtractor, Extractor, Generator, OllamaClient};
use ingest::{ChunkPlanner, DocumentReader, OcrCommand, TextNormalizer};
use reconcile::{EntityReconciler, NerResult};
use structure::TreeRepairEngine;

use crate::cache::{CachedGenerator, ResponseCache};
use crate::config::AppConfig;
use crate::metrics::{Metrics, MetricsSnapshot, Stage};

/// What `<name>_entities.json` holds: the text the offsets point into, plus
/// the reconciled entities and relations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitiesFile {
    pub text: String,
    #[serde(flatten)]
    pub result: NerResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedDocument {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub documents: usize,
    pub failed: Vec<FailedDocument>,
    pub metrics: MetricsSnapshot,
}

/// The generation service from configuration, behind the response cache
/// when it is enabled.
pub fn build_generator(config: &AppConfig) -> Result<(Arc<dyn Generator>, Option<Arc<ResponseCache>>)> {
    let client = ollama_client(config)?;
    Ok(wrap_generator(Arc::new(client), config))
}

fn ollama_client(config: &AppConfig) -> Result<OllamaClient> {
    OllamaClient::new(
        config.service.base_url.clone(),
        config.service.model.clone(),
        config.request_timeout(),
    )
}

fn wrap_generator(
    inner: Arc<dyn Generator>,
    config: &AppConfig,
) -> (Arc<dyn Generator>, Option<Arc<ResponseCache>>) {
    if !config.cache.enabled {
        return (inner, None);
    }
    let cache = Arc::new(ResponseCache::new(config.cache.max_entries));
    (Arc::new(CachedGenerator::new(inner, cache.clone())), Some(cache))
}

pub fn entity_extractor(config: &AppConfig, generator: Arc<dyn Generator>, debug_dir: &Path) -> EntityExtractor {
    EntityExtractor::new(generator, planner(config))
        .with_reconciler(EntityReconciler::new(&config.reconcile))
        .with_artifacts(ArtifactSink::new(debug_dir))
}

fn planner(config: &AppConfig) -> ChunkPlanner {
    ChunkPlanner::new(config.profile.clone(), config.chunking.clone())
}

/// Runs documents through reading, structure extraction and entity
/// extraction, writing one set of outputs per document.
pub struct Pipeline {
    reader: DocumentReader,
    normalizer: TextNormalizer,
    extractor: Extractor,
    entities: Option<EntityExtractor>,
    cache: Option<Arc<ResponseCache>>,
    metrics: Arc<Metrics>,
    output: PathBuf,
}

impl Pipeline {
    pub fn from_config(config: &AppConfig, output: &Path, skip_entities: bool) -> Result<Self> {
        let client = ollama_client(config)?;
        Ok(Self::with_generator(config, Arc::new(client), output, skip_entities))
    }

    pub fn with_generator(
        config: &AppConfig,
        generator: Arc<dyn Generator>,
        output: &Path,
        skip_entities: bool,
    ) -> Self {
        let (generator, cache) = wrap_generator(generator, config);
        let debug_dir = output.join("debug");
        let ocr = config.ocr_command.as_deref().and_then(OcrCommand::parse);

        let extractor = Extractor::new(generator.clone(), planner(config))
            .with_repair_engine(TreeRepairEngine::new(config.repair.clone()))
            .with_recovery(config.recovery.clone())
            .with_artifacts(ArtifactSink::new(&debug_dir));
        let entities = (!skip_entities).then(|| entity_extractor(config, generator, &debug_dir));

        Self {
            reader: DocumentReader::new(ocr),
            normalizer: TextNormalizer::default(),
            extractor,
            entities,
            cache,
            metrics: Metrics::new(),
            output: output.to_path_buf(),
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.cache.as_ref().map(|c| c.stats()))
    }

    /// Process `input`, a single file or a directory of supported files.
    ///
    /// A document that fails is reported and skipped.
    pub async fn run(&self, input: &Path) -> Result<BatchReport> {
        let files = if input.is_dir() {
            DocumentReader::list_directory(input)
        } else {
            vec![input.to_path_buf()]
        };
        if files.is_empty() {
            bail!("no supported input files under {}", input.display());
        }

        tokio::fs::create_dir_all(&self.output)
            .await
            .with_context(|| format!("failed to create output directory {}", self.output.display()))?;

        if let Some(cache) = &self.cache {
            cache.clear();
        }

        tracing::info!(files = files.len(), output = %self.output.display(), "starting batch");
        let mut failed = Vec::new();
        for path in &files {
            match self.process_file(path).await {
                Ok(()) => self.metrics.record_document(true),
                Err(err) => {
                    let error = format!("{err:#}");
                    tracing::error!(path = %path.display(), error = %error, "document failed");
                    self.metrics.record_document(false);
                    failed.push(FailedDocument {
                        path: path.clone(),
                        error,
                    });
                }
            }
        }

        if let Some(cache) = &self.cache {
            let stats = cache.stats();
            tracing::info!(entries = stats.entries, hits = stats.hits, misses = stats.misses, "response cache");
        }

        Ok(BatchReport {
            documents: files.len(),
            failed,
            metrics: self.metrics(),
        })
    }

    async fn process_file(&self, path: &Path) -> Result<()> {
        let start = Instant::now();
        let doc = ingest::prepare_file(path, &self.reader, &self.normalizer).await?;
        self.metrics.record_stage(Stage::Read, start.elapsed());

        let start = Instant::now();
        let outcome = self
            .extractor
            .extract_structure(&doc)
            .await
            .with_context(|| format!("structure extraction failed for {}", doc.name))?;
        self.metrics.record_stage(Stage::Structure, start.elapsed());
        self.metrics.record_chunks(&outcome.chunks);

        write_json(&self.output.join(format!("{}.json", doc.name)), &outcome.document).await?;
        write_json(
            &self.output.join(format!("{}_raw.json", doc.name)),
            &outcome.raw_structure,
        )
        .await?;

        if let Some(entities) = &self.entities {
            let start = Instant::now();
            let found = entities.extract_entities(&doc.name, &doc.text).await;
            self.metrics.record_stage(Stage::Entities, start.elapsed());
            self.metrics.record_entities(&found.report);

            let file = EntitiesFile {
                text: doc.text.clone(),
                result: found.result,
            };
            write_json(&self.output.join(format!("{}_entities.json", doc.name)), &file).await?;
        }

        Ok(())
    }
}

pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}

pub async fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}
