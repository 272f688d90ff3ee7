use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

use reconcile::{EditOp, EntityReconciler};

use crate::batch::{self, EntitiesFile, Pipeline};
use crate::cli::{EditArgs, EntitiesArgs, RunArgs, ServiceArgs};
use crate::config::AppConfig;

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(path),
        None => Ok(AppConfig::default()),
    }
}

/// Configuration file first, then command-line overrides.
fn resolve_config(args: &ServiceArgs) -> Result<AppConfig> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(model) = &args.model {
        config.set_model(model);
    }
    if let Some(base_url) = &args.base_url {
        config.service.base_url = base_url.clone();
    }
    if args.no_cache {
        config.cache.enabled = false;
    }
    Ok(config)
}

pub async fn run(args: RunArgs) -> Result<()> {
    let config = resolve_config(&args.service)?;
    tracing::info!(model = %config.service.model, base_url = %config.service.base_url, "using generation service");

    let pipeline = Pipeline::from_config(&config, &args.output, args.skip_entities)?;
    let report = pipeline.run(&args.input).await?;

    if !report.failed.is_empty() {
        tracing::warn!(failed = report.failed.len(), documents = report.documents, "some documents failed");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub async fn entities(args: EntitiesArgs) -> Result<()> {
    let config = resolve_config(&args.service)?;
    let document: Value = batch::read_json(&args.document).await?;

    let name = file_stem(&args.document);
    let output = args
        .output
        .unwrap_or_else(|| args.document.with_file_name(format!("{name}_entities.json")));
    let debug_dir = output
        .parent()
        .map(|p| p.join("debug"))
        .unwrap_or_else(|| PathBuf::from("debug"));

    let (generator, _cache) = batch::build_generator(&config)?;
    let extractor = batch::entity_extractor(&config, generator, &debug_dir);
    let (text, outcome) = extractor.extract_from_structure(&name, &document).await;

    batch::write_json(
        &output,
        &EntitiesFile {
            text,
            result: outcome.result,
        },
    )
    .await?;
    println!("{}", serde_json::to_string_pretty(&outcome.report)?);
    Ok(())
}

pub async fn edit(args: EditArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let mut file: EntitiesFile = batch::read_json(&args.entities).await?;
    let ops: Vec<EditOp> = batch::read_json(&args.ops).await?;

    let reconciler = EntityReconciler::new(&config.reconcile);
    for (i, op) in ops.into_iter().enumerate() {
        let (result, report) = reconciler
            .apply_edit(&mut file.text, file.result, op)
            .with_context(|| format!("edit operation {i} failed"))?;
        tracing::info!(op = i, kept = report.kept, dropped = report.dropped, "applied edit");
        file.result = result;
    }

    let output = args.output.unwrap_or(args.entities);
    batch::write_json(&output, &file).await?;
    tracing::info!(path = %output.display(), entities = file.result.entities.len(), "wrote entities");
    Ok(())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string())
}
