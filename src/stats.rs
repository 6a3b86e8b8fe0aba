//! The `stats` command: inspect the persisted index without querying it.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Local};

use crate::config::Config;
use crate::embedding::create_provider;
use crate::error::{RagError, Result};
use crate::index::SearchIndex;
use crate::indexer::artifact_size;

/// Print a summary of the built artifacts: sizes, graph shape, and a
/// per-source chunk breakdown.
pub fn run_stats(config: &Config) -> Result<()> {
    let provider = create_provider(&config.embedding)
        .map_err(|e| RagError::Configuration(e.to_string()))?;
    let index = SearchIndex::load(&config.paths.index, &config.paths.meta, provider.as_ref())?;

    println!("artifacts");
    println!(
        "  index: {} ({} bytes{})",
        config.paths.index.display(),
        artifact_size(&config.paths.index),
        modified_suffix(&config.paths.index)
    );
    println!(
        "  meta: {} ({} bytes{})",
        config.paths.meta.display(),
        artifact_size(&config.paths.meta),
        modified_suffix(&config.paths.meta)
    );
    println!();

    let params = index.hnsw.params();
    println!("index");
    println!("  chunks: {}", index.meta.len());
    println!("  dims: {}", index.hnsw.dims());
    println!(
        "  hnsw: m={} ef_construction={} ef_search={}",
        params.m, params.ef_construction, params.ef_search
    );
    println!("  embedding model: {}", provider.model_name());
    println!(
        "  rerank: {}",
        if config.rerank.is_enabled() {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!();

    let mut by_source: BTreeMap<&str, usize> = BTreeMap::new();
    for meta in &index.meta {
        *by_source.entry(meta.source.as_str()).or_insert(0) += 1;
    }

    println!("sources ({})", by_source.len());
    for (source, count) in &by_source {
        println!("  {}: {} chunks", source, count);
    }

    Ok(())
}

/// `, built <timestamp>` when the mtime is readable, empty otherwise.
fn modified_suffix(path: &Path) -> String {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|t| {
            let local: DateTime<Local> = t.into();
            format!(", built {}", local.format("%Y-%m-%d %H:%M:%S"))
        })
        .unwrap_or_default()
}
