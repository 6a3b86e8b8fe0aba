//! Offline index build pipeline.
//!
//! Coordinates the full build flow: source discovery → normalization →
//! chunking → batched embedding → HNSW construction → artifact
//! persistence. Build-time failures are fatal; a build never writes an
//! empty, silently-valid index.

use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::chunk::chunk_with_sections;
use crate::config::{Config, SourcesConfig};
use crate::embedding::{l2_normalize, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::hnsw::{HnswIndex, HnswParams};
use crate::index::SearchIndex;
use crate::models::ChunkMeta;
use crate::normalize::Normalizer;

/// A source document before chunking.
#[derive(Debug, Clone)]
pub struct SourceDoc {
    /// Path relative to the sources root; becomes chunk `source`.
    pub source: String,
    pub text: String,
}

/// Discover source documents under the configured root.
///
/// Files are matched against include/exclude globs and returned sorted
/// by path for deterministic chunk ids across rebuilds of the same
/// corpus.
pub fn read_source_files(config: &SourcesConfig) -> Result<Vec<SourceDoc>> {
    let root = &config.root;
    if !root.exists() {
        return Err(RagError::Ingestion(format!(
            "sources root does not exist: {}",
            root.display()
        )));
    }

    let include_set = build_globset(&config.include_globs)?;
    let exclude_set = build_globset(&config.exclude_globs)?;

    let mut docs = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| RagError::Ingestion(format!("walk failed: {}", e)))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        let bytes = std::fs::read(path).map_err(|e| {
            RagError::Ingestion(format!("cannot read {}: {}", path.display(), e))
        })?;
        // Keep the readable bytes of not-quite-UTF-8 files rather than
        // dropping the document.
        let text = String::from_utf8_lossy(&bytes).into_owned();
        docs.push(SourceDoc {
            source: rel_str,
            text,
        });
    }

    docs.sort_by(|a, b| a.source.cmp(&b.source));

    if docs.is_empty() {
        return Err(RagError::Ingestion(format!(
            "no source documents found under {}. Place .txt/.md files there.",
            root.display()
        )));
    }

    Ok(docs)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| RagError::Configuration(format!("bad glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RagError::Configuration(format!("bad glob set: {}", e)))
}

/// Normalize and chunk a set of documents, assigning dense zero-based
/// ids in document order.
pub fn chunk_documents(
    docs: &[SourceDoc],
    normalizer: &Normalizer,
    config: &Config,
) -> Result<Vec<ChunkMeta>> {
    let mut all_chunks = Vec::new();

    for doc in docs {
        let normalized = normalizer.normalize(&doc.text);
        for candidate in chunk_with_sections(&normalized, &config.chunking) {
            all_chunks.push(ChunkMeta {
                id: all_chunks.len() as i64,
                source: doc.source.clone(),
                section: candidate.section,
                text: candidate.text,
            });
        }
    }

    if all_chunks.is_empty() {
        return Err(RagError::Ingestion(
            "chunking produced zero chunks; check your data and chunking settings".to_string(),
        ));
    }

    Ok(all_chunks)
}

/// Embed chunk texts in fixed-size batches and build the HNSW index.
///
/// Batching bounds peak memory during the offline build; it is not a
/// request-path concern. Every vector is L2-normalized before insertion
/// so inner product equals cosine similarity.
pub async fn build_search_index(
    chunks: Vec<ChunkMeta>,
    provider: &dyn EmbeddingProvider,
    params: HnswParams,
    batch_size: usize,
) -> Result<SearchIndex> {
    let dims = provider.dims();
    let mut hnsw = HnswIndex::new(dims, params);

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let batch_size = batch_size.max(1);
    let mut embedded = 0usize;

    for (batch_idx, batch) in texts.chunks(batch_size).enumerate() {
        let vectors = provider
            .embed(batch)
            .await
            .map_err(|e| RagError::Ingestion(format!("embedding failed during build: {}", e)))?;

        if vectors.len() != batch.len() {
            return Err(RagError::Ingestion(format!(
                "provider returned {} vectors for a batch of {}",
                vectors.len(),
                batch.len()
            )));
        }

        for mut vector in vectors {
            if vector.len() != dims {
                return Err(RagError::Configuration(format!(
                    "embedding model '{}' produced dim {} but reports dim {}",
                    provider.model_name(),
                    vector.len(),
                    dims
                )));
            }
            l2_normalize(&mut vector);
            hnsw.add(&vector, chunks[embedded].id)
                .map_err(|e| RagError::Ingestion(format!("index insert failed: {}", e)))?;
            embedded += 1;
        }

        debug!(batch = batch_idx, embedded, total = texts.len(), "encoded batch");
    }

    Ok(SearchIndex { hnsw, meta: chunks })
}

/// Run the full build command: read sources, chunk, embed, persist.
pub async fn run_build(
    config: &Config,
    provider: &dyn EmbeddingProvider,
    dry_run: bool,
) -> Result<()> {
    let normalizer = Normalizer::new(&config.normalize)
        .map_err(|e| RagError::Configuration(e.to_string()))?;

    let docs = read_source_files(&config.sources)?;
    info!(documents = docs.len(), "read source files");

    let chunks = chunk_documents(&docs, &normalizer, config)?;

    if dry_run {
        println!("build (dry-run)");
        println!("  documents: {}", docs.len());
        println!("  chunks: {}", chunks.len());
        return Ok(());
    }

    info!(
        chunks = chunks.len(),
        model = provider.model_name(),
        dims = provider.dims(),
        "encoding chunks"
    );

    let params = HnswParams {
        m: config.index.m,
        ef_construction: config.index.ef_construction,
        ef_search: config.index.ef_search,
    };

    let index = build_search_index(
        chunks,
        provider,
        params,
        config.embedding.batch_size,
    )
    .await?;

    index.save(&config.paths.index, &config.paths.meta)?;

    println!("build");
    println!("  documents: {}", docs.len());
    println!("  chunks indexed: {}", index.meta.len());
    println!("  dims: {}", index.hnsw.dims());
    println!("  index: {}", config.paths.index.display());
    println!("  meta: {}", config.paths.meta.display());
    println!("ok");

    Ok(())
}

/// Best-effort file size for the stats command.
pub fn artifact_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NormalizeConfig;
    use async_trait::async_trait;
    use std::fs;

    struct NullProvider;

    #[async_trait]
    impl EmbeddingProvider for NullProvider {
        fn model_name(&self) -> &str {
            "null"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0, 0.0]).collect())
        }
    }

    fn sources_config(root: &Path) -> SourcesConfig {
        SourcesConfig {
            root: root.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_root_is_ingestion_error() {
        let err = read_source_files(&sources_config(Path::new("/nonexistent/xyz"))).unwrap_err();
        assert!(matches!(err, RagError::Ingestion(_)));
    }

    #[test]
    fn test_empty_root_is_ingestion_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = read_source_files(&sources_config(tmp.path())).unwrap_err();
        assert!(matches!(err, RagError::Ingestion(_)));
    }

    #[test]
    fn test_reads_sorted_and_filtered() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("b.txt"), "beta").unwrap();
        fs::write(tmp.path().join("a.md"), "alpha").unwrap();
        fs::write(tmp.path().join("skip.pdf"), "binary").unwrap();

        let docs = read_source_files(&sources_config(tmp.path())).unwrap();
        let names: Vec<&str> = docs.iter().map(|d| d.source.as_str()).collect();
        assert_eq!(names, vec!["a.md", "b.txt"]);
    }

    #[test]
    fn test_non_utf8_source_keeps_readable_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("mixed.txt"), b"CS \xff\xfe cutoff rank 500".as_ref()).unwrap();

        let docs = read_source_files(&sources_config(tmp.path())).unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].text.contains("CS"));
        assert!(docs[0].text.contains("cutoff rank 500"));
    }

    #[test]
    fn test_chunk_documents_assigns_dense_ids() {
        let docs = vec![
            SourceDoc {
                source: "one.txt".to_string(),
                text: "First document sentence with enough words to be kept around. \
                       Another sentence to pad the first document nicely."
                    .to_string(),
            },
            SourceDoc {
                source: "two.txt".to_string(),
                text: "Second document sentence with enough words to be kept around too. \
                       More filler prose for the second document here."
                    .to_string(),
            },
        ];

        let normalizer = Normalizer::new(&NormalizeConfig::default()).unwrap();
        let mut config = minimal_config();
        config.chunking.min_words = 3;
        let chunks = chunk_documents(&docs, &normalizer, &config).unwrap();

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.id, i as i64);
        }
        assert!(chunks.iter().any(|c| c.source == "one.txt"));
        assert!(chunks.iter().any(|c| c.source == "two.txt"));
    }

    #[test]
    fn test_zero_chunks_is_ingestion_error() {
        let docs = vec![SourceDoc {
            source: "short.txt".to_string(),
            text: "Too short.".to_string(),
        }];
        let normalizer = Normalizer::new(&NormalizeConfig::default()).unwrap();
        let config = minimal_config();
        let err = chunk_documents(&docs, &normalizer, &config).unwrap_err();
        assert!(matches!(err, RagError::Ingestion(_)));
    }

    #[tokio::test]
    async fn test_build_search_index_counts() {
        let chunks: Vec<ChunkMeta> = (0..5)
            .map(|i| ChunkMeta {
                id: i,
                source: "doc.txt".to_string(),
                section: None,
                text: format!("chunk {}", i),
            })
            .collect();

        let index = build_search_index(chunks, &NullProvider, HnswParams::default(), 2)
            .await
            .unwrap();
        assert_eq!(index.hnsw.len(), 5);
        assert_eq!(index.meta.len(), 5);
    }

    fn minimal_config() -> Config {
        toml::from_str(
            r#"
[paths]
index = "index.bin"
meta = "meta.json"
"#,
        )
        .unwrap()
    }
}
