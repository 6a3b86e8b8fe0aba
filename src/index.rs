//! The persisted index artifact pair.
//!
//! A built index is two co-located files that are only meaningful
//! together:
//!
//! - the **vector index** (bincode-serialized [`HnswIndex`]) — an opaque
//!   binary blob that must be read back by the same library family that
//!   wrote it;
//! - the **metadata file** — a JSON array of [`ChunkMeta`] records whose
//!   order defines the `id` → record mapping used at search time.
//!
//! Loading verifies both files exist and that the index dimension
//! matches the embedding provider's output dimension. A mismatch is a
//! fatal [`RagError::Configuration`], never a silent wrong-shape search.

use std::fs;
use std::path::Path;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::hnsw::HnswIndex;
use crate::models::ChunkMeta;

/// An in-memory index plus its parallel chunk metadata. Read-only after
/// load; rebuilds produce a fresh `SearchIndex` that callers swap in
/// atomically.
#[derive(Debug)]
pub struct SearchIndex {
    pub hnsw: HnswIndex,
    pub meta: Vec<ChunkMeta>,
}

impl SearchIndex {
    /// Persist both artifacts. Each file is written to a temporary
    /// sibling and renamed into place, so a crash mid-write never
    /// leaves a torn artifact and in-flight readers of a previous
    /// version are unaffected.
    pub fn save(&self, index_path: &Path, meta_path: &Path) -> Result<()> {
        write_atomic(index_path, |file| {
            bincode::serialize_into(file, &self.hnsw)
                .map_err(|e| RagError::Configuration(format!("failed to serialize index: {}", e)))
        })?;

        write_atomic(meta_path, |file| {
            serde_json::to_writer(file, &self.meta).map_err(|e| {
                RagError::Configuration(format!("failed to serialize metadata: {}", e))
            })
        })?;

        Ok(())
    }

    /// Load both artifacts and verify them against the embedding
    /// provider that will serve queries.
    pub fn load(
        index_path: &Path,
        meta_path: &Path,
        provider: &dyn EmbeddingProvider,
    ) -> Result<Self> {
        for path in [index_path, meta_path] {
            if !path.exists() {
                return Err(RagError::Configuration(format!(
                    "index artifact not found: {}. Run `crag build` first.",
                    path.display()
                )));
            }
        }

        let index_file = fs::File::open(index_path)
            .map_err(|e| RagError::Configuration(format!("cannot open index file: {}", e)))?;
        let hnsw: HnswIndex = bincode::deserialize_from(std::io::BufReader::new(index_file))
            .map_err(|e| RagError::Configuration(format!("cannot read index file: {}", e)))?;

        let meta_file = fs::File::open(meta_path)
            .map_err(|e| RagError::Configuration(format!("cannot open metadata file: {}", e)))?;
        let meta: Vec<ChunkMeta> = serde_json::from_reader(std::io::BufReader::new(meta_file))
            .map_err(|e| RagError::Configuration(format!("cannot read metadata file: {}", e)))?;

        if hnsw.dims() != provider.dims() {
            return Err(RagError::Configuration(format!(
                "dimension mismatch: index has dim {}, embedding model '{}' produces dim {}. \
                 Rebuild the index with this model.",
                hnsw.dims(),
                provider.model_name(),
                provider.dims()
            )));
        }

        if hnsw.live_len() != meta.len() {
            return Err(RagError::Configuration(format!(
                "index holds {} vectors but metadata has {} records; artifacts are out of sync",
                hnsw.live_len(),
                meta.len()
            )));
        }

        Ok(Self { hnsw, meta })
    }
}

fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut std::io::BufWriter<fs::File>) -> Result<()>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                RagError::Configuration(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
    }

    let tmp_path = path.with_extension("tmp");
    let file = fs::File::create(&tmp_path)
        .map_err(|e| RagError::Configuration(format!("cannot create {}: {}", tmp_path.display(), e)))?;
    let mut writer = std::io::BufWriter::new(file);
    write(&mut writer)?;

    use std::io::Write;
    writer
        .flush()
        .map_err(|e| RagError::Configuration(format!("cannot flush {}: {}", tmp_path.display(), e)))?;
    drop(writer);

    fs::rename(&tmp_path, path).map_err(|e| {
        RagError::Configuration(format!("cannot finalize {}: {}", path.display(), e))
    })?;

    Ok(())
}
