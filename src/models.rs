//! Core data models for the retrieval pipeline.

use serde::{Deserialize, Serialize};

/// A chunk candidate produced by the chunker, before ids are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkCandidate {
    pub text: String,
    /// Nearest preceding heading at flush time; `None` if no heading
    /// has been seen yet.
    pub section: Option<String>,
}

/// Metadata record persisted alongside the vector index.
///
/// Records are serialized as an ordered JSON array; the array position
/// equals `id`, which is the join key into the index. Ids are dense,
/// zero-based, assigned at build time, and stable for the lifetime of
/// the artifact. A rebuild reassigns them from scratch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub id: i64,
    /// Originating document (relative path of the source file).
    pub source: String,
    #[serde(default)]
    pub section: Option<String>,
    pub text: String,
}

/// A ranked retrieval result, scoped to a single query.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub chunk_id: i64,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub text: String,
    /// Inner-product score from the vector index.
    pub score: f32,
    /// Cross-encoder score, present only when reranking succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

impl RetrievalResult {
    /// The ordering key: rerank score when present, base score otherwise.
    pub fn effective_score(&self) -> f32 {
        self.rerank_score.unwrap_or(self.score)
    }
}
