//! Error taxonomy for the retrieval pipeline.
//!
//! Four kinds, matching how failures must propagate:
//!
//! | Kind | When | Handling |
//! |------|------|----------|
//! | [`RagError::Configuration`] | missing artifacts, dimension mismatch, bad config | fatal at startup |
//! | [`RagError::Ingestion`] | no source files, zero chunks produced | fatal for a build |
//! | [`RagError::Retrieval`] | embedding or index-search failure at query time | returned to the caller per request |
//! | [`RagError::RerankUnavailable`] | reranker construction or inference failure | logged; retrieval degrades to base ranking |

use thiserror::Error;

/// Pipeline error kinds. Build-time variants abort the operation;
/// [`RagError::Retrieval`] is recoverable per-request; rerank failures
/// are caught inside the retriever and never reach the caller.
#[derive(Debug, Error)]
pub enum RagError {
    /// Missing artifact files, embedding-dimension mismatch, or invalid
    /// configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Build found no source documents or chunking produced nothing.
    /// A build must never write an empty, silently-valid index.
    #[error("ingestion error: {0}")]
    Ingestion(String),

    /// Embedding call or index search failed at query time.
    #[error("retrieval error: {0}")]
    Retrieval(#[source] anyhow::Error),

    /// The reranker could not be constructed or scored the candidates.
    /// Non-fatal: the retriever falls back to base-score ordering.
    #[error("reranker unavailable: {0}")]
    RerankUnavailable(String),
}

pub type Result<T> = std::result::Result<T, RagError>;
