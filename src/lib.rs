//! # Campus RAG
//!
//! A retrieval core for campus-assistant chatbots: document
//! normalization, section-aware chunking, embedding, an HNSW vector
//! index with on-disk persistence, and a query pipeline with optional
//! cross-encoder reranking.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌─────────────────┐   ┌───────────────┐
//! │  Sources  │──▶│ Normalize+Chunk │──▶│ Embed + HNSW  │
//! │ txt/md    │   │ section-aware   │   │ index + meta  │
//! └───────────┘   └─────────────────┘   └──────┬────────┘
//!                                              │ persisted pair
//!                     ┌────────────────────────┤
//!                     ▼                        ▼
//!               ┌───────────┐           ┌───────────┐
//!               │ Retriever │──────────▶│  Rerank   │
//!               │ (query)   │  top-k    │ (optional)│
//!               └───────────┘           └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! crag build                          # chunk, embed, and persist the index
//! crag search "CS cutoff for OBC"     # query the index
//! crag stats                          # inspect the built artifacts
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`normalize`] | Whitespace and lexical normalization |
//! | [`chunk`] | Section-aware chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`hnsw`] | HNSW approximate nearest-neighbor graph |
//! | [`index`] | Persisted index + metadata artifact pair |
//! | [`indexer`] | Offline build pipeline |
//! | [`rerank`] | Cross-encoder reranking |
//! | [`retrieve`] | Query-time retrieval pipeline |
//! | [`stats`] | Artifact inspection |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod hnsw;
pub mod index;
pub mod indexer;
pub mod models;
pub mod normalize;
pub mod rerank;
pub mod retrieve;
pub mod stats;
