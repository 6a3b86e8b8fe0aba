use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub paths: PathsConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub normalize: NormalizeConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    /// Vector index artifact (bincode).
    pub index: PathBuf,
    /// Chunk metadata artifact (JSON array, order defines ids).
    pub meta: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourcesConfig {
    /// Directory scanned for source documents at build time.
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data"),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.txt".to_string(),
        "**/*.md".to_string(),
        "**/*.html".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Flush threshold in words.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Words carried over from the end of one chunk into the next.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    /// Chunks below this word count are dropped at flush time.
    #[serde(default = "default_min_words")]
    pub min_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            min_words: default_min_words(),
        }
    }
}

fn default_chunk_size() -> usize {
    300
}
fn default_overlap() -> usize {
    30
}
fn default_min_words() -> usize {
    20
}

/// HNSW graph tunables. Higher values trade build/query time for recall.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Graph degree (max neighbors per node on upper layers; 2m on layer 0).
    #[serde(default = "default_m")]
    pub m: usize,
    /// Candidate-list breadth during construction.
    #[serde(default = "default_ef_construction")]
    pub ef_construction: usize,
    /// Candidate-list breadth during search.
    #[serde(default = "default_ef_search")]
    pub ef_search: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            m: default_m(),
            ef_construction: default_ef_construction(),
            ef_search: default_ef_search(),
        }
    }
}

fn default_m() -> usize {
    32
}
fn default_ef_construction() -> usize {
    200
}
fn default_ef_search() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `openai`, `ollama`, `local`, or `disabled`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RerankConfig {
    /// Cross-encoder endpoint URL; reranking is disabled when unset.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            url: None,
            model: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RerankConfig {
    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }
}

/// Lexical unification rules applied to indexed text and queries alike.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct NormalizeConfig {
    /// `(regex pattern, replacement)` pairs. When empty, a built-in set
    /// for the cutoff-rank domain is used.
    #[serde(default)]
    pub rules: Vec<LexicalRule>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LexicalRule {
    pub pattern: String,
    pub replace: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;

    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be < chunking.chunk_size");
    }
    if config.chunking.min_words > config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.min_words must be <= chunking.chunk_size, or every chunk is dropped"
        );
    }

    if config.index.m < 2 {
        anyhow::bail!("index.m must be >= 2");
    }
    if config.index.ef_construction < config.index.m {
        anyhow::bail!("index.ef_construction must be >= index.m");
    }
    if config.index.ef_search == 0 {
        anyhow::bail!("index.ef_search must be > 0");
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be > 0");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    Ok(())
}
