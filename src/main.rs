//! # Campus RAG CLI (`crag`)
//!
//! The `crag` binary drives the offline build and online query paths of
//! the retrieval core.
//!
//! ## Usage
//!
//! ```bash
//! crag --config ./config/crag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `crag build` | Read sources, chunk, embed, and persist the index |
//! | `crag search "<query>"` | Query the index and print ranked chunks |
//! | `crag stats` | Print artifact sizes, graph shape, and source breakdown |
//!
//! ## Examples
//!
//! ```bash
//! # Build the index from the configured sources directory
//! crag build --config ./config/crag.toml
//!
//! # Count documents and chunks without embedding anything
//! crag build --dry-run
//!
//! # Query with reranking (when configured)
//! crag search "CS cutoff rank for OBC category"
//!
//! # Query with conversation history as context
//! crag search "when are they due" --history "tell me about hostel fees"
//!
//! # Skip the cross-encoder even when configured
//! crag search "placement statistics" --no-rerank --top-k 10
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use campus_rag::embedding::create_provider;
use campus_rag::{config, indexer, retrieve, stats};

/// Campus RAG CLI — build and query a section-aware retrieval index
/// for campus-assistant chatbots.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/crag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "crag",
    about = "Campus RAG — build and query a section-aware retrieval index",
    version,
    long_about = "Campus RAG normalizes and chunks campus documents, embeds them with a \
    configurable provider, indexes the vectors in an HNSW graph persisted to disk, and serves \
    top-k retrieval with optional cross-encoder reranking."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/crag.toml`. Source, chunking, index,
    /// embedding, and rerank settings are read from this file.
    #[arg(long, global = true, default_value = "./config/crag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Build the index from the configured sources directory.
    ///
    /// Reads source documents, normalizes and chunks them, embeds every
    /// chunk, and writes the index and metadata artifacts atomically.
    /// A failed build never replaces existing artifacts.
    Build {
        /// Show document and chunk counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search the built index.
    ///
    /// Embeds the query with the configured provider, runs HNSW search,
    /// optionally reranks with the cross-encoder, and prints ranked
    /// chunks with scores.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return (default from config).
        #[arg(long)]
        top_k: Option<usize>,

        /// Skip cross-encoder reranking even when configured.
        #[arg(long)]
        no_rerank: bool,

        /// Prior conversation text prepended to the query before
        /// embedding, so follow-up questions keep their referents.
        #[arg(long)]
        history: Option<String>,
    },

    /// Print statistics about the built artifacts.
    ///
    /// Shows artifact paths and sizes, chunk and dimension counts, HNSW
    /// parameters, and a per-source chunk breakdown.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Build { dry_run } => {
            let provider = create_provider(&cfg.embedding)?;
            indexer::run_build(&cfg, provider.as_ref(), dry_run).await?;
        }
        Commands::Search {
            query,
            top_k,
            no_rerank,
            history,
        } => {
            retrieve::run_search(&cfg, &query, top_k, no_rerank, history.as_deref()).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg)?;
        }
    }

    Ok(())
}
